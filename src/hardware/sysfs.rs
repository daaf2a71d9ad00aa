use std::{
    fs,
    path::{Path, PathBuf},
};

use super::{AnalogMode, DigitalMode, Hardware, HardwareError};
use crate::sensors::validator::ANALOG_PINS;

const REFERENCE_VOLTS: f32 = 3.3;

/// Linux sysfs bus.
///
/// Analog pins `31..=46` map onto IIO channels `0..=15` of one ADC device
/// (`in_voltageN_raw` scaled by `in_voltage_scale`, in millivolts). Digital
/// pins are exported GPIO lines read from `gpioN/value`. Pull resistors are
/// configured by the board, so the digital mode does not change the read.
#[derive(Debug, Clone)]
pub struct SysfsBus {
    iio_device: PathBuf,
    gpio_root: PathBuf,
}

impl SysfsBus {
    pub fn new(iio_device: impl Into<PathBuf>, gpio_root: impl Into<PathBuf>) -> Self {
        Self {
            iio_device: iio_device.into(),
            gpio_root: gpio_root.into(),
        }
    }

    fn volts(&self, pin: u32) -> Result<f32, HardwareError> {
        if !ANALOG_PINS.contains(&pin) {
            return Err(HardwareError::UnsupportedMode { pin, mode: "analog input" });
        }
        if !self.iio_device.is_dir() {
            return Err(HardwareError::Disconnected);
        }
        let channel = pin - ANALOG_PINS.start();
        let raw: f32 = read_value(&self.iio_device.join(format!("in_voltage{channel}_raw")), pin)?;
        let scale: f32 = read_value(&self.iio_device.join("in_voltage_scale"), pin)?;
        Ok(raw * scale / 1000.0)
    }
}

impl Hardware for SysfsBus {
    fn read_analog(&self, pin: u32, mode: AnalogMode) -> Result<f32, HardwareError> {
        let volts = self.volts(pin)?;
        Ok(match mode {
            AnalogMode::Voltage => volts,
            AnalogMode::Relative => (volts / REFERENCE_VOLTS).clamp(0.0, 1.0),
        })
    }

    fn read_digital(&self, pin: u32, _mode: DigitalMode) -> Result<bool, HardwareError> {
        if !self.gpio_root.is_dir() {
            return Err(HardwareError::Disconnected);
        }
        let level: u8 = read_value(&self.gpio_root.join(format!("gpio{pin}")).join("value"), pin)?;
        Ok(level != 0)
    }
}

fn read_value<T: std::str::FromStr>(path: &Path, pin: u32) -> Result<T, HardwareError> {
    let raw = fs::read_to_string(path).map_err(|source| HardwareError::Io { pin, source })?;
    raw.trim().parse().map_err(|_| HardwareError::Parse {
        pin,
        raw: raw.trim().to_owned(),
    })
}
