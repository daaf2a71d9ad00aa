pub mod simulator;
pub mod sysfs;

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::{
    db::models::{InputKind, MeasurementKind, Sensor},
    policy::FAILED_READING,
};

pub use self::{simulator::Simulator, sysfs::SysfsBus};

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("hardware bus is not connected")]
    Disconnected,
    #[error("I/O error on pin {pin}: {source}")]
    Io {
        pin: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("unreadable value on pin {pin}: {raw:?}")]
    Parse { pin: u32, raw: String },
    #[error("pin {pin} does not support {mode}")]
    UnsupportedMode { pin: u32, mode: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalogMode {
    /// Volts on the 3.3 V reference.
    Voltage,
    /// Fraction of the reference, 0..1.
    Relative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigitalMode {
    Floating,
    PullDown,
    PullUp,
}

/// Blocking access to the sensor bus.
///
/// Reads may sleep on I/O; callers go through [`acquire`], which moves them
/// onto the blocking pool.
pub trait Hardware: Send + Sync {
    fn read_analog(&self, pin: u32, mode: AnalogMode) -> Result<f32, HardwareError>;
    fn read_digital(&self, pin: u32, mode: DigitalMode) -> Result<bool, HardwareError>;
}

/// How a sensor's pin is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Analog(AnalogMode),
    Digital(DigitalMode),
}

impl Channel {
    /// `None` for measurement kinds that do not apply to the input kind.
    pub fn for_sensor(input: InputKind, measurement: MeasurementKind) -> Option<Self> {
        match (input, measurement) {
            (InputKind::Analog, MeasurementKind::Absolute) => Some(Self::Analog(AnalogMode::Voltage)),
            (InputKind::Analog, MeasurementKind::Relative) => Some(Self::Analog(AnalogMode::Relative)),
            (InputKind::Digital, MeasurementKind::Floating) => Some(Self::Digital(DigitalMode::Floating)),
            (InputKind::Digital, MeasurementKind::PullDown) => Some(Self::Digital(DigitalMode::PullDown)),
            (InputKind::Digital, MeasurementKind::PullUp) => Some(Self::Digital(DigitalMode::PullUp)),
            _ => None,
        }
    }
}

/// Reads the sensor's pin once.
///
/// Every failure (bad channel, bus error, panicked read) is logged and turned
/// into [`FAILED_READING`]; the caller never sees an error.
pub async fn acquire(hardware: Arc<dyn Hardware>, sensor: &Sensor) -> f64 {
    let Some(channel) = Channel::for_sensor(sensor.input_kind, sensor.measurement_kind) else {
        warn!(
            sensor_id = %sensor.id,
            input = ?sensor.input_kind,
            measurement = ?sensor.measurement_kind,
            "Measurement kind does not match input kind"
        );
        return FAILED_READING;
    };

    let pin = sensor.pin;
    let read = tokio::task::spawn_blocking(move || match channel {
        Channel::Analog(mode) => hardware.read_analog(pin, mode).map(f64::from),
        Channel::Digital(mode) => hardware
            .read_digital(pin, mode)
            .map(|high| if high { 1.0 } else { 0.0 }),
    })
    .await;

    match read {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!(sensor_id = %sensor.id, pin, error = %e, "Hardware read failed");
            FAILED_READING
        }
        Err(e) => {
            warn!(sensor_id = %sensor.id, pin, error = %e, "Hardware read task aborted");
            FAILED_READING
        }
    }
}


#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{testing::ScriptedHardware, *};
    use crate::db::models::{PeriodUnit, SensorState, ThresholdRule};

    fn sensor(input_kind: InputKind, measurement_kind: MeasurementKind) -> Sensor {
        Sensor {
            id: Uuid::new_v4(),
            name: "probe".into(),
            pin: 33,
            period: 1,
            period_unit: PeriodUnit::Seconds,
            input_kind,
            measurement_kind,
            threshold: 0.0,
            threshold_rule: ThresholdRule::LowerBound,
            state: SensorState::Active,
            upload_enabled: false,
            remote_channel: String::new(),
        }
    }

    #[test]
    fn channel_follows_measurement_kind() {
        assert_eq!(
            Channel::for_sensor(InputKind::Analog, MeasurementKind::Relative),
            Some(Channel::Analog(AnalogMode::Relative))
        );
        assert_eq!(
            Channel::for_sensor(InputKind::Digital, MeasurementKind::PullUp),
            Some(Channel::Digital(DigitalMode::PullUp))
        );
        assert_eq!(Channel::for_sensor(InputKind::Digital, MeasurementKind::Absolute), None);
    }

    #[tokio::test]
    async fn analog_value_is_widened() {
        let hw: Arc<dyn Hardware> = Arc::new(ScriptedHardware::new([1.5]));
        let v = acquire(hw, &sensor(InputKind::Analog, MeasurementKind::Absolute)).await;
        assert_eq!(v, 1.5);
    }

    #[tokio::test]
    async fn digital_high_reads_as_one() {
        let hw: Arc<dyn Hardware> = Arc::new(ScriptedHardware::new([1.0, 0.0]));
        let s = sensor(InputKind::Digital, MeasurementKind::PullDown);
        assert_eq!(acquire(hw.clone(), &s).await, 1.0);
        assert_eq!(acquire(hw, &s).await, 0.0);
    }

    #[tokio::test]
    async fn failures_become_sentinel() {
        let hw: Arc<dyn Hardware> = Arc::new(ScriptedHardware::default());
        let v = acquire(hw.clone(), &sensor(InputKind::Analog, MeasurementKind::Absolute)).await;
        assert_eq!(v, FAILED_READING);

        let mismatched = sensor(InputKind::Analog, MeasurementKind::PullUp);
        assert_eq!(acquire(hw, &mismatched).await, FAILED_READING);
    }
}
