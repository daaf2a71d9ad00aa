use rand::Rng;

use super::{AnalogMode, DigitalMode, Hardware, HardwareError};

/// Stand-in bus used in simulation mode: every read succeeds with a random
/// value in the range the real pin would produce.
#[derive(Debug, Clone, Copy, Default)]
pub struct Simulator;

const REFERENCE_VOLTS: f32 = 3.3;

impl Hardware for Simulator {
    fn read_analog(&self, _pin: u32, mode: AnalogMode) -> Result<f32, HardwareError> {
        let mut rng = rand::thread_rng();
        Ok(match mode {
            AnalogMode::Voltage => rng.gen_range(0.0..REFERENCE_VOLTS),
            AnalogMode::Relative => rng.gen_range(0.0..1.0),
        })
    }

    fn read_digital(&self, _pin: u32, _mode: DigitalMode) -> Result<bool, HardwareError> {
        Ok(rand::thread_rng().gen_bool(0.5))
    }
}
