use std::ops::RangeInclusive;

use thiserror::Error;

use crate::db::models::{HardwareProfile, InputKind, MeasurementKind, Sensor, SensorId};

/// Pins wired to the ADC.
pub const ANALOG_PINS: RangeInclusive<u32> = 31..=46;

/// Absolute readings are volts on a 3.3 V reference.
pub const ABSOLUTE_THRESHOLD_LIMIT: f64 = 3.3;

/// Every other measurement kind is normalised to 0..1.
pub const RELATIVE_THRESHOLD_LIMIT: f64 = 1.0;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("sensor name must not be empty")]
    EmptyName,
    #[error("pin {pin} is outside 1..={max} for hardware profile {profile}")]
    PinOutOfRange {
        pin: u32,
        max: u32,
        profile: HardwareProfile,
    },
    #[error("pin {pin} cannot be read as analog input (analog pins are 31..=46)")]
    PinNotAnalog { pin: u32 },
    #[error("pin {pin} is already used by sensor {sensor_id}")]
    PinInUse { pin: u32, sensor_id: SensorId },
    #[error("measurement kind {measurement:?} is not valid for {input:?} input")]
    MeasurementKindMismatch {
        input: InputKind,
        measurement: MeasurementKind,
    },
    #[error("period must not be zero")]
    ZeroPeriod,
    #[error("threshold {threshold} must be below {limit} for {measurement:?} measurements")]
    ThresholdTooHigh {
        threshold: f64,
        limit: f64,
        measurement: MeasurementKind,
    },
    #[error("upload-enabled sensors need a remote channel")]
    MissingRemoteChannel,
    #[error("remote channel {channel:?} is already used by sensor {sensor_id}")]
    RemoteChannelInUse { channel: String, sensor_id: SensorId },
}

/// Checks `candidate` against the stored sensors and returns the first rule
/// it breaks. `existing` may contain the candidate itself (on update); it is
/// skipped by ID.
pub fn validate(
    candidate: &Sensor,
    existing: &[Sensor],
    profile: HardwareProfile,
) -> Result<(), ValidationError> {
    let others: Vec<&Sensor> = existing.iter().filter(|s| s.id != candidate.id).collect();

    if candidate.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }

    let pin = candidate.pin;
    if pin < 1 || pin > profile.max_pin() {
        return Err(ValidationError::PinOutOfRange {
            pin,
            max: profile.max_pin(),
            profile,
        });
    }
    if candidate.input_kind == InputKind::Analog && !ANALOG_PINS.contains(&pin) {
        return Err(ValidationError::PinNotAnalog { pin });
    }
    if let Some(other) = others.iter().find(|s| s.pin == pin) {
        return Err(ValidationError::PinInUse {
            pin,
            sensor_id: other.id,
        });
    }

    if !candidate.measurement_kind.is_valid_for(candidate.input_kind) {
        return Err(ValidationError::MeasurementKindMismatch {
            input: candidate.input_kind,
            measurement: candidate.measurement_kind,
        });
    }

    if candidate.period == 0 {
        return Err(ValidationError::ZeroPeriod);
    }

    let limit = match candidate.measurement_kind {
        MeasurementKind::Absolute => ABSOLUTE_THRESHOLD_LIMIT,
        _ => RELATIVE_THRESHOLD_LIMIT,
    };
    // Written as a negation so NaN is rejected too.
    if !(candidate.threshold < limit) {
        return Err(ValidationError::ThresholdTooHigh {
            threshold: candidate.threshold,
            limit,
            measurement: candidate.measurement_kind,
        });
    }

    if candidate.upload_enabled {
        let channel = candidate.remote_channel.trim();
        if channel.is_empty() {
            return Err(ValidationError::MissingRemoteChannel);
        }
        if let Some(other) = others
            .iter()
            .find(|s| s.upload_enabled && s.remote_channel.trim() == channel)
        {
            return Err(ValidationError::RemoteChannelInUse {
                channel: channel.to_owned(),
                sensor_id: other.id,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::db::models::{PeriodUnit, SensorConfig, SensorState, ThresholdRule};

    fn digital(pin: u32) -> Sensor {
        SensorConfig {
            name: "door".into(),
            pin,
            period: 10,
            period_unit: PeriodUnit::Seconds,
            input_kind: InputKind::Digital,
            measurement_kind: MeasurementKind::Floating,
            threshold: 0.5,
            threshold_rule: ThresholdRule::LowerBound,
            state: SensorState::Active,
            upload_enabled: false,
            remote_channel: String::new(),
        }
        .into_sensor(Uuid::new_v4())
    }

    fn analog(pin: u32) -> Sensor {
        Sensor {
            input_kind: InputKind::Analog,
            measurement_kind: MeasurementKind::Absolute,
            threshold: 1.0,
            ..digital(pin)
        }
    }

    fn uploading(pin: u32, channel: &str) -> Sensor {
        Sensor {
            upload_enabled: true,
            remote_channel: channel.into(),
            ..digital(pin)
        }
    }

    #[test]
    fn valid_digital_sensor_passes() {
        assert_eq!(validate(&digital(40), &[], HardwareProfile::Otg), Ok(()));
    }

    #[test]
    fn blank_name_is_rejected() {
        let s = Sensor { name: "  ".into(), ..digital(5) };
        assert_eq!(validate(&s, &[], HardwareProfile::V1), Err(ValidationError::EmptyName));
    }

    #[test]
    fn pin_zero_is_rejected() {
        assert!(matches!(
            validate(&digital(0), &[], HardwareProfile::V1),
            Err(ValidationError::PinOutOfRange { pin: 0, max: 48, .. })
        ));
    }

    #[test]
    fn pin_cap_depends_on_profile() {
        assert!(matches!(
            validate(&digital(47), &[], HardwareProfile::Otg),
            Err(ValidationError::PinOutOfRange { pin: 47, max: 46, .. })
        ));
        assert_eq!(validate(&digital(47), &[], HardwareProfile::V1), Ok(()));
        assert!(validate(&digital(49), &[], HardwareProfile::V1).is_err());
    }

    #[test]
    fn analog_needs_analog_pin() {
        assert_eq!(
            validate(&analog(30), &[], HardwareProfile::V1),
            Err(ValidationError::PinNotAnalog { pin: 30 })
        );
        assert_eq!(
            validate(&analog(47), &[], HardwareProfile::V1),
            Err(ValidationError::PinNotAnalog { pin: 47 })
        );
        assert_eq!(validate(&analog(31), &[], HardwareProfile::V1), Ok(()));
        assert_eq!(validate(&analog(46), &[], HardwareProfile::Otg), Ok(()));
    }

    #[test]
    fn duplicate_pin_is_rejected_but_self_is_ignored() {
        let stored = digital(12);
        let other = digital(12);
        assert_eq!(
            validate(&other, &[stored.clone()], HardwareProfile::V1),
            Err(ValidationError::PinInUse { pin: 12, sensor_id: stored.id })
        );

        let renamed = Sensor { name: "renamed".into(), ..stored.clone() };
        assert_eq!(validate(&renamed, &[stored], HardwareProfile::V1), Ok(()));
    }

    #[test]
    fn measurement_kind_must_fit_input() {
        let s = Sensor { measurement_kind: MeasurementKind::Relative, ..digital(3) };
        assert!(matches!(
            validate(&s, &[], HardwareProfile::V1),
            Err(ValidationError::MeasurementKindMismatch { .. })
        ));
    }

    #[test]
    fn zero_period_is_rejected() {
        let s = Sensor { period: 0, ..digital(3) };
        assert_eq!(validate(&s, &[], HardwareProfile::V1), Err(ValidationError::ZeroPeriod));
    }

    #[test]
    fn threshold_limits_depend_on_measurement_kind() {
        let ok = Sensor { threshold: 3.2, ..analog(35) };
        assert_eq!(validate(&ok, &[], HardwareProfile::V1), Ok(()));

        let too_high = Sensor { threshold: 3.3, ..analog(35) };
        assert!(matches!(
            validate(&too_high, &[], HardwareProfile::V1),
            Err(ValidationError::ThresholdTooHigh { limit, .. }) if limit == 3.3
        ));

        let relative = Sensor {
            measurement_kind: MeasurementKind::Relative,
            threshold: 1.0,
            ..analog(35)
        };
        assert!(matches!(
            validate(&relative, &[], HardwareProfile::V1),
            Err(ValidationError::ThresholdTooHigh { limit, .. }) if limit == 1.0
        ));

        let nan = Sensor { threshold: f64::NAN, ..digital(3) };
        assert!(validate(&nan, &[], HardwareProfile::V1).is_err());
    }

    #[test]
    fn upload_needs_a_channel() {
        assert_eq!(
            validate(&uploading(3, " "), &[], HardwareProfile::V1),
            Err(ValidationError::MissingRemoteChannel)
        );
    }

    #[test]
    fn duplicate_channel_only_matters_between_uploading_sensors() {
        let stored = uploading(3, "temp");
        let clash = uploading(4, "temp");
        assert_eq!(
            validate(&clash, &[stored.clone()], HardwareProfile::V1),
            Err(ValidationError::RemoteChannelInUse { channel: "temp".into(), sensor_id: stored.id })
        );

        // Stored sensor keeps the channel name but does not upload.
        let idle = Sensor { upload_enabled: false, ..stored };
        assert_eq!(validate(&clash, &[idle], HardwareProfile::V1), Ok(()));

        // Candidate does not upload either.
        let quiet = Sensor { upload_enabled: false, ..uploading(5, "temp") };
        assert_eq!(validate(&quiet, &[uploading(6, "temp")], HardwareProfile::V1), Ok(()));
    }

    #[test]
    fn first_violation_wins() {
        let s = Sensor { name: String::new(), pin: 0, period: 0, ..digital(1) };
        assert_eq!(validate(&s, &[], HardwareProfile::V1), Err(ValidationError::EmptyName));
    }
}
