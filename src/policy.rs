use crate::db::models::{Sensor, ThresholdRule};

/// Raw value a hardware read reports when the measurement failed.
pub const FAILED_READING: f64 = -1.0;

/// Decides whether a raw sample is persisted for `sensor`.
///
/// The failure sentinel is always rejected. Otherwise the comparison is
/// inclusive on the threshold: lower-bound keeps `raw >= threshold`,
/// upper-bound keeps `raw <= threshold`.
pub fn accept(sensor: &Sensor, raw: f64) -> bool {
    if raw == FAILED_READING {
        return false;
    }
    match sensor.threshold_rule {
        ThresholdRule::LowerBound => raw >= sensor.threshold,
        ThresholdRule::UpperBound => raw <= sensor.threshold,
    }
}

/// Digits after the point in the exact decimal expansion of the smallest
/// subnormal `f64`; every finite `f64` is exact at this precision.
const EXACT_DIGITS: usize = 1074;

/// Rounds half away from zero to `decimals` places.
///
/// Rounding works on the exact binary value, not on its shortest decimal
/// rendering, so `2.675` (stored as `2.67499999...`) becomes `2.67`.
pub fn round_to_precision(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let places = (decimals as usize).min(EXACT_DIGITS);
    let exact = format!("{:.*}", EXACT_DIGITS, value.abs());
    let (int, frac) = exact.split_once('.').unwrap_or((exact.as_str(), ""));

    let mut digits: Vec<u8> = int.bytes().chain(frac.bytes().take(places)).collect();
    if frac.as_bytes().get(places).is_some_and(|&d| d >= b'5') {
        let mut carry = true;
        for d in digits.iter_mut().rev() {
            if *d == b'9' {
                *d = b'0';
            } else {
                *d += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.insert(0, b'1');
        }
    }

    let split = digits.len() - places;
    let mut text = String::with_capacity(digits.len() + 2);
    if value.is_sign_negative() {
        text.push('-');
    }
    text.extend(digits[..split].iter().map(|&d| char::from(d)));
    text.push('.');
    text.extend(digits[split..].iter().map(|&d| char::from(d)));

    match text.parse::<f64>() {
        Ok(rounded) if rounded == 0.0 => 0.0,
        Ok(rounded) => rounded,
        Err(_) => value,
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::db::models::{
        InputKind, MeasurementKind, PeriodUnit, SensorConfig, SensorState,
    };

    fn sensor(threshold: f64, rule: ThresholdRule) -> Sensor {
        SensorConfig {
            name: "probe".into(),
            pin: 33,
            period: 1,
            period_unit: PeriodUnit::Seconds,
            input_kind: InputKind::Analog,
            measurement_kind: MeasurementKind::Absolute,
            threshold,
            threshold_rule: rule,
            state: SensorState::Active,
            upload_enabled: false,
            remote_channel: String::new(),
        }
        .into_sensor(Uuid::new_v4())
    }

    #[test]
    fn lower_bound_is_inclusive() {
        let s = sensor(1.0, ThresholdRule::LowerBound);
        assert!(!accept(&s, 0.5));
        assert!(accept(&s, 1.0));
        assert!(accept(&s, 2.0));
    }

    #[test]
    fn upper_bound_is_inclusive() {
        let s = sensor(1.0, ThresholdRule::UpperBound);
        assert!(accept(&s, 0.5));
        assert!(accept(&s, 1.0));
        assert!(!accept(&s, 2.0));
    }

    #[test]
    fn sentinel_is_rejected_under_both_rules() {
        // -1 would pass an upper bound of 0 and a lower bound of -2 on value alone
        assert!(!accept(&sensor(0.0, ThresholdRule::UpperBound), FAILED_READING));
        assert!(!accept(&sensor(-2.0, ThresholdRule::LowerBound), FAILED_READING));
    }

    #[test]
    fn accept_matches_rule_across_a_sweep() {
        let lower = sensor(0.3, ThresholdRule::LowerBound);
        let upper = sensor(0.3, ThresholdRule::UpperBound);
        for i in -20..=40 {
            let v = f64::from(i) / 10.0;
            assert_eq!(accept(&lower, v), v != FAILED_READING && v >= 0.3, "lower {v}");
            assert_eq!(accept(&upper, v), v != FAILED_READING && v <= 0.3, "upper {v}");
        }
    }

    #[test]
    fn rounds_half_up() {
        assert_eq!(round_to_precision(1.23456, 4), 1.2346);
        assert_eq!(round_to_precision(0.125, 2), 0.13);
        assert_eq!(round_to_precision(2.0, 4), 2.0);
        assert_eq!(round_to_precision(1.5, 0), 2.0);
    }

    #[test]
    fn rounds_the_exact_binary_value() {
        // 2.675 is stored just below the tie, 0.125 is an exact tie
        assert_eq!(round_to_precision(2.675, 2), 2.67);
        assert_eq!(round_to_precision(0.125, 2), 0.13);
        assert_eq!(round_to_precision(-0.125, 2), -0.13);
        assert_eq!(round_to_precision(2.5, 0), 3.0);
    }

    #[test]
    fn rounding_carries_into_the_integer_part() {
        assert_eq!(round_to_precision(9.9996, 3), 10.0);
        assert_eq!(round_to_precision(-99.96, 1), -100.0);
    }

    #[test]
    fn tiny_negatives_round_to_positive_zero() {
        let got = round_to_precision(-0.001, 2);
        assert_eq!(got, 0.0);
        assert!(got.is_sign_positive());
    }

    #[test]
    fn rounding_a_widened_f32_sample() {
        let raw = f64::from(1.23456_f32);
        assert_eq!(round_to_precision(raw, 4), 1.2346);
    }
}
