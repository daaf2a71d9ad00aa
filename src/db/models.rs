use std::{fmt, str::FromStr, time::Duration};

use chrono::Local;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

pub type SensorId = Uuid;

/// Position of a row inside its log. Monotonic per log, never reused.
pub type RowId = i64;

/// Timestamp layout expected by the upload endpoint, e.g. `2013-07-24T13:11:25+0200`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Current local time rendered with [`TIMESTAMP_FORMAT`].
pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

// ---------------------------------------------------------------------------
// Sensor attributes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PeriodUnit {
    Seconds,
    Minutes,
    Hours,
}

impl PeriodUnit {
    pub fn millis(self) -> u64 {
        match self {
            PeriodUnit::Seconds => 1_000,
            PeriodUnit::Minutes => 60_000,
            PeriodUnit::Hours => 3_600_000,
        }
    }

    /// `frequency` units as a [`Duration`].
    pub fn times(self, frequency: u32) -> Duration {
        Duration::from_millis(u64::from(frequency) * self.millis())
    }
}

impl FromStr for PeriodUnit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "seconds" => Ok(Self::Seconds),
            "minutes" => Ok(Self::Minutes),
            "hours" => Ok(Self::Hours),
            other => Err(anyhow::anyhow!("unknown period unit: {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Analog,
    Digital,
}

/// How a pin is read.
///
/// Analog inputs support `Absolute` (volts, 0..3.3) and `Relative` (0..1).
/// Digital inputs support `Floating`, `PullDown` and `PullUp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    Absolute,
    Relative,
    Floating,
    PullDown,
    PullUp,
}

impl MeasurementKind {
    pub fn is_valid_for(self, input: InputKind) -> bool {
        match input {
            InputKind::Analog => matches!(self, Self::Absolute | Self::Relative),
            InputKind::Digital => matches!(self, Self::Floating | Self::PullDown | Self::PullUp),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ThresholdRule {
    /// Keep values `>= threshold`.
    LowerBound,
    /// Keep values `<= threshold`.
    UpperBound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SensorState {
    Active,
    Inactive,
}

/// Board revision. Decides the highest valid pin number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HardwareProfile {
    #[default]
    V1,
    Otg,
}

impl HardwareProfile {
    pub fn max_pin(self) -> u32 {
        match self {
            HardwareProfile::V1 => 48,
            HardwareProfile::Otg => 46,
        }
    }
}

impl FromStr for HardwareProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "v1" => Ok(Self::V1),
            "otg" => Ok(Self::Otg),
            other => Err(anyhow::anyhow!("unknown hardware profile: {other:?}")),
        }
    }
}

impl fmt::Display for HardwareProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HardwareProfile::V1 => "v1",
            HardwareProfile::Otg => "otg",
        })
    }
}

// ---------------------------------------------------------------------------
// Sensor
// ---------------------------------------------------------------------------

/// Operator-supplied sensor definition, before an ID is assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SensorConfig {
    pub name: String,
    pub pin: u32,
    pub period: u32,
    pub period_unit: PeriodUnit,
    pub input_kind: InputKind,
    pub measurement_kind: MeasurementKind,
    pub threshold: f64,
    pub threshold_rule: ThresholdRule,
    pub state: SensorState,
    #[serde(default)]
    pub upload_enabled: bool,
    /// Datastream on the upload feed. Required when `upload_enabled`.
    #[serde(default)]
    pub remote_channel: String,
}

impl SensorConfig {
    pub fn into_sensor(self, id: SensorId) -> Sensor {
        Sensor {
            id,
            name: self.name,
            pin: self.pin,
            period: self.period,
            period_unit: self.period_unit,
            input_kind: self.input_kind,
            measurement_kind: self.measurement_kind,
            threshold: self.threshold,
            threshold_rule: self.threshold_rule,
            state: self.state,
            upload_enabled: self.upload_enabled,
            remote_channel: self.remote_channel,
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Sensor {
    pub id: Uuid,
    pub name: String,
    pub pin: u32,
    pub period: u32,
    pub period_unit: PeriodUnit,
    pub input_kind: InputKind,
    pub measurement_kind: MeasurementKind,
    pub threshold: f64,
    pub threshold_rule: ThresholdRule,
    pub state: SensorState,
    pub upload_enabled: bool,
    pub remote_channel: String,
}

impl Sensor {
    /// Sampling interval: `period * period_unit`.
    pub fn interval(&self) -> Duration {
        self.period_unit.times(self.period)
    }

    pub fn is_active(&self) -> bool {
        self.state == SensorState::Active
    }
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Reading {
    pub sensor_id: Uuid,
    pub row_id: RowId,
    pub timestamp: String,
    /// Already rounded to the configured decimal precision.
    pub value: f64,
    pub uploaded: bool,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct LocationFix {
    pub row_id: RowId,
    pub timestamp: String,
    pub altitude: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub uploaded: bool,
}

/// A position reported by a location source, not yet persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Metres above sea level.
    pub altitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReadingFilter {
    #[default]
    All,
    NotUploaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    /// Insertion order.
    #[default]
    Ascending,
    Descending,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_unit_multiplies_frequency() {
        assert_eq!(PeriodUnit::Seconds.times(5), Duration::from_secs(5));
        assert_eq!(PeriodUnit::Minutes.times(2), Duration::from_secs(120));
        assert_eq!(PeriodUnit::Hours.times(1), Duration::from_secs(3600));
    }

    #[test]
    fn measurement_kind_subsets_per_input() {
        assert!(MeasurementKind::Absolute.is_valid_for(InputKind::Analog));
        assert!(MeasurementKind::Relative.is_valid_for(InputKind::Analog));
        assert!(!MeasurementKind::PullUp.is_valid_for(InputKind::Analog));
        assert!(MeasurementKind::Floating.is_valid_for(InputKind::Digital));
        assert!(!MeasurementKind::Absolute.is_valid_for(InputKind::Digital));
    }

    #[test]
    fn hardware_profile_parses_and_caps_pins() {
        assert_eq!("v1".parse::<HardwareProfile>().unwrap().max_pin(), 48);
        assert_eq!("otg".parse::<HardwareProfile>().unwrap().max_pin(), 46);
        assert!("v2".parse::<HardwareProfile>().is_err());
    }

    #[test]
    fn timestamp_has_numeric_offset() {
        let ts = timestamp_now();
        // yyyy-MM-ddTHH:mm:ss+hhmm
        assert_eq!(ts.len(), 24);
        assert_eq!(&ts[10..11], "T");
        assert!(matches!(&ts[19..20], "+" | "-"));
    }
}
