use std::{path::PathBuf, str::FromStr};

use anyhow::{Context, Result};

use crate::{
    db::models::{HardwareProfile, PeriodUnit, Position},
    settings::Settings,
};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    /// Feed collection URL; the feed ID is appended as the last path segment.
    pub upload_base_url: String,
    pub export_dir: PathBuf,
    /// IIO device exposing `in_voltageN_raw` for the analog pins.
    pub iio_device_path: PathBuf,
    /// sysfs GPIO class directory for the digital pins.
    pub gpio_path: PathBuf,
    /// Directory holding `wake_lock` / `wake_unlock`.
    pub wake_lock_path: PathBuf,
    /// Fixed position for stationary installs, `"lat,lon,alt"`.
    pub location_fix: Option<Position>,
    /// Initial operator settings; changeable at runtime.
    pub settings: Settings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: optional("DATABASE_URL", "sqlite://sensor_collector.db"),
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            upload_base_url: optional("UPLOAD_BASE_URL", "https://api.xively.com/v2/feeds"),
            export_dir: optional("EXPORT_DIR", "exports").into(),
            iio_device_path: optional("IIO_DEVICE_PATH", "/sys/bus/iio/devices/iio:device0").into(),
            gpio_path: optional("GPIO_PATH", "/sys/class/gpio").into(),
            wake_lock_path: optional("WAKE_LOCK_PATH", "/sys/power").into(),
            location_fix: std::env::var("LOCATION_FIX")
                .ok()
                .map(|raw| parse_position(&raw))
                .transpose()?,
            settings: settings_from_env()?,
        })
    }
}

fn settings_from_env() -> Result<Settings> {
    let settings = Settings {
        decimal_precision: parsed("DECIMAL_PRECISION", "4")?,
        simulation_mode: parse_bool("SIMULATION_MODE", &optional("SIMULATION_MODE", "false"))?,
        auto_upload: parse_bool("AUTO_UPLOAD", &optional("AUTO_UPLOAD", "false"))?,
        auto_upload_frequency: parsed("AUTO_UPLOAD_FREQUENCY", "1")?,
        auto_upload_unit: parsed::<PeriodUnit>("AUTO_UPLOAD_UNIT", "hours")?,
        hardware_profile: parsed::<HardwareProfile>("HARDWARE_PROFILE", "v1")?,
        keep_awake: parse_bool("KEEP_AWAKE", &optional("KEEP_AWAKE", "false"))?,
        location_updates: parse_bool("LOCATION_UPDATES", &optional("LOCATION_UPDATES", "false"))?,
        location_frequency: parsed("LOCATION_FREQUENCY", "1")?,
        location_unit: parsed::<PeriodUnit>("LOCATION_UNIT", "hours")?,
        api_key: std::env::var("UPLOAD_API_KEY").ok(),
        feed_id: std::env::var("UPLOAD_FEED_ID").ok(),
    };
    settings.validate().context("invalid operator settings")?;
    Ok(settings)
}

/// Parse `"lat,lon,alt"` into a [`Position`].
fn parse_position(raw: &str) -> Result<Position> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("LOCATION_FIX must be 'lat,lon,alt', got: {raw:?}"))?;

    match parts.as_slice() {
        [latitude, longitude, altitude] => Ok(Position {
            latitude: *latitude,
            longitude: *longitude,
            altitude: *altitude,
        }),
        _ => Err(anyhow::anyhow!("LOCATION_FIX must be 'lat,lon,alt', got: {raw:?}")),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("{key} must be a boolean, got: {other:?}")),
    }
}

fn parsed<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{key} is invalid: {e}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_position_reads_lat_lon_alt() {
        let p = parse_position("52.52, 13.40, 34.5").unwrap();
        assert_eq!(p.latitude, 52.52);
        assert_eq!(p.longitude, 13.40);
        assert_eq!(p.altitude, 34.5);
    }

    #[test]
    fn parse_position_wrong_arity_errors() {
        let err = parse_position("52.52,13.40").unwrap_err();
        assert!(err.to_string().contains("lat,lon,alt"));
    }

    #[test]
    fn parse_position_non_numeric_errors() {
        assert!(parse_position("north,13.4,0").is_err());
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("X", "true").unwrap());
        assert!(parse_bool("X", "1").unwrap());
        assert!(!parse_bool("X", "off").unwrap());
        let err = parse_bool("KEEP_AWAKE", "maybe").unwrap_err();
        assert!(err.to_string().contains("KEEP_AWAKE"));
    }
}
