use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::db::models::{HardwareProfile, PeriodUnit};

/// Operator settings consumed by the collection core.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Decimal places kept when a reading is persisted.
    pub decimal_precision: u32,
    /// Sample from the simulator instead of the bus.
    pub simulation_mode: bool,
    pub auto_upload: bool,
    pub auto_upload_frequency: u32,
    pub auto_upload_unit: PeriodUnit,
    pub hardware_profile: HardwareProfile,
    /// Hold the wake lock while collecting.
    pub keep_awake: bool,
    pub location_updates: bool,
    pub location_frequency: u32,
    pub location_unit: PeriodUnit,
    pub api_key: Option<String>,
    pub feed_id: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            decimal_precision: 4,
            simulation_mode: false,
            auto_upload: false,
            auto_upload_frequency: 1,
            auto_upload_unit: PeriodUnit::Hours,
            hardware_profile: HardwareProfile::V1,
            keep_awake: false,
            location_updates: false,
            location_frequency: 1,
            location_unit: PeriodUnit::Hours,
            api_key: None,
            feed_id: None,
        }
    }
}

impl Settings {
    pub fn upload_period(&self) -> Duration {
        self.auto_upload_unit.times(self.auto_upload_frequency)
    }

    pub fn location_period(&self) -> Duration {
        self.location_unit.times(self.location_frequency)
    }

    /// The API key, if one is set and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        non_blank(self.api_key.as_deref())
    }

    /// The feed ID, if one is set and non-blank.
    pub fn feed_id(&self) -> Option<&str> {
        non_blank(self.feed_id.as_deref())
    }

    pub fn validate(&self) -> Result<(), InvalidSettings> {
        if self.auto_upload_frequency == 0 {
            return Err(InvalidSettings::ZeroFrequency("auto_upload_frequency"));
        }
        if self.location_frequency == 0 {
            return Err(InvalidSettings::ZeroFrequency("location_frequency"));
        }
        if self.decimal_precision > 15 {
            return Err(InvalidSettings::Precision(self.decimal_precision));
        }
        Ok(())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Error, PartialEq)]
pub enum InvalidSettings {
    #[error("{0} must be greater than zero")]
    ZeroFrequency(&'static str),
    #[error("decimal precision {0} is out of range (0..=15)")]
    Precision(u32),
}

/// Partial update for `PUT /settings`. Absent fields stay unchanged; an empty
/// `api_key` or `feed_id` clears the value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SettingsUpdate {
    pub decimal_precision: Option<u32>,
    pub simulation_mode: Option<bool>,
    pub auto_upload: Option<bool>,
    pub auto_upload_frequency: Option<u32>,
    pub auto_upload_unit: Option<PeriodUnit>,
    pub hardware_profile: Option<HardwareProfile>,
    pub keep_awake: Option<bool>,
    pub location_updates: Option<bool>,
    pub location_frequency: Option<u32>,
    pub location_unit: Option<PeriodUnit>,
    pub api_key: Option<String>,
    pub feed_id: Option<String>,
}

impl SettingsUpdate {
    fn apply_to(self, s: &mut Settings) {
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(v) = self.$field { s.$field = v; })*
            };
        }
        set!(
            decimal_precision,
            simulation_mode,
            auto_upload,
            auto_upload_frequency,
            auto_upload_unit,
            hardware_profile,
            keep_awake,
            location_updates,
            location_frequency,
            location_unit
        );
        if let Some(key) = self.api_key {
            s.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(feed) = self.feed_id {
            s.feed_id = Some(feed).filter(|f| !f.is_empty());
        }
    }
}

/// Shared, runtime-mutable [`Settings`].
///
/// Readers take a snapshot; a collection cycle keeps the snapshot it started
/// with until it is restarted.
#[derive(Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<Settings>>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub async fn snapshot(&self) -> Settings {
        self.inner.read().await.clone()
    }

    /// Applies `update` atomically; on validation failure nothing changes.
    pub async fn update(&self, update: SettingsUpdate) -> Result<Settings, InvalidSettings> {
        let mut guard = self.inner.write().await;
        let mut next = guard.clone();
        update.apply_to(&mut next);
        next.validate()?;
        *guard = next.clone();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_operator_expectations() {
        let s = Settings::default();
        assert_eq!(s.decimal_precision, 4);
        assert_eq!(s.hardware_profile, HardwareProfile::V1);
        assert_eq!(s.upload_period(), Duration::from_secs(3600));
        assert!(s.api_key().is_none());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn blank_credentials_count_as_missing() {
        let s = Settings {
            api_key: Some("   ".into()),
            feed_id: Some("".into()),
            ..Settings::default()
        };
        assert!(s.api_key().is_none());
        assert!(s.feed_id().is_none());
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let handle = SettingsHandle::new(Settings::default());
        let got = handle
            .update(SettingsUpdate {
                decimal_precision: Some(2),
                api_key: Some("k".into()),
                ..SettingsUpdate::default()
            })
            .await
            .unwrap();

        assert_eq!(got.decimal_precision, 2);
        assert_eq!(got.api_key(), Some("k"));
        assert_eq!(got.auto_upload_unit, PeriodUnit::Hours);
    }

    #[tokio::test]
    async fn empty_api_key_clears_it() {
        let handle = SettingsHandle::new(Settings {
            api_key: Some("k".into()),
            ..Settings::default()
        });
        handle
            .update(SettingsUpdate {
                api_key: Some(String::new()),
                ..SettingsUpdate::default()
            })
            .await
            .unwrap();
        assert!(handle.snapshot().await.api_key.is_none());
    }

    #[tokio::test]
    async fn invalid_update_is_not_applied() {
        let handle = SettingsHandle::new(Settings::default());
        let err = handle
            .update(SettingsUpdate {
                auto_upload_frequency: Some(0),
                decimal_precision: Some(3),
                ..SettingsUpdate::default()
            })
            .await
            .unwrap_err();

        assert_eq!(err, InvalidSettings::ZeroFrequency("auto_upload_frequency"));
        assert_eq!(handle.snapshot().await.decimal_precision, 4);
    }
}
