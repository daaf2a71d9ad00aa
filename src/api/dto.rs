use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    db::models::{HardwareProfile, Order, PeriodUnit, ReadingFilter, SensorState},
    settings::Settings,
    upload::{UploadError, UploadOutcome, UploadReport},
};

/// Request body for `PUT /sensors/{id}/state`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StateChange {
    pub state: SensorState,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReadingsQuery {
    /// `all` (default) or `not_uploaded`.
    pub filter: Option<ReadingFilter>,
    /// `ascending` (default, insertion order) or `descending`.
    pub order: Option<Order>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeletedDto {
    pub deleted: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExportDto {
    pub files: Vec<String>,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Current operator settings. The API key itself is never echoed.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SettingsDto {
    pub decimal_precision: u32,
    pub simulation_mode: bool,
    pub auto_upload: bool,
    pub auto_upload_frequency: u32,
    pub auto_upload_unit: PeriodUnit,
    pub hardware_profile: HardwareProfile,
    pub keep_awake: bool,
    pub location_updates: bool,
    pub location_frequency: u32,
    pub location_unit: PeriodUnit,
    pub api_key_set: bool,
    pub feed_id: Option<String>,
}

impl From<Settings> for SettingsDto {
    fn from(s: Settings) -> Self {
        Self {
            api_key_set: s.api_key().is_some(),
            feed_id: s.feed_id().map(str::to_owned),
            decimal_precision: s.decimal_precision,
            simulation_mode: s.simulation_mode,
            auto_upload: s.auto_upload,
            auto_upload_frequency: s.auto_upload_frequency,
            auto_upload_unit: s.auto_upload_unit,
            hardware_profile: s.hardware_profile,
            keep_awake: s.keep_awake,
            location_updates: s.location_updates,
            location_frequency: s.location_frequency,
            location_unit: s.location_unit,
        }
    }
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

/// Request body for `POST /uploads/sensors`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadRequest {
    pub sensor_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Uploaded,
    NothingToUpload,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SensorUploadDto {
    pub sensor_id: Uuid,
    pub outcome: OutcomeKind,
    /// Rows sent and marked uploaded.
    pub rows: usize,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadReportDto {
    /// True when no sensor failed; `nothing_to_upload` counts as success.
    pub all_succeeded: bool,
    pub results: Vec<SensorUploadDto>,
}

impl From<UploadReport> for UploadReportDto {
    fn from(report: UploadReport) -> Self {
        Self {
            all_succeeded: report.all_succeeded(),
            results: report
                .results
                .into_iter()
                .map(|(sensor_id, result)| {
                    let (outcome, rows, error) = outcome_parts(result);
                    SensorUploadDto {
                        sensor_id,
                        outcome,
                        rows,
                        error,
                    }
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LocationUploadDto {
    pub outcome: OutcomeKind,
    pub rows: usize,
}

impl From<UploadOutcome> for LocationUploadDto {
    fn from(outcome: UploadOutcome) -> Self {
        let (outcome, rows, _) = outcome_parts(Ok(outcome));
        Self { outcome, rows }
    }
}

fn outcome_parts(result: Result<UploadOutcome, UploadError>) -> (OutcomeKind, usize, Option<String>) {
    match result {
        Ok(UploadOutcome::Uploaded(n)) => (OutcomeKind::Uploaded, n, None),
        Ok(UploadOutcome::NothingToUpload) => (OutcomeKind::NothingToUpload, 0, None),
        Err(e) => (OutcomeKind::Failed, 0, Some(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_view_hides_api_key() {
        let dto = SettingsDto::from(Settings {
            api_key: Some("secret".into()),
            feed_id: Some("  ".into()),
            ..Settings::default()
        });
        assert!(dto.api_key_set);
        assert_eq!(dto.feed_id, None);
        let json = serde_json::to_string(&dto).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn report_lists_failures_with_reason() {
        let ok = Uuid::new_v4();
        let bad = Uuid::new_v4();
        let dto = UploadReportDto::from(UploadReport {
            results: vec![
                (ok, Ok(UploadOutcome::Uploaded(3))),
                (bad, Err(UploadError::NotEnabled(bad))),
            ],
        });
        assert!(!dto.all_succeeded);
        assert_eq!(dto.results[0].outcome, OutcomeKind::Uploaded);
        assert_eq!(dto.results[0].rows, 3);
        assert_eq!(dto.results[1].outcome, OutcomeKind::Failed);
        assert!(dto.results[1].error.as_deref().unwrap().contains("disabled"));
    }
}
