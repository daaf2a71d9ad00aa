pub mod models;
pub mod transport;

use std::{collections::HashSet, sync::Arc};

use thiserror::Error;
use tracing::{error, info, warn};

use self::{
    models::{LocationBody, MeasurementBody},
    transport::{Transport, TransportError},
};
use crate::{
    db::models::{Order, ReadingFilter, SensorId},
    notify::Notifier,
    sensors::{RegistryError, SensorRegistry},
    settings::SettingsHandle,
    store::{SampleStore, StorageError},
};

pub use self::transport::HttpTransport;

/// Command-level conditions, checked once before any request goes out.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("no upload API key is configured")]
    MissingApiKey,
    #[error("no upload feed ID is configured")]
    MissingFeedId,
    #[error("the upload endpoint is unreachable")]
    Offline,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error("sensor {0} does not exist")]
    UnknownSensor(SensorId),
    #[error("uploading is disabled for sensor {0}")]
    NotEnabled(SensorId),
    #[error("the latest location fix was already uploaded")]
    AlreadyUploaded,
    #[error("upload endpoint answered with status {0}")]
    Status(u16),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to encode upload body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("upload task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// This many rows were sent and marked.
    Uploaded(usize),
    NothingToUpload,
}

/// Per-sensor results of one multi-sensor command, in request order.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub results: Vec<(SensorId, Result<UploadOutcome, UploadError>)>,
}

impl UploadReport {
    /// `NothingToUpload` counts as success.
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|(_, r)| r.is_ok())
    }
}

/// Where a command's requests go.
struct Target {
    url: String,
    api_key: String,
}

/// Sends not-yet-uploaded readings and location fixes to the feed.
///
/// Rows are marked only after a 2xx answer, and only the rows that were in
/// the request; readings appended meanwhile wait for the next upload.
#[derive(Clone)]
pub struct UploadCoordinator<T: Transport> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    registry: SensorRegistry,
    store: SampleStore,
    settings: SettingsHandle,
    notifier: Notifier,
    transport: T,
    base_url: String,
}

impl<T: Transport> UploadCoordinator<T> {
    pub fn new(
        registry: SensorRegistry,
        store: SampleStore,
        settings: SettingsHandle,
        notifier: Notifier,
        transport: T,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                store,
                settings,
                notifier,
                transport,
                base_url: base_url.into(),
            }),
        }
    }

    /// Uploads each sensor concurrently. One failing sensor never stops the
    /// others; a failed precondition stops the whole command. Repeated IDs
    /// are uploaded once.
    pub async fn upload_sensors(&self, ids: &[SensorId]) -> Result<UploadReport, PreconditionError> {
        let target = Arc::new(self.target().await?);

        let mut seen = HashSet::new();
        let handles: Vec<_> = ids
            .iter()
            .filter(|id| seen.insert(**id))
            .map(|&id| {
                let this = self.clone();
                let target = target.clone();
                (id, tokio::spawn(async move { this.upload_sensor(id, &target).await }))
            })
            .collect();

        let mut report = UploadReport::default();
        for (id, handle) in handles {
            let result = handle
                .await
                .unwrap_or_else(|e| Err(UploadError::Aborted(e.to_string())));
            report.results.push((id, result));
        }
        Ok(report)
    }

    /// Sends the most recent location fix if it has not been sent yet.
    pub async fn upload_location(&self) -> Result<UploadOutcome, UploadError> {
        let target = self.target().await?;

        let Some(fix) = self.inner.store.latest_location().await? else {
            return Ok(UploadOutcome::NothingToUpload);
        };
        if fix.uploaded {
            return Err(UploadError::AlreadyUploaded);
        }

        let body = serde_json::to_string(&LocationBody::try_from(&fix)?)?;
        self.put(&target, body).await?;
        self.inner.store.mark_location_uploaded(fix.row_id).await?;

        info!(row_id = fix.row_id, "Location uploaded");
        self.inner.notifier.info("Location uploaded").await;
        Ok(UploadOutcome::Uploaded(1))
    }

    /// One automatic upload pass: every active upload-enabled sensor, then
    /// the latest location when location updates are on. Problems become
    /// notices; nothing is returned.
    pub async fn run_cycle(&self) {
        let sensors = match self.inner.registry.upload_enabled_active().await {
            Ok(sensors) => sensors,
            Err(e) => {
                error!(error = %e, "Could not load upload-enabled sensors");
                return;
            }
        };
        let ids: Vec<SensorId> = sensors.iter().map(|s| s.id).collect();

        if !ids.is_empty() {
            match self.upload_sensors(&ids).await {
                Ok(report) if !report.all_succeeded() => {
                    warn!("Automatic upload finished with failures");
                }
                Ok(_) => {}
                Err(e) => {
                    self.inner.notifier.warn(format!("Automatic upload skipped: {e}")).await;
                    return;
                }
            }
        }

        if self.inner.settings.snapshot().await.location_updates {
            match self.upload_location().await {
                Ok(_) | Err(UploadError::AlreadyUploaded) => {}
                Err(e) => {
                    self.inner.notifier.warn(format!("Location upload failed: {e}")).await;
                }
            }
        }
    }

    async fn upload_sensor(&self, id: SensorId, target: &Target) -> Result<UploadOutcome, UploadError> {
        let result = self.try_upload_sensor(id, target).await;
        match &result {
            Ok(UploadOutcome::Uploaded(n)) => {
                self.inner
                    .notifier
                    .info(format!("Uploaded {n} readings of sensor {id}"))
                    .await;
            }
            Ok(UploadOutcome::NothingToUpload) => {
                info!(sensor_id = %id, "Nothing to upload");
            }
            Err(e) => {
                self.inner
                    .notifier
                    .warn(format!("Upload of sensor {id} failed: {e}"))
                    .await;
            }
        }
        result
    }

    async fn try_upload_sensor(&self, id: SensorId, target: &Target) -> Result<UploadOutcome, UploadError> {
        let sensor = match self.inner.registry.get(id).await {
            Ok(sensor) => sensor,
            Err(RegistryError::NotFound(_)) => return Err(UploadError::UnknownSensor(id)),
            Err(RegistryError::Storage(e)) => return Err(e.into()),
            Err(e) => return Err(UploadError::Aborted(e.to_string())),
        };
        if !sensor.upload_enabled {
            return Err(UploadError::NotEnabled(id));
        }

        let pending = self
            .inner
            .store
            .query_readings(id, ReadingFilter::NotUploaded, Order::Ascending)
            .await?;
        if pending.is_empty() {
            return Ok(UploadOutcome::NothingToUpload);
        }

        let body = serde_json::to_string(&MeasurementBody::new(&sensor.remote_channel, &pending))?;
        self.put(target, body).await?;

        let row_ids: Vec<_> = pending.iter().map(|r| r.row_id).collect();
        self.inner.store.mark_uploaded(id, &row_ids).await?;
        info!(sensor_id = %id, rows = row_ids.len(), "Readings uploaded");
        Ok(UploadOutcome::Uploaded(row_ids.len()))
    }

    async fn put(&self, target: &Target, body: String) -> Result<(), UploadError> {
        let status = self
            .inner
            .transport
            .put_json(&target.url, &target.api_key, body)
            .await?;
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(UploadError::Status(status))
        }
    }

    async fn target(&self) -> Result<Target, PreconditionError> {
        let settings = self.inner.settings.snapshot().await;
        let api_key = settings.api_key().ok_or(PreconditionError::MissingApiKey)?;
        let feed_id = settings.feed_id().ok_or(PreconditionError::MissingFeedId)?;
        if !self.inner.transport.is_online().await {
            return Err(PreconditionError::Offline);
        }
        Ok(Target {
            url: format!("{}/{}", self.inner.base_url.trim_end_matches('/'), feed_id),
            api_key: api_key.to_owned(),
        })
    }
}
