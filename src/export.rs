//! CSV snapshots of the stored tables.
//!
//! Files land in `{export_dir}/{table}_{timestamp}.csv`. Every export writes a
//! new file; nothing is overwritten.

use std::{
    borrow::Cow,
    fmt::Write as _,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::{
    db::models::{LocationFix, Order, Reading, ReadingFilter, Sensor},
    store::{SampleStore, StorageError},
};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone)]
pub struct Exporter {
    dir: PathBuf,
}

impl Exporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn export_readings(&self, sensor: &Sensor, readings: &[Reading]) -> Result<PathBuf, ExportError> {
        let mut csv = String::from("row_id,timestamp,value,uploaded\n");
        for r in readings {
            let _ = writeln!(csv, "{},{},{},{}", r.row_id, field(&r.timestamp), r.value, u8::from(r.uploaded));
        }
        self.write(&format!("readings_{}", sensor.id), csv).await
    }

    pub async fn export_locations(&self, fixes: &[LocationFix]) -> Result<PathBuf, ExportError> {
        let mut csv = String::from("row_id,timestamp,altitude,latitude,longitude,uploaded\n");
        for f in fixes {
            let _ = writeln!(
                csv,
                "{},{},{},{},{},{}",
                f.row_id,
                field(&f.timestamp),
                f.altitude,
                f.latitude,
                f.longitude,
                u8::from(f.uploaded)
            );
        }
        self.write("locations", csv).await
    }

    pub async fn export_sensors(&self, sensors: &[Sensor]) -> Result<PathBuf, ExportError> {
        let mut csv = String::from(
            "id,name,pin,period,period_unit,input_kind,measurement_kind,threshold,\
             threshold_rule,state,upload_enabled,remote_channel\n",
        );
        for s in sensors {
            let _ = writeln!(
                csv,
                "{},{},{},{},{},{},{},{},{},{},{},{}",
                s.id,
                field(&s.name),
                s.pin,
                s.period,
                label(&s.period_unit),
                label(&s.input_kind),
                label(&s.measurement_kind),
                s.threshold,
                label(&s.threshold_rule),
                label(&s.state),
                u8::from(s.upload_enabled),
                field(&s.remote_channel),
            );
        }
        self.write("sensors", csv).await
    }

    /// Sensors table, location log and one file per sensor's readings.
    pub async fn export_all(&self, sensors: &[Sensor], store: &SampleStore) -> Result<Vec<PathBuf>, ExportError> {
        let mut paths = vec![self.export_sensors(sensors).await?];

        let fixes = store.query_locations(ReadingFilter::All, Order::Ascending).await?;
        paths.push(self.export_locations(&fixes).await?);

        for sensor in sensors {
            let readings = store
                .query_readings(sensor.id, ReadingFilter::All, Order::Ascending)
                .await?;
            paths.push(self.export_readings(sensor, &readings).await?);
        }
        Ok(paths)
    }

    async fn write(&self, stem: &str, contents: String) -> Result<PathBuf, ExportError> {
        let ts = chrono::Local::now().format("%Y%m%dT%H%M%S%.3f");
        let path = self.dir.join(format!("{stem}_{ts}.csv"));

        fs::create_dir_all(&self.dir).await.map_err(|source| ExportError::Io {
            path: self.dir.clone(),
            source,
        })?;
        fs::write(&path, contents.as_bytes())
            .await
            .map_err(|source| ExportError::Io { path: path.clone(), source })?;

        debug!(path = %path.display(), bytes = contents.len(), "CSV export written");
        Ok(path)
    }
}

/// Quotes a text field when it would break the row.
fn field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// The snake_case name serde gives an enum variant.
fn label<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}
