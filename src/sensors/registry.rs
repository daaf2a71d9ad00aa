use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::validator::{validate, ValidationError};
use crate::{
    db::models::{Order, ReadingFilter, Sensor, SensorConfig, SensorId, SensorState},
    export::{ExportError, Exporter},
    notify::Notifier,
    settings::SettingsHandle,
    store::{SampleStore, StorageError},
};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("sensor {0} not found")]
    NotFound(SensorId),
    #[error("readings of sensor {id} could not be exported; sensor kept: {source}")]
    Export {
        id: SensorId,
        #[source]
        source: ExportError,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<sqlx::Error> for RegistryError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(StorageError::Database(e))
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

const SELECT_SENSOR: &str = "SELECT id, name, pin, period, period_unit, input_kind, measurement_kind, \
     threshold, threshold_rule, state, upload_enabled, remote_channel FROM sensors";

/// Sensor definitions, validated before every write.
#[derive(Clone)]
pub struct SensorRegistry {
    pool: SqlitePool,
    store: SampleStore,
    exporter: Exporter,
    settings: SettingsHandle,
    notifier: Notifier,
}

impl SensorRegistry {
    pub fn new(
        pool: SqlitePool,
        store: SampleStore,
        exporter: Exporter,
        settings: SettingsHandle,
        notifier: Notifier,
    ) -> Self {
        Self {
            pool,
            store,
            exporter,
            settings,
            notifier,
        }
    }

    /// All sensors in creation order.
    pub async fn list(&self) -> RegistryResult<Vec<Sensor>> {
        let sensors = sqlx::query_as::<_, Sensor>(&format!("{SELECT_SENSOR} ORDER BY rowid"))
            .fetch_all(&self.pool)
            .await?;
        Ok(sensors)
    }

    pub async fn get(&self, id: SensorId) -> RegistryResult<Sensor> {
        sqlx::query_as::<_, Sensor>(&format!("{SELECT_SENSOR} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RegistryError::NotFound(id))
    }

    pub async fn active(&self) -> RegistryResult<Vec<Sensor>> {
        let sensors = sqlx::query_as::<_, Sensor>(&format!("{SELECT_SENSOR} WHERE state = ? ORDER BY rowid"))
            .bind(SensorState::Active)
            .fetch_all(&self.pool)
            .await?;
        Ok(sensors)
    }

    /// Active sensors that push their readings upstream.
    pub async fn upload_enabled_active(&self) -> RegistryResult<Vec<Sensor>> {
        let sensors = sqlx::query_as::<_, Sensor>(&format!(
            "{SELECT_SENSOR} WHERE state = ? AND upload_enabled = 1 ORDER BY rowid"
        ))
        .bind(SensorState::Active)
        .fetch_all(&self.pool)
        .await?;
        Ok(sensors)
    }

    /// Validates and stores a new sensor together with its empty reading log.
    pub async fn create(&self, config: SensorConfig) -> RegistryResult<Sensor> {
        let sensor = normalize(config).into_sensor(Uuid::new_v4());
        let profile = self.settings.snapshot().await.hardware_profile;
        validate(&sensor, &self.list().await?, profile)?;

        // The log comes first: a sensor row must never exist without one.
        self.store.create_log(sensor.id).await?;
        if let Err(e) = self.insert(&sensor).await {
            self.store.drop_log(sensor.id).await?;
            return Err(e);
        }

        info!(sensor_id = %sensor.id, name = %sensor.name, pin = sensor.pin, "Sensor created");
        Ok(sensor)
    }

    /// Replaces the definition of `id`. The reading log is kept.
    pub async fn update(&self, id: SensorId, config: SensorConfig) -> RegistryResult<Sensor> {
        self.get(id).await?;
        let sensor = normalize(config).into_sensor(id);
        let profile = self.settings.snapshot().await.hardware_profile;
        validate(&sensor, &self.list().await?, profile)?;

        sqlx::query(
            "UPDATE sensors SET name = ?, pin = ?, period = ?, period_unit = ?, input_kind = ?, \
             measurement_kind = ?, threshold = ?, threshold_rule = ?, state = ?, \
             upload_enabled = ?, remote_channel = ? WHERE id = ?",
        )
        .bind(&sensor.name)
        .bind(sensor.pin)
        .bind(sensor.period)
        .bind(sensor.period_unit)
        .bind(sensor.input_kind)
        .bind(sensor.measurement_kind)
        .bind(sensor.threshold)
        .bind(sensor.threshold_rule)
        .bind(sensor.state)
        .bind(sensor.upload_enabled)
        .bind(&sensor.remote_channel)
        .bind(id)
        .execute(&self.pool)
        .await?;

        info!(sensor_id = %id, "Sensor updated");
        Ok(sensor)
    }

    pub async fn set_state(&self, id: SensorId, state: SensorState) -> RegistryResult<Sensor> {
        let result = sqlx::query("UPDATE sensors SET state = ? WHERE id = ?")
            .bind(state)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RegistryError::NotFound(id));
        }
        info!(sensor_id = %id, state = ?state, "Sensor state changed");
        self.get(id).await
    }

    /// Exports the sensor's readings, then drops its log and definition.
    ///
    /// A failed export aborts the delete and leaves everything in place.
    pub async fn delete(&self, id: SensorId) -> RegistryResult<()> {
        let sensor = self.get(id).await?;
        let readings = self
            .store
            .query_readings(id, ReadingFilter::All, Order::Ascending)
            .await?;

        match self.exporter.export_readings(&sensor, &readings).await {
            Ok(path) => {
                self.notifier
                    .info(format!(
                        "Exported {} readings of '{}' to {}",
                        readings.len(),
                        sensor.name,
                        path.display()
                    ))
                    .await;
            }
            Err(source) => {
                self.notifier
                    .error(format!("Export of '{}' failed: {source}", sensor.name))
                    .await;
                return Err(RegistryError::Export { id, source });
            }
        }

        let mut tx = self.pool.begin().await?;
        SampleStore::drop_log_in(&mut *tx, id).await?;
        sqlx::query("DELETE FROM sensors WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(sensor_id = %id, name = %sensor.name, "Sensor deleted");
        Ok(())
    }

    async fn insert(&self, sensor: &Sensor) -> RegistryResult<()> {
        sqlx::query(
            "INSERT INTO sensors (id, name, pin, period, period_unit, input_kind, measurement_kind, \
             threshold, threshold_rule, state, upload_enabled, remote_channel) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(sensor.id)
        .bind(&sensor.name)
        .bind(sensor.pin)
        .bind(sensor.period)
        .bind(sensor.period_unit)
        .bind(sensor.input_kind)
        .bind(sensor.measurement_kind)
        .bind(sensor.threshold)
        .bind(sensor.threshold_rule)
        .bind(sensor.state)
        .bind(sensor.upload_enabled)
        .bind(&sensor.remote_channel)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn normalize(mut config: SensorConfig) -> SensorConfig {
    config.name = config.name.trim().to_owned();
    config.remote_channel = config.remote_channel.trim().to_owned();
    config
}
