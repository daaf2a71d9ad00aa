use std::sync::Arc;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    db::models::{timestamp_now, RowId, Sensor},
    hardware::{self, Hardware},
    policy,
    store::{SampleStore, StorageResult},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    Stored(RowId),
    /// Sentinel or outside the threshold.
    Rejected(f64),
}

/// Samples one sensor on its own period until cancelled.
pub struct SensorSampler {
    sensor: Sensor,
    hardware: Arc<dyn Hardware>,
    store: SampleStore,
    precision: u32,
}

impl SensorSampler {
    pub fn new(sensor: Sensor, hardware: Arc<dyn Hardware>, store: SampleStore, precision: u32) -> Self {
        Self {
            sensor,
            hardware,
            store,
            precision,
        }
    }

    /// Runs until `cancel` fires. Spawn this on the supervisor's tracker.
    ///
    /// The first tick fires at once. A tick that overruns the period pushes
    /// the next one back instead of bursting, and cancellation is only seen
    /// between ticks so a started tick always finishes.
    pub async fn run(self, cancel: CancellationToken) {
        let period = self.sensor.interval();
        info!(
            sensor_id = %self.sensor.id,
            name = %self.sensor.name,
            period_ms = period.as_millis() as u64,
            "Sampler started"
        );

        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.tick().await {
                error!(sensor_id = %self.sensor.id, error = %e, "Failed to store reading");
            }
        }

        info!(sensor_id = %self.sensor.id, "Sampler stopped");
    }

    /// One acquire → filter → round → append pass. No retries.
    pub async fn tick(&self) -> StorageResult<TickOutcome> {
        let timestamp = timestamp_now();
        let raw = hardware::acquire(self.hardware.clone(), &self.sensor).await;

        if !policy::accept(&self.sensor, raw) {
            debug!(sensor_id = %self.sensor.id, raw, "Reading rejected");
            return Ok(TickOutcome::Rejected(raw));
        }

        let value = policy::round_to_precision(raw, self.precision);
        let row_id = self.store.append_reading(self.sensor.id, value, &timestamp).await?;
        debug!(sensor_id = %self.sensor.id, row_id, value, "Reading stored");
        Ok(TickOutcome::Stored(row_id))
    }
}
