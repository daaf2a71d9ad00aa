use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use serde::Serialize;
use tokio::{
    sync::Mutex,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::info;
use utoipa::ToSchema;

use crate::{
    hardware::{Hardware, Simulator},
    location::{self, LocationProvider},
    notify::Notifier,
    sensors::{RegistryError, SensorRegistry, SensorSampler},
    settings::SettingsHandle,
    store::SampleStore,
    upload::{transport::Transport, UploadCoordinator},
    wake_lock::WakeLock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct CollectionStatus {
    pub collecting: bool,
    /// Sampler tasks still alive.
    pub samplers: usize,
}

/// Everything a collection cycle needs.
pub struct Collaborators<T: Transport> {
    pub registry: SensorRegistry,
    pub store: SampleStore,
    pub settings: SettingsHandle,
    pub notifier: Notifier,
    pub uploader: UploadCoordinator<T>,
    /// Used unless simulation mode is on.
    pub bus: Arc<dyn Hardware>,
    pub location: Arc<dyn LocationProvider>,
    pub wake_lock: Arc<dyn WakeLock>,
}

/// Starts and stops samplers, location polling and automatic uploads as
/// one unit.
#[derive(Clone)]
pub struct CollectionSupervisor<T: Transport> {
    inner: Arc<Inner<T>>,
}

struct Inner<T: Transport> {
    parts: Collaborators<T>,
    simulator: Arc<dyn Hardware>,
    /// `Some` while collecting. Held across start, stop and idle-only work.
    cycle: Mutex<Option<Cycle>>,
    collecting: AtomicBool,
}

struct Cycle {
    cancel: CancellationToken,
    samplers: TaskTracker,
    background: TaskTracker,
    /// Final upload flush on stop.
    flush_on_stop: bool,
    holds_wake_lock: bool,
}

impl<T: Transport> CollectionSupervisor<T> {
    pub fn new(parts: Collaborators<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                parts,
                simulator: Arc::new(Simulator),
                cycle: Mutex::new(None),
                collecting: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.inner.collecting.load(Ordering::SeqCst)
    }

    pub async fn running_samplers(&self) -> usize {
        self.inner
            .cycle
            .lock()
            .await
            .as_ref()
            .map_or(0, |c| c.samplers.len())
    }

    pub async fn status(&self) -> CollectionStatus {
        let cycle = self.inner.cycle.lock().await;
        status_of(cycle.as_ref())
    }

    /// Spawns one sampler per active sensor plus the optional background
    /// loops. A second call while collecting changes nothing.
    pub async fn start(&self) -> Result<CollectionStatus, RegistryError> {
        let mut guard = self.inner.cycle.lock().await;
        if guard.is_some() {
            return Ok(status_of(guard.as_ref()));
        }

        let parts = &self.inner.parts;
        let settings = parts.settings.snapshot().await;
        let sensors = parts.registry.active().await?;
        let hardware = if settings.simulation_mode {
            self.inner.simulator.clone()
        } else {
            parts.bus.clone()
        };

        let cancel = CancellationToken::new();
        let samplers = TaskTracker::new();
        let background = TaskTracker::new();

        for sensor in &sensors {
            let sampler = SensorSampler::new(
                sensor.clone(),
                hardware.clone(),
                parts.store.clone(),
                settings.decimal_precision,
            );
            samplers.spawn(sampler.run(cancel.clone()));
        }
        if settings.location_updates {
            background.spawn(location::poll(
                parts.location.clone(),
                parts.store.clone(),
                settings.location_period(),
                cancel.clone(),
            ));
        }
        if settings.auto_upload {
            background.spawn(auto_upload(
                parts.uploader.clone(),
                settings.upload_period(),
                cancel.clone(),
            ));
        }
        samplers.close();
        background.close();

        let holds_wake_lock = settings.keep_awake && self.acquire_wake_lock().await;

        *guard = Some(Cycle {
            cancel,
            samplers,
            background,
            flush_on_stop: settings.auto_upload,
            holds_wake_lock,
        });
        self.inner.collecting.store(true, Ordering::SeqCst);

        info!(
            sensors = sensors.len(),
            simulation = settings.simulation_mode,
            auto_upload = settings.auto_upload,
            location_updates = settings.location_updates,
            "Collection started"
        );
        parts
            .notifier
            .info(format!("Collection started with {} sensors", sensors.len()))
            .await;
        Ok(status_of(guard.as_ref()))
    }

    /// Cancels every task, waits for in-flight ticks, flushes pending uploads
    /// if automatic upload was on and releases the wake lock. A second call
    /// changes nothing.
    pub async fn stop(&self) -> CollectionStatus {
        let mut guard = self.inner.cycle.lock().await;
        let Some(cycle) = guard.take() else {
            return status_of(None);
        };

        cycle.cancel.cancel();
        cycle.samplers.wait().await;
        cycle.background.wait().await;

        let parts = &self.inner.parts;
        if cycle.flush_on_stop {
            info!("Flushing pending uploads");
            parts.uploader.run_cycle().await;
        }
        if cycle.holds_wake_lock {
            self.release_wake_lock().await;
        }

        self.inner.collecting.store(false, Ordering::SeqCst);
        info!("Collection stopped");
        parts.notifier.info("Collection stopped").await;
        status_of(None)
    }

    /// Runs `f` only when not collecting, holding off start and stop until it
    /// finishes. Returns `None` while collecting.
    pub async fn when_idle<F, Fut>(&self, f: F) -> Option<Fut::Output>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let guard = self.inner.cycle.lock().await;
        if guard.is_some() {
            return None;
        }
        let output = f().await;
        drop(guard);
        Some(output)
    }

    async fn acquire_wake_lock(&self) -> bool {
        match self.inner.parts.wake_lock.acquire() {
            Ok(()) => {
                info!("Wake lock acquired");
                true
            }
            Err(e) => {
                self.inner
                    .parts
                    .notifier
                    .warn(format!("Could not acquire wake lock: {e}"))
                    .await;
                false
            }
        }
    }

    async fn release_wake_lock(&self) {
        match self.inner.parts.wake_lock.release() {
            Ok(()) => info!("Wake lock released"),
            Err(e) => {
                self.inner
                    .parts
                    .notifier
                    .warn(format!("Could not release wake lock: {e}"))
                    .await;
            }
        }
    }
}

fn status_of(cycle: Option<&Cycle>) -> CollectionStatus {
    CollectionStatus {
        collecting: cycle.is_some(),
        samplers: cycle.map_or(0, |c| c.samplers.len()),
    }
}

/// Runs an upload cycle every `period`, the first one a full period after
/// start.
async fn auto_upload<T: Transport>(uploader: UploadCoordinator<T>, period: Duration, cancel: CancellationToken) {
    info!(period_ms = period.as_millis() as u64, "Automatic upload started");
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        uploader.run_cycle().await;
    }

    info!("Automatic upload stopped");
}
