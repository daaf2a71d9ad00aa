use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    db::models::{timestamp_now, Position},
    store::SampleStore,
};

pub trait LocationProvider: Send + Sync {
    /// The current position, if one is known.
    fn current(&self) -> Option<Position>;
}

/// Last known position: seeded from configuration, replaced by every fix
/// posted to the API.
#[derive(Debug, Clone, Default)]
pub struct LatestPosition {
    inner: Arc<RwLock<Option<Position>>>,
}

impl LatestPosition {
    pub fn new(initial: Option<Position>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn set(&self, position: Position) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(position);
    }
}

impl LocationProvider for LatestPosition {
    fn current(&self) -> Option<Position> {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Appends the provider's position to the location log every `period` until
/// cancelled. The first fix is taken immediately.
pub async fn poll(
    provider: Arc<dyn LocationProvider>,
    store: SampleStore,
    period: Duration,
    cancel: CancellationToken,
) {
    info!(period_ms = period.as_millis() as u64, "Location polling started");
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(position) = provider.current() else {
            debug!("No position available");
            continue;
        };
        match store.append_location(&timestamp_now(), position).await {
            Ok(row_id) => debug!(row_id, "Location stored"),
            Err(e) => error!(error = %e, "Failed to store location"),
        }
    }

    info!("Location polling stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        models::{Order, ReadingFilter},
        test_pool,
    };

    #[test]
    fn latest_position_is_replaced() {
        let latest = LatestPosition::default();
        assert_eq!(latest.current(), None);

        let here = Position { latitude: 1.0, longitude: 2.0, altitude: 3.0 };
        latest.set(here);
        assert_eq!(latest.clone().current(), Some(here));
    }

    #[tokio::test]
    async fn poll_stores_first_fix_at_once() {
        let store = SampleStore::new(test_pool().await);
        let here = Position { latitude: 50.1, longitude: 8.6, altitude: 112.0 };
        let provider: Arc<dyn LocationProvider> = Arc::new(LatestPosition::new(Some(here)));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll(provider, store.clone(), Duration::from_secs(3600), cancel.clone()));

        let mut fixes = Vec::new();
        for _ in 0..100 {
            fixes = store.query_locations(ReadingFilter::All, Order::Ascending).await.unwrap();
            if !fixes.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].latitude, 50.1);
        assert!(!fixes[0].uploaded);
    }

    #[tokio::test]
    async fn unknown_position_stores_nothing() {
        let store = SampleStore::new(test_pool().await);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll(
            Arc::new(LatestPosition::default()),
            store.clone(),
            Duration::from_millis(5),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert!(store.latest_location().await.unwrap().is_none());
    }
}
