//! Background removal of stale client records.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::SweepConfig;

use super::clock::Clock;
use super::store::ClientStore;

/// Periodically drops client records that have seen no activity within the
/// retention horizon.
///
/// The sweeper runs outside the admission path. A removed client starts over
/// with fresh state on its next request, so the retention horizon must outlast
/// every quota; [`TurnstileConfig::validate`] enforces this.
///
/// [`TurnstileConfig::validate`]: crate::config::TurnstileConfig::validate
pub struct Sweeper {
    store: ClientStore,
    clock: Arc<dyn Clock>,
    interval: Duration,
    retention_secs: f64,
}

impl Sweeper {
    /// Create a sweeper over `store`.
    pub fn new(store: ClientStore, clock: Arc<dyn Clock>, config: &SweepConfig) -> Self {
        Self {
            store,
            clock,
            interval: Duration::from_secs(config.interval_secs.max(1)),
            retention_secs: config.retention_secs as f64,
        }
    }

    /// Run a single sweep, returning the number of records removed.
    pub fn sweep_once(&self) -> usize {
        let removed = self.store.cleanup_expired(self.clock.now(), self.retention_secs);
        if removed > 0 {
            info!(removed = removed, remaining = self.store.len(), "Swept stale clients");
        } else {
            debug!(remaining = self.store.len(), "Sweep found no stale clients");
        }
        removed
    }

    /// Sweep on a fixed interval until the returned task is aborted or the
    /// runtime shuts down.
    pub fn spawn(self) -> JoinHandle<()> {
        info!(
            interval_secs = self.interval.as_secs(),
            retention_secs = self.retention_secs,
            "Starting client sweeper"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep_once();
            }
        })
    }
}
