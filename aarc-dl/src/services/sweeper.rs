//! Periodic eviction of finished jobs

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::models::JobId;
use crate::services::JobRegistry;

/// Evicts terminal jobs older than the retention window on a fixed interval
pub struct CleanupSweeper {
    registry: Arc<JobRegistry>,
    interval: Duration,
    retention: chrono::Duration,
}

impl CleanupSweeper {
    pub fn new(registry: Arc<JobRegistry>, interval: Duration, retention: chrono::Duration) -> Self {
        Self {
            registry,
            interval,
            retention,
        }
    }

    /// One sweep as of `now`; returns the evicted ids
    pub fn sweep_once(&self, now: DateTime<Utc>) -> Vec<JobId> {
        let evicted = self.registry.sweep_expired(now, self.retention);
        if evicted.is_empty() {
            debug!(remaining = self.registry.len(), "Sweep found nothing to evict");
        } else {
            info!(
                evicted = evicted.len(),
                remaining = self.registry.len(),
                "Evicted expired jobs"
            );
        }
        evicted
    }

    /// Run until `shutdown` fires
    ///
    /// The first sweep happens one full interval after start. A panicking
    /// sweep is logged and the loop keeps ticking.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            info!(
                interval_secs = self.interval.as_secs(),
                retention_secs = self.retention.num_seconds(),
                "Cleanup sweeper started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Cleanup sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let sweep = AssertUnwindSafe(async { self.sweep_once(Utc::now()) })
                            .catch_unwind()
                            .await;
                        if sweep.is_err() {
                            error!("Cleanup sweep panicked; will retry next tick");
                        }
                    }
                }
            }
        })
    }
}
