//! GcLoop - periodic garbage collection over a set of queues.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::engine::{GcReport, QueueEngine};

/// Runs `QueueEngine::garbage_collection` for every queue each `interval`.
///
/// # Flow
/// 1. `ItemStore::delete_older_than` evicts items past retention, per queue
/// 2. `ItemStore::reclaim_expired` resets lapsed leases to unclaimed
/// 3. the per-queue `GcReport`s are summed for the round
///
/// Lease reclaim is store-wide, so with several queues only the first pass of
/// a round usually reclaims anything; the later ones still evict by age.
pub struct GcLoop {
    engines: Vec<Arc<QueueEngine>>,
    interval: Duration,
}

impl GcLoop {
    pub fn new(engines: Vec<Arc<QueueEngine>>, interval: Duration) -> Self {
        Self { engines, interval }
    }

    /// One round over every queue.
    pub async fn run_once(&self) -> GcReport {
        let mut total = GcReport::default();
        for engine in &self.engines {
            total += engine.garbage_collection().await;
        }
        total
    }

    /// First round runs immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }
        tracing::debug!("gc loop stopped");
    }
}
