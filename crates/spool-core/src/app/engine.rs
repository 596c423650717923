//! QueueEngine - lease-based operations on one logical queue.
//!
//! The engine never loops or waits. Each call is a handful of store
//! transactions; concurrency comes from many engines (tasks, processes)
//! sharing one store, and the only arbitration between them is
//! [`ItemStore::compare_and_set_expire`].
//!
//! Store failures are reported through `tracing` and turned into the
//! operation's "nothing happened" result. Schedule and encode failures are
//! caller bugs and propagate.

use std::sync::Arc;

use serde::Serialize;

use super::builder::QueueBuilder;
use super::status::QueueCounts;
use crate::domain::{ItemId, QueueError, QueueItem, ScheduleSpec, StoreError, UNCLAIMED};
use crate::ports::{Clock, ItemStore};
use crate::typed::PayloadCodec;

/// Items older than this are evicted by garbage collection, leased or not.
pub const RETENTION_SECS: i64 = 10 * 24 * 60 * 60;

/// Per-queue settings, usually read from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    pub name: String,

    /// Lease length in seconds; `0` defers to the caller's default lease.
    pub max_runtime: i64,

    /// Admit every `create_item` regardless of the schedule verdict.
    pub debug: bool,

    /// Extra select-and-claim rounds after losing a claim race.
    pub claim_retries: u32,
}

impl QueueSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_runtime: 0,
            debug: false,
            claim_retries: 0,
        }
    }
}

/// Result of one garbage collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    /// Items deleted for exceeding the retention window.
    pub evicted: u64,

    /// Lapsed leases reset to unclaimed, across all queues.
    pub reclaimed: u64,
}

impl GcReport {
    pub fn is_empty(&self) -> bool {
        self.evicted == 0 && self.reclaimed == 0
    }
}

impl std::ops::AddAssign for GcReport {
    fn add_assign(&mut self, other: Self) {
        self.evicted += other.evicted;
        self.reclaimed += other.reclaimed;
    }
}

enum ClaimAttempt {
    Won(QueueItem),
    Lost,
    Empty,
}

pub struct QueueEngine {
    settings: QueueSettings,
    schedule: ScheduleSpec,
    store: Arc<dyn ItemStore>,
    clock: Arc<dyn Clock>,
}

impl QueueEngine {
    pub fn builder(name: impl Into<String>) -> QueueBuilder {
        QueueBuilder::new(name)
    }

    pub(crate) fn from_parts(
        settings: QueueSettings,
        schedule: ScheduleSpec,
        store: Arc<dyn ItemStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            schedule,
            store,
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub fn schedule(&self) -> &ScheduleSpec {
        &self.schedule
    }

    /// Queue `payload` if the schedule says now is due.
    ///
    /// Returns `Ok(None)` when not due, or when the insert failed (logged).
    pub async fn create_item<T: Serialize + ?Sized>(
        &self,
        payload: &T,
    ) -> Result<Option<ItemId>, QueueError> {
        let now = self.clock.now();
        let due = self.schedule.is_due(now)?;
        if !due && !self.settings.debug {
            tracing::trace!(queue = %self.settings.name, "not due");
            return Ok(None);
        }

        let frame = PayloadCodec::encode(payload)?;
        match self
            .store
            .insert(&self.settings.name, &frame, now.timestamp())
            .await
        {
            Ok(id) => {
                tracing::debug!(queue = %self.settings.name, item = %id, forced = !due, "item created");
                Ok(Some(id))
            }
            Err(e) => {
                self.report("create_item", &e);
                Ok(None)
            }
        }
    }

    /// Lease the oldest unclaimed item.
    ///
    /// The lease is `max_runtime` when configured, else `default_lease`,
    /// clamped to `1..=RETENTION_SECS`.
    ///
    /// # Flow
    /// 1. Select the oldest unclaimed item of this queue
    /// 2. Compare-and-set its expiry from unclaimed to `now + lease`
    /// 3. On a lost race, retry up to `claim_retries` more rounds
    ///
    /// `None` means the queue is empty, another worker won the race, or the
    /// store failed (logged).
    pub async fn claim_item(&self, default_lease: i64) -> Option<QueueItem> {
        let lease = self.effective_lease(default_lease);
        for round in 0..=self.settings.claim_retries {
            match self.try_claim(lease).await {
                Ok(ClaimAttempt::Won(item)) => {
                    tracing::debug!(
                        queue = %self.settings.name,
                        item = %item.id,
                        expire_at = item.expire_at,
                        "item claimed"
                    );
                    return Some(item);
                }
                Ok(ClaimAttempt::Empty) => return None,
                Ok(ClaimAttempt::Lost) => {
                    tracing::debug!(queue = %self.settings.name, round, "lost claim race");
                }
                Err(e) => {
                    self.report("claim_item", &e);
                    return None;
                }
            }
        }
        None
    }

    /// Make `item` claimable again. Always returns `true`.
    pub async fn release_item(&self, item: &QueueItem) -> bool {
        if let Err(e) = self.store.reset_expire(item.id).await {
            self.report("release_item", &e);
        }
        true
    }

    pub async fn delete_item(&self, item: &QueueItem) {
        if let Err(e) = self.store.delete(item.id).await {
            self.report("delete_item", &e);
        }
    }

    /// Evict aged items of this queue, then reclaim lapsed leases of every
    /// queue. The passes are independent; a failed pass counts as zero.
    pub async fn garbage_collection(&self) -> GcReport {
        let now = self.clock.epoch_secs();
        let mut report = GcReport::default();

        match self
            .store
            .delete_older_than(&self.settings.name, now - RETENTION_SECS)
            .await
        {
            Ok(n) => report.evicted = n,
            Err(e) => self.report("garbage_collection.evict", &e),
        }

        match self.store.reclaim_expired(now).await {
            Ok(n) => report.reclaimed = n,
            Err(e) => self.report("garbage_collection.reclaim", &e),
        }

        if !report.is_empty() {
            tracing::info!(
                queue = %self.settings.name,
                evicted = report.evicted,
                reclaimed = report.reclaimed,
                "garbage collection"
            );
        }
        report
    }

    /// Queues exist implicitly through their items.
    pub async fn create_queue(&self) {}

    pub async fn delete_queue(&self) {
        match self.store.delete_queue(&self.settings.name).await {
            Ok(n) => tracing::info!(queue = %self.settings.name, deleted = n, "queue deleted"),
            Err(e) => self.report("delete_queue", &e),
        }
    }

    /// Items of this queue in any lease state; `0` on store failure.
    pub async fn number_of_items(&self) -> u64 {
        match self.store.count(&self.settings.name).await {
            Ok(n) => n,
            Err(e) => {
                self.report("number_of_items", &e);
                0
            }
        }
    }

    pub async fn status(&self) -> QueueCounts {
        let now = self.clock.epoch_secs();
        match self.store.list(&self.settings.name).await {
            Ok(items) => QueueCounts::tally(&items, now),
            Err(e) => {
                self.report("status", &e);
                QueueCounts::default()
            }
        }
    }

    fn effective_lease(&self, default_lease: i64) -> i64 {
        let lease = if self.settings.max_runtime > 0 {
            self.settings.max_runtime
        } else {
            default_lease
        };
        // A zero lease would write the unclaimed sentinel back. Leases past
        // retention outlive the item anyway.
        lease.clamp(1, RETENTION_SECS)
    }

    async fn try_claim(&self, lease: i64) -> Result<ClaimAttempt, StoreError> {
        let Some(mut item) = self.store.oldest_unclaimed(&self.settings.name).await? else {
            return Ok(ClaimAttempt::Empty);
        };
        let expire_at = self.clock.epoch_secs().saturating_add(lease);
        if self
            .store
            .compare_and_set_expire(item.id, UNCLAIMED, expire_at)
            .await?
        {
            item.expire_at = expire_at;
            Ok(ClaimAttempt::Won(item))
        } else {
            Ok(ClaimAttempt::Lost)
        }
    }

    fn report(&self, op: &'static str, err: &StoreError) {
        tracing::error!(
            subsystem = "queue",
            op,
            queue = %self.settings.name,
            kind = ?err.kind(),
            error = %err,
            "queue operation failed"
        );
    }
}
