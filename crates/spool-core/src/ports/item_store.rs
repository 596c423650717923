//! ItemStore port - the item collection shared by every queue and worker.
//!
//! Many logical queues (`queue_name`) share one physical collection.
//!
//! # Contract
//! - Every mutating method is one transaction: it either fully applies or
//!   leaves the collection untouched and returns `Err`.
//! - `compare_and_set_expire` is the only concurrency control in the system.
//!   It must be atomic with respect to every other transaction on the same
//!   store, across processes when the store is shared. If an implementation
//!   cannot guarantee that, two workers may claim the same item.

use async_trait::async_trait;

use crate::domain::{ItemId, QueueItem, StoreError};

#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Insert an unclaimed item and return its store-assigned id.
    async fn insert(
        &self,
        queue_name: &str,
        payload: &[u8],
        created_at: i64,
    ) -> Result<ItemId, StoreError>;

    /// The unclaimed item of `queue_name` with the smallest `created_at`,
    /// ties broken by the smallest id.
    async fn oldest_unclaimed(&self, queue_name: &str) -> Result<Option<QueueItem>, StoreError>;

    /// Set `expire_at = new` only if it is still `expected`.
    ///
    /// Returns `false` when the row is gone or holds another value.
    async fn compare_and_set_expire(
        &self,
        id: ItemId,
        expected: i64,
        new: i64,
    ) -> Result<bool, StoreError>;

    /// Set `expire_at = 0` unconditionally.
    async fn reset_expire(&self, id: ItemId) -> Result<(), StoreError>;

    async fn delete(&self, id: ItemId) -> Result<(), StoreError>;

    /// Delete items of `queue_name` created strictly before `cutoff`,
    /// whatever their lease state. Returns the number deleted.
    async fn delete_older_than(&self, queue_name: &str, cutoff: i64) -> Result<u64, StoreError>;

    /// Across all queue names, reset every lease with `0 < expire_at < now`.
    /// Returns the number reset.
    async fn reclaim_expired(&self, now: i64) -> Result<u64, StoreError>;

    /// Delete every item of `queue_name`.
    async fn delete_queue(&self, queue_name: &str) -> Result<u64, StoreError>;

    async fn count(&self, queue_name: &str) -> Result<u64, StoreError>;

    /// All items of `queue_name` in claim order.
    async fn list(&self, queue_name: &str) -> Result<Vec<QueueItem>, StoreError>;
}
