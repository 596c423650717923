//! In-memory stores for tests and single-process use.
//!
//! Every method runs under one lock, so each call is trivially a transaction
//! and `compare_and_set_expire` is atomic. The lock is released between calls,
//! which is exactly where concurrent claimers race.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{ItemId, Pid, QueueItem, StoreError, TaskRecord, UNCLAIMED};
use crate::ports::{ItemStore, TaskStatsStore};

struct ItemState {
    /// All items keyed by id (single source of truth).
    items: BTreeMap<ItemId, QueueItem>,

    /// Next id to assign.
    next_id: i64,
}

impl ItemState {
    fn new() -> Self {
        Self {
            items: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn allocate_id(&mut self) -> ItemId {
        let id = ItemId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn of_queue<'a>(&'a self, queue_name: &'a str) -> impl Iterator<Item = &'a QueueItem> + 'a {
        self.items
            .values()
            .filter(move |item| item.queue_name == queue_name)
    }
}

/// In-memory item collection.
#[derive(Clone)]
pub struct InMemoryItemStore {
    state: Arc<Mutex<ItemState>>,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ItemState::new())),
        }
    }

    /// Raw row access (for tests).
    pub async fn get(&self, id: ItemId) -> Option<QueueItem> {
        let state = self.state.lock().await;
        state.items.get(&id).cloned()
    }

    /// Overwrite a row's lease (for tests that need stale or foreign leases).
    pub async fn force_expire(&self, id: ItemId, expire_at: i64) {
        let mut state = self.state.lock().await;
        if let Some(item) = state.items.get_mut(&id) {
            item.expire_at = expire_at;
        }
    }
}

impl Default for InMemoryItemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ItemStore for InMemoryItemStore {
    async fn insert(
        &self,
        queue_name: &str,
        payload: &[u8],
        created_at: i64,
    ) -> Result<ItemId, StoreError> {
        let mut state = self.state.lock().await;
        let id = state.allocate_id();
        state.items.insert(
            id,
            QueueItem {
                id,
                queue_name: queue_name.to_string(),
                payload: payload.to_vec(),
                created_at,
                expire_at: UNCLAIMED,
            },
        );
        Ok(id)
    }

    async fn oldest_unclaimed(&self, queue_name: &str) -> Result<Option<QueueItem>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .of_queue(queue_name)
            .filter(|item| item.expire_at == UNCLAIMED)
            .min_by_key(|item| (item.created_at, item.id))
            .cloned())
    }

    async fn compare_and_set_expire(
        &self,
        id: ItemId,
        expected: i64,
        new: i64,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.items.get_mut(&id) {
            Some(item) if item.expire_at == expected => {
                item.expire_at = new;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_expire(&self, id: ItemId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(item) = state.items.get_mut(&id) {
            item.expire_at = UNCLAIMED;
        }
        Ok(())
    }

    async fn delete(&self, id: ItemId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.items.remove(&id);
        Ok(())
    }

    async fn delete_older_than(&self, queue_name: &str, cutoff: i64) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.items.len();
        state
            .items
            .retain(|_, item| !(item.queue_name == queue_name && item.created_at < cutoff));
        Ok((before - state.items.len()) as u64)
    }

    async fn reclaim_expired(&self, now: i64) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let mut reclaimed = 0;
        for item in state.items.values_mut() {
            if item.expire_at > UNCLAIMED && item.expire_at < now {
                item.expire_at = UNCLAIMED;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn delete_queue(&self, queue_name: &str) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.items.len();
        state.items.retain(|_, item| item.queue_name != queue_name);
        Ok((before - state.items.len()) as u64)
    }

    async fn count(&self, queue_name: &str) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state.of_queue(queue_name).count() as u64)
    }

    async fn list(&self, queue_name: &str) -> Result<Vec<QueueItem>, StoreError> {
        let state = self.state.lock().await;
        let mut items: Vec<QueueItem> = state.of_queue(queue_name).cloned().collect();
        items.sort_by_key(|item| (item.created_at, item.id));
        Ok(items)
    }
}

/// In-memory task statistics.
#[derive(Clone, Default)]
pub struct InMemoryStatsStore {
    records: Arc<Mutex<HashMap<Pid, TaskRecord>>>,
}

impl InMemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStatsStore for InMemoryStatsStore {
    async fn get(&self, pid: &Pid) -> Result<Option<TaskRecord>, StoreError> {
        let records = self.records.lock().await;
        Ok(records.get(pid).cloned())
    }

    async fn register(&self, pid: &Pid) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        records
            .entry(pid.clone())
            .or_insert_with(|| TaskRecord::new(pid.clone()));
        Ok(())
    }

    async fn record_run(
        &self,
        pid: &Pid,
        ran_at: DateTime<Utc>,
        runtime_secs: f64,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(pid) else {
            return Ok(false);
        };
        record.record_run(ran_at, runtime_secs);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_assigns_increasing_ids_and_unclaimed_rows() {
        let store = InMemoryItemStore::new();
        let a = store.insert("mail", b"a", 10).await.unwrap();
        let b = store.insert("mail", b"b", 10).await.unwrap();
        assert!(a < b);

        let row = store.get(a).await.unwrap();
        assert_eq!(row.expire_at, UNCLAIMED);
        assert_eq!(row.payload, b"a");
        assert_eq!(row.created_at, 10);
    }

    #[tokio::test]
    async fn oldest_unclaimed_is_fifo_with_id_tiebreak() {
        let store = InMemoryItemStore::new();
        let late = store.insert("q", b"", 20).await.unwrap();
        let first = store.insert("q", b"", 10).await.unwrap();
        let second = store.insert("q", b"", 10).await.unwrap();
        store.insert("other", b"", 1).await.unwrap();

        assert_eq!(store.oldest_unclaimed("q").await.unwrap().unwrap().id, first);
        store.force_expire(first, 99).await;
        assert_eq!(store.oldest_unclaimed("q").await.unwrap().unwrap().id, second);
        store.force_expire(second, 99).await;
        assert_eq!(store.oldest_unclaimed("q").await.unwrap().unwrap().id, late);
    }

    #[tokio::test]
    async fn compare_and_set_only_applies_on_expected_value() {
        let store = InMemoryItemStore::new();
        let id = store.insert("q", b"", 0).await.unwrap();

        assert!(store.compare_and_set_expire(id, 0, 30).await.unwrap());
        assert!(!store.compare_and_set_expire(id, 0, 60).await.unwrap());
        assert_eq!(store.get(id).await.unwrap().expire_at, 30);

        assert!(!store.compare_and_set_expire(ItemId::new(999), 0, 1).await.unwrap());
    }

    #[tokio::test]
    async fn reclaim_touches_only_lapsed_leases() {
        let store = InMemoryItemStore::new();
        let lapsed = store.insert("a", b"", 0).await.unwrap();
        let live = store.insert("a", b"", 0).await.unwrap();
        let boundary = store.insert("b", b"", 0).await.unwrap();
        let free = store.insert("b", b"", 0).await.unwrap();
        store.force_expire(lapsed, 50).await;
        store.force_expire(live, 150).await;
        store.force_expire(boundary, 100).await;

        assert_eq!(store.reclaim_expired(100).await.unwrap(), 1);
        assert_eq!(store.get(lapsed).await.unwrap().expire_at, UNCLAIMED);
        assert_eq!(store.get(live).await.unwrap().expire_at, 150);
        assert_eq!(store.get(boundary).await.unwrap().expire_at, 100);
        assert_eq!(store.get(free).await.unwrap().expire_at, UNCLAIMED);
    }

    #[tokio::test]
    async fn stats_record_run_requires_a_record() {
        let stats = InMemoryStatsStore::new();
        let pid = Pid::new("cleanup");
        let now = Utc::now();

        assert!(!stats.record_run(&pid, now, 0.5).await.unwrap());

        stats.register(&pid).await.unwrap();
        assert!(stats.record_run(&pid, now, 0.5).await.unwrap());
        stats.register(&pid).await.unwrap();

        let record = stats.get(&pid).await.unwrap().unwrap();
        assert_eq!(record.executions, 1);
        assert_eq!(record.last_run, Some(now));
    }
}
