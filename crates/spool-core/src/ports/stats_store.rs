//! TaskStatsStore port - per-task execution statistics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Pid, StoreError, TaskRecord};

#[async_trait]
pub trait TaskStatsStore: Send + Sync {
    async fn get(&self, pid: &Pid) -> Result<Option<TaskRecord>, StoreError>;

    /// Create an empty record if none exists. Records are owned by whoever
    /// defines the tasks; the recorder never calls this.
    async fn register(&self, pid: &Pid) -> Result<(), StoreError>;

    /// In one transaction: bump `executions` (a missing counter counts as 0),
    /// set `last_run` and `last_runtime`.
    ///
    /// Returns `false` when there is no record for `pid`.
    async fn record_run(
        &self,
        pid: &Pid,
        ran_at: DateTime<Utc>,
        runtime_secs: f64,
    ) -> Result<bool, StoreError>;
}
