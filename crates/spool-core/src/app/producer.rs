//! Producer - queues a fixed task whenever its queue's schedule is due.

use std::sync::Arc;

use super::engine::QueueEngine;
use crate::domain::{ItemId, QueueError, TaskDescriptor};

/// # Flow
/// 1. `ScheduleSpec::is_due` gates the tick (unless the queue is in debug)
/// 2. `QueueEngine::create_item` encodes and inserts the `TaskDescriptor`
/// 3. a `WorkerLoop` later claims and executes it
pub struct Producer {
    engine: Arc<QueueEngine>,
    task: TaskDescriptor,
}

impl Producer {
    pub fn new(engine: Arc<QueueEngine>, task: TaskDescriptor) -> Self {
        Self { engine, task }
    }

    pub fn task(&self) -> &TaskDescriptor {
        &self.task
    }

    /// Call once per scheduler tick (typically every minute).
    pub async fn tick(&self) -> Result<Option<ItemId>, QueueError> {
        let created = self.engine.create_item(&self.task).await?;
        if let Some(id) = created {
            tracing::info!(queue = %self.engine.name(), pid = %self.task.pid, item = %id, "task queued");
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScheduleSpec;
    use crate::impls::InMemoryItemStore;
    use crate::ports::FixedClock;
    use chrono::{Duration, TimeZone, Utc};

    #[tokio::test]
    async fn tick_queues_the_task_only_when_due() {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 5, 55, 0).unwrap()));
        let engine = Arc::new(
            QueueEngine::builder("maintenance")
                .schedule(ScheduleSpec::cron("0 6 * * *").unwrap())
                .store(Arc::new(InMemoryItemStore::new()))
                .clock(clock.clone())
                .build()
                .unwrap(),
        );
        let producer = Producer::new(engine.clone(), TaskDescriptor::new("nightly", "cron_cleanup"));

        assert_eq!(producer.tick().await.unwrap(), None);
        clock.advance(Duration::minutes(5));
        assert!(producer.tick().await.unwrap().is_some());

        let item = engine.claim_item(30).await.unwrap();
        assert_eq!(item.decode::<TaskDescriptor>().unwrap(), *producer.task());
    }
}
