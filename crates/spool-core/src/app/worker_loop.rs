//! WorkerLoop - claim → decode → execute → delete, and the group that runs
//! several of them until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::engine::QueueEngine;
use super::gc_loop::GcLoop;
use super::recorder::ExecutionRecorder;
use crate::domain::TaskDescriptor;

/// Processes [`TaskDescriptor`] items from one queue.
///
/// # Flow
/// 1. `QueueEngine::claim_item` leases the oldest item
/// 2. the payload is decoded as a `TaskDescriptor`
/// 3. `ExecutionRecorder::execute_action` runs it
/// 4. `QueueEngine::delete_item` removes it
///
/// Execution is at most once. A failing handler is logged by the dispatcher
/// and the item is still deleted; nothing is retried.
///
/// An undecodable item keeps its lease. It comes back only through GC lease
/// reclaim and eventually ages out, so it cannot pin the head of the queue.
pub struct WorkerLoop {
    engine: Arc<QueueEngine>,
    recorder: Arc<ExecutionRecorder>,
    default_lease: i64,
    poll_interval: Duration,
}

impl WorkerLoop {
    pub fn new(
        engine: Arc<QueueEngine>,
        recorder: Arc<ExecutionRecorder>,
        default_lease: i64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            engine,
            recorder,
            default_lease,
            poll_interval,
        }
    }

    pub fn queue_name(&self) -> &str {
        self.engine.name()
    }

    /// One tick. Returns whether an item was claimed.
    pub async fn run_once(&self) -> bool {
        let Some(item) = self.engine.claim_item(self.default_lease).await else {
            return false;
        };

        let task: TaskDescriptor = match item.decode() {
            Ok(task) => task,
            Err(e) => {
                tracing::error!(
                    subsystem = "queue",
                    op = "decode",
                    queue = %item.queue_name,
                    item = %item.id,
                    error = %e,
                    "undecodable payload; leaving it leased"
                );
                return true;
            }
        };

        self.recorder.execute_action(&task).await;
        self.engine.delete_item(&item).await;
        true
    }

    /// Tick until `shutdown` turns `true` or its sender is dropped. Sleeps
    /// `poll_interval` only after an empty tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            if self.run_once().await {
                continue;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        tracing::debug!(queue = %self.engine.name(), "worker stopped");
    }
}

/// Handle over spawned loops.
/// - dropping the group's sender (or `request_shutdown`) stops every loop
/// - `shutdown_and_join` waits for in-flight ticks to finish
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            joins: Vec::new(),
        }
    }

    /// Spawn `n` tasks running the same worker.
    pub fn spawn_workers(&mut self, n: usize, worker: Arc<WorkerLoop>) {
        for worker_id in 0..n {
            let w = Arc::clone(&worker);
            let rx = self.shutdown_tx.subscribe();
            tracing::debug!(queue = %w.queue_name(), worker_id, "spawning worker");
            self.joins.push(tokio::spawn(async move { w.run(rx).await }));
        }
    }

    pub fn spawn_gc(&mut self, gc: Arc<GcLoop>) {
        let rx = self.shutdown_tx.subscribe();
        self.joins.push(tokio::spawn(async move { gc.run(rx).await }));
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Stop taking new leases. In-flight actions are not cancelled.
    pub fn request_shutdown(&self) {
        // send_replace never fails, even with no receivers left
        self.shutdown_tx.send_replace(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                tracing::error!(error = %e, "worker task panicked");
            }
        }
    }
}

impl Default for WorkerGroup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Pid;
    use crate::impls::{ActionRegistry, InMemoryItemStore, InMemoryStatsStore};
    use crate::ports::{ActionError, ActionHandler, FixedClock, TaskStatsStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl ActionHandler for Counting {
        async fn handle(&self, _action: &str) -> Result<(), ActionError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl ActionHandler for Failing {
        async fn handle(&self, action: &str) -> Result<(), ActionError> {
            Err(ActionError::new(format!("{action} failed")))
        }
    }

    struct Harness {
        engine: Arc<QueueEngine>,
        store: Arc<InMemoryItemStore>,
        stats: Arc<InMemoryStatsStore>,
        calls: Arc<AtomicUsize>,
        worker: Arc<WorkerLoop>,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryItemStore::new());
        let stats = Arc::new(InMemoryStatsStore::new());
        let clock = Arc::new(FixedClock::at_epoch(0));
        let calls = Arc::new(AtomicUsize::new(0));

        let engine = Arc::new(
            QueueEngine::builder("tasks")
                .store(store.clone())
                .clock(clock.clone())
                .build()
                .unwrap(),
        );
        let registry = ActionRegistry::new()
            .with("cleanup", Arc::new(Counting(calls.clone())))
            .with("broken", Arc::new(Failing));
        let recorder = Arc::new(ExecutionRecorder::new(
            Arc::new(registry),
            stats.clone(),
            clock,
        ));
        let worker = Arc::new(WorkerLoop::new(
            engine.clone(),
            recorder,
            30,
            Duration::from_millis(5),
        ));
        Harness {
            engine,
            store,
            stats,
            calls,
            worker,
        }
    }

    #[tokio::test]
    async fn run_once_executes_and_deletes() {
        let h = harness();
        h.stats.register(&Pid::new("janitor")).await.unwrap();
        h.engine
            .create_item(&TaskDescriptor::new("janitor", "cleanup"))
            .await
            .unwrap();

        assert!(h.worker.run_once().await);
        assert!(!h.worker.run_once().await);

        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.engine.number_of_items().await, 0);
        let record = h.stats.get(&Pid::new("janitor")).await.unwrap().unwrap();
        assert_eq!(record.executions, 1);
    }

    #[tokio::test]
    async fn failing_handler_still_deletes_the_item() {
        let h = harness();
        h.stats.register(&Pid::new("flaky")).await.unwrap();
        let id = h
            .engine
            .create_item(&TaskDescriptor::new("flaky", "broken"))
            .await
            .unwrap()
            .unwrap();

        assert!(h.worker.run_once().await);

        assert!(h.store.get(id).await.is_none());
        assert_eq!(h.engine.number_of_items().await, 0);
        let record = h.stats.get(&Pid::new("flaky")).await.unwrap().unwrap();
        assert_eq!(record.executions, 1);
        assert!(!h.worker.run_once().await);
    }

    #[tokio::test]
    async fn undecodable_item_stays_leased() {
        let h = harness();
        let id = h.engine.create_item("not a task").await.unwrap().unwrap();

        assert!(h.worker.run_once().await);

        let row = h.store.get(id).await.unwrap();
        assert_eq!(row.expire_at, 30);
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
        assert!(!h.worker.run_once().await);
    }

    #[tokio::test]
    async fn group_drains_queue_and_stops_on_shutdown() {
        let h = harness();
        for _ in 0..4 {
            h.engine
                .create_item(&TaskDescriptor::new("janitor", "cleanup"))
                .await
                .unwrap();
        }

        let mut group = WorkerGroup::new();
        group.spawn_workers(2, h.worker.clone());
        assert_eq!(group.len(), 2);

        for _ in 0..200 {
            if h.engine.number_of_items().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        group.shutdown_and_join().await;
        assert_eq!(h.engine.number_of_items().await, 0);
        assert_eq!(h.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn dropped_sender_stops_the_loop() {
        let h = harness();
        let (tx, rx) = watch::channel(false);
        let join = tokio::spawn({
            let worker = h.worker.clone();
            async move { worker.run(rx).await }
        });
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), join)
            .await
            .unwrap()
            .unwrap();
    }
}
