//! ExecutionRecorder - runs a task's action and books the run.

use std::sync::Arc;
use std::time::Instant;

use crate::domain::TaskDescriptor;
use crate::ports::{ActionDispatcher, Clock, TaskStatsStore};

pub struct ExecutionRecorder {
    dispatcher: Arc<dyn ActionDispatcher>,
    stats: Arc<dyn TaskStatsStore>,
    clock: Arc<dyn Clock>,
}

impl ExecutionRecorder {
    pub fn new(
        dispatcher: Arc<dyn ActionDispatcher>,
        stats: Arc<dyn TaskStatsStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dispatcher,
            stats,
            clock,
        }
    }

    /// Fire the task's action, then bump its execution counter and store the
    /// run time and wall-clock duration.
    ///
    /// # Flow
    /// 1. start a monotonic timer
    /// 2. `ActionDispatcher::invoke` runs every handler of the action
    /// 3. `TaskStatsStore::record_run` books the run
    ///
    /// Handler failures belong to the dispatcher and statistics failures are
    /// logged, so this always returns `true`.
    pub async fn execute_action(&self, task: &TaskDescriptor) -> bool {
        let started = Instant::now();
        self.dispatcher.invoke(&task.action).await;
        let elapsed = started.elapsed().as_secs_f64();

        match self
            .stats
            .record_run(&task.pid, self.clock.now(), elapsed)
            .await
        {
            Ok(true) => {
                tracing::debug!(pid = %task.pid, action = %task.action, elapsed, "task executed");
            }
            Ok(false) => {
                tracing::warn!(
                    subsystem = "recorder",
                    pid = %task.pid,
                    action = %task.action,
                    "no statistics record for task"
                );
            }
            Err(e) => {
                tracing::error!(
                    subsystem = "recorder",
                    op = "execute_action",
                    pid = %task.pid,
                    kind = ?e.kind(),
                    error = %e,
                    "failed to update task statistics"
                );
            }
        }
        true
    }
}
