use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key of a task statistics record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(String);

impl Pid {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a worker runs for a claimed item: the action to fire and the
/// statistics record to charge it to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub pid: Pid,
    pub action: String,
}

impl TaskDescriptor {
    pub fn new(pid: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            pid: Pid::new(pid),
            action: action.into(),
        }
    }
}

/// Per-task execution statistics.
///
/// Records are created out of band; the execution recorder only updates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub pid: Pid,

    /// Number of completed executions.
    pub executions: u64,

    pub last_run: Option<DateTime<Utc>>,

    /// Wall-clock seconds of the last execution.
    pub last_runtime: f64,
}

impl TaskRecord {
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            executions: 0,
            last_run: None,
            last_runtime: 0.0,
        }
    }

    pub fn record_run(&mut self, ran_at: DateTime<Utc>, runtime_secs: f64) {
        self.executions += 1;
        self.last_run = Some(ran_at);
        self.last_runtime = runtime_secs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn record_run_bumps_counter_and_overwrites_timing() {
        let mut record = TaskRecord::new(Pid::new("cleanup"));
        let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap();

        record.record_run(t1, 1.5);
        record.record_run(t2, 0.25);

        assert_eq!(record.executions, 2);
        assert_eq!(record.last_run, Some(t2));
        assert_eq!(record.last_runtime, 0.25);
    }

    #[test]
    fn descriptor_json_shape() {
        let d = TaskDescriptor::new("mail-42", "send_queued_mail");
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v, serde_json::json!({"pid": "mail-42", "action": "send_queued_mail"}));
    }
}
