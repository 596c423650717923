//! TOML configuration for workers and queues.
//!
//! ```toml
//! [store]
//! path = "/var/lib/spool/spool.db"
//!
//! [worker]
//! default_lease = 30
//! poll_interval_ms = 1000
//!
//! [[queue]]
//! name = "maintenance"
//! schedule = { cron = "0 6 * * *" }
//! max_runtime = 300
//! pid = "nightly-cleanup"
//! action = "cron_cleanup"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{ScheduleError, ScheduleSpec, TaskDescriptor};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate queue name '{0}'")]
    DuplicateQueue(String),

    #[error("queue '{name}': {reason}")]
    InvalidQueue { name: String, reason: String },

    #[error("worker: {0}")]
    InvalidWorker(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpoolConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default, rename = "queue")]
    pub queues: Vec<QueueConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf { PathBuf::from("spool.db") }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Lease in seconds for queues without `max_runtime`.
    #[serde(default = "default_lease")]
    pub default_lease: i64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_gc_interval_secs")]
    pub gc_interval_secs: u64,
    /// Worker tasks per queue.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_lease() -> i64 { 30 }
fn default_poll_interval_ms() -> u64 { 1000 }
fn default_gc_interval_secs() -> u64 { 60 }
fn default_workers() -> usize { 1 }

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            default_lease: default_lease(),
            poll_interval_ms: default_poll_interval_ms(),
            gc_interval_secs: default_gc_interval_secs(),
            workers: default_workers(),
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }
}

/// When a configured queue admits items. Predicates exist only in code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleConfig {
    Cron(String),
    At(String),
}

impl ScheduleConfig {
    pub fn to_spec(&self) -> Result<ScheduleSpec, ScheduleError> {
        match self {
            ScheduleConfig::Cron(expr) => ScheduleSpec::cron(expr),
            ScheduleConfig::At(instant) => {
                let spec = ScheduleSpec::at(instant.clone());
                spec.validate()?;
                Ok(spec)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    #[serde(default)]
    pub max_runtime: i64,
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub claim_retries: u32,
    /// Statistics key of the produced task; defaults to the queue name.
    #[serde(default)]
    pub pid: Option<String>,
    /// Action the produced task fires. Queues without one are consume-only.
    #[serde(default)]
    pub action: Option<String>,
}

impl QueueConfig {
    pub fn task(&self) -> Option<TaskDescriptor> {
        let action = self.action.as_ref()?;
        let pid = self.pid.clone().unwrap_or_else(|| self.name.clone());
        Some(TaskDescriptor::new(pid, action.clone()))
    }
}

impl SpoolConfig {
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    pub fn queue(&self, name: &str) -> Option<&QueueConfig> {
        self.queues.iter().find(|q| q.name == name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.default_lease <= 0 {
            return Err(ConfigError::InvalidWorker(format!(
                "default_lease must be positive (got {})",
                self.worker.default_lease
            )));
        }
        if self.worker.workers == 0 {
            return Err(ConfigError::InvalidWorker("workers must be at least 1".into()));
        }

        let mut seen = HashSet::new();
        for queue in &self.queues {
            if queue.name.trim().is_empty() {
                return Err(ConfigError::InvalidQueue {
                    name: queue.name.clone(),
                    reason: "name must not be empty".into(),
                });
            }
            if !seen.insert(queue.name.trim()) {
                return Err(ConfigError::DuplicateQueue(queue.name.clone()));
            }
            if queue.max_runtime < 0 {
                return Err(ConfigError::InvalidQueue {
                    name: queue.name.clone(),
                    reason: format!("max_runtime must not be negative (got {})", queue.max_runtime),
                });
            }
            queue.schedule.to_spec().map_err(|e| ConfigError::InvalidQueue {
                name: queue.name.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

impl FromStr for SpoolConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
