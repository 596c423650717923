//! QueueBuilder - wires a QueueEngine from settings, schedule, store and clock.
//!
//! Validation happens in `build()` so a misconfigured queue fails at startup,
//! not on its first tick.

use std::sync::Arc;

use super::engine::{QueueEngine, QueueSettings};
use crate::config::QueueConfig;
use crate::domain::{ScheduleError, ScheduleSpec};
use crate::ports::{Clock, ItemStore, SystemClock};

/// # Example
/// ```ignore
/// let queue = QueueEngine::builder("mail")
///     .schedule(ScheduleSpec::cron("*/5 * * * *")?)
///     .max_runtime(120)
///     .store(store)
///     .build()?;
/// ```
pub struct QueueBuilder {
    settings: QueueSettings,
    schedule: Option<ScheduleSpec>,
    store: Option<Arc<dyn ItemStore>>,
    clock: Option<Arc<dyn Clock>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("queue name must not be empty")]
    EmptyName,

    #[error("queue '{queue}': invalid schedule")]
    InvalidSchedule {
        queue: String,
        #[source]
        source: ScheduleError,
    },

    #[error("queue '{queue}': max_runtime must not be negative (got {value})")]
    NegativeMaxRuntime { queue: String, value: i64 },

    #[error("queue '{0}': no item store configured")]
    MissingStore(String),
}

impl QueueBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            settings: QueueSettings::new(name),
            schedule: None,
            store: None,
            clock: None,
        }
    }

    /// Start from a config entry. The cron expression is parsed here.
    pub fn from_config(config: &QueueConfig) -> Result<Self, BuildError> {
        let schedule = config
            .schedule
            .to_spec()
            .map_err(|source| BuildError::InvalidSchedule {
                queue: config.name.clone(),
                source,
            })?;
        Ok(Self::new(config.name.clone())
            .schedule(schedule)
            .max_runtime(config.max_runtime)
            .debug(config.debug)
            .claim_retries(config.claim_retries))
    }

    /// Defaults to every minute.
    pub fn schedule(mut self, schedule: ScheduleSpec) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn max_runtime(mut self, secs: i64) -> Self {
        self.settings.max_runtime = secs;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.settings.debug = debug;
        self
    }

    pub fn claim_retries(mut self, retries: u32) -> Self {
        self.settings.claim_retries = retries;
        self
    }

    pub fn store(mut self, store: Arc<dyn ItemStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Surrounding whitespace is stripped from the queue name.
    pub fn build(mut self) -> Result<QueueEngine, BuildError> {
        self.settings.name = self.settings.name.trim().to_string();
        if self.settings.name.is_empty() {
            return Err(BuildError::EmptyName);
        }
        if self.settings.max_runtime < 0 {
            return Err(BuildError::NegativeMaxRuntime {
                queue: self.settings.name,
                value: self.settings.max_runtime,
            });
        }

        let schedule = self.schedule.unwrap_or_else(ScheduleSpec::every_minute);
        if let Err(source) = schedule.validate() {
            return Err(BuildError::InvalidSchedule {
                queue: self.settings.name,
                source,
            });
        }

        let Some(store) = self.store else {
            return Err(BuildError::MissingStore(self.settings.name));
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        Ok(QueueEngine::from_parts(self.settings, schedule, store, clock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScheduleConfig;
    use crate::impls::InMemoryItemStore;

    fn store() -> Arc<dyn ItemStore> {
        Arc::new(InMemoryItemStore::new())
    }

    #[test]
    fn build_success() {
        let queue = QueueBuilder::new("mail")
            .max_runtime(60)
            .claim_retries(2)
            .store(store())
            .build()
            .unwrap();

        assert_eq!(queue.name(), "mail");
        assert_eq!(queue.settings().max_runtime, 60);
        assert_eq!(queue.settings().claim_retries, 2);
        assert!(!queue.settings().debug);
    }

    #[test]
    fn build_rejects_blank_name() {
        let result = QueueBuilder::new("  ").store(store()).build();
        assert!(matches!(result, Err(BuildError::EmptyName)));
    }

    #[test]
    fn build_trims_the_queue_name() {
        let queue = QueueBuilder::new(" mail\t").store(store()).build().unwrap();
        assert_eq!(queue.name(), "mail");
        assert_eq!(queue.settings().name, "mail");

        let result = QueueBuilder::new(" q ").max_runtime(-1).store(store()).build();
        assert!(matches!(
            result,
            Err(BuildError::NegativeMaxRuntime { ref queue, .. }) if queue == "q"
        ));
    }

    #[test]
    fn build_rejects_negative_max_runtime() {
        let result = QueueBuilder::new("q").max_runtime(-5).store(store()).build();
        assert!(matches!(
            result,
            Err(BuildError::NegativeMaxRuntime { value: -5, .. })
        ));
    }

    #[test]
    fn build_rejects_malformed_fixed_instant() {
        let result = QueueBuilder::new("q")
            .schedule(ScheduleSpec::at("soon"))
            .store(store())
            .build();
        assert!(matches!(
            result,
            Err(BuildError::InvalidSchedule { ref queue, .. }) if queue == "q"
        ));
    }

    #[test]
    fn build_requires_a_store() {
        let result = QueueBuilder::new("q").build();
        assert!(matches!(result, Err(BuildError::MissingStore(name)) if name == "q"));
    }

    #[test]
    fn from_config_carries_settings_and_parses_cron() {
        let config = QueueConfig {
            name: "digest".into(),
            max_runtime: 300,
            schedule: ScheduleConfig::Cron("0 6 * * MON-FRI".into()),
            debug: true,
            claim_retries: 1,
            pid: None,
            action: None,
        };
        let queue = QueueBuilder::from_config(&config)
            .unwrap()
            .store(store())
            .build()
            .unwrap();

        assert_eq!(queue.settings().max_runtime, 300);
        assert!(queue.settings().debug);
        assert!(matches!(queue.schedule(), ScheduleSpec::Cron(_)));
    }

    #[test]
    fn from_config_reports_bad_cron() {
        let config = QueueConfig {
            name: "digest".into(),
            max_runtime: 0,
            schedule: ScheduleConfig::Cron("61 * * * *".into()),
            debug: false,
            claim_retries: 0,
            pid: None,
            action: None,
        };
        let result = QueueBuilder::from_config(&config);
        assert!(matches!(result, Err(BuildError::InvalidSchedule { .. })));
    }
}
