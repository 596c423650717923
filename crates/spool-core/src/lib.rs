//! spool-core
//!
//! Lease-based task queue over a shared transactional store.
//!
//! # Modules
//! - **domain**: items, lease states, task statistics, schedules, cron, errors
//! - **ports**: ItemStore, TaskStatsStore, Clock, ActionDispatcher
//! - **impls**: in-memory and SQLite stores, ActionRegistry
//! - **app**: QueueEngine, ExecutionRecorder, worker/GC loops, Producer
//! - **typed**: versioned payload codec
//! - **config**: TOML configuration

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod typed;

pub use app::{
    BuildError, ExecutionRecorder, GcLoop, GcReport, Producer, QueueBuilder, QueueCounts,
    QueueEngine, WorkerGroup, WorkerLoop,
};
pub use config::{ConfigError, QueueConfig, ScheduleConfig, SpoolConfig};
pub use domain::{
    ItemId, LeaseState, Pid, QueueError, QueueItem, ScheduleError, ScheduleSpec, StoreError,
    TaskDescriptor, TaskRecord,
};
