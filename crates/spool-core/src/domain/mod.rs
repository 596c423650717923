//! Domain model (ids, items, task statistics, schedules, errors).

pub mod cron;
pub mod errors;
pub mod ids;
pub mod item;
pub mod schedule;
pub mod task;

pub use self::cron::CronExpr;
pub use self::errors::{ErrorKind, QueueError, ScheduleError, StoreError};
pub use self::ids::{ItemId, Id, IdMarker};
pub use self::item::{LeaseState, QueueItem, UNCLAIMED};
pub use self::schedule::ScheduleSpec;
pub use self::task::{Pid, TaskDescriptor, TaskRecord};
