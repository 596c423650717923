//! Ports - the seams between the queue engine and the outside world.
//!
//! Each trait hides one external system: the shared item collection, the task
//! statistics collection, the time source, and the hook bus that runs actions.
//! Implementations live in [`crate::impls`].

pub mod clock;
pub mod dispatch;
pub mod item_store;
pub mod stats_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dispatch::{ActionDispatcher, ActionError, ActionHandler};
pub use self::item_store::ItemStore;
pub use self::stats_store::TaskStatsStore;
