//! App - the queue engine and the pieces that drive it.
//!
//! - **QueueEngine / QueueBuilder**: lease-based operations on one logical queue
//! - **ExecutionRecorder**: runs a task's action and books the run
//! - **WorkerLoop / WorkerGroup**: claim → execute → delete until shutdown
//! - **GcLoop**: periodic eviction and lease reclaim
//! - **Producer**: schedule-gated task creation
//! - **QueueCounts**: lease-state snapshot

pub mod builder;
pub mod engine;
pub mod gc_loop;
pub mod producer;
pub mod recorder;
pub mod status;
pub mod worker_loop;

pub use self::builder::{BuildError, QueueBuilder};
pub use self::engine::{GcReport, QueueEngine, QueueSettings, RETENTION_SECS};
pub use self::gc_loop::GcLoop;
pub use self::producer::Producer;
pub use self::recorder::ExecutionRecorder;
pub use self::status::QueueCounts;
pub use self::worker_loop::{WorkerGroup, WorkerLoop};
