//! Impls - concrete adapters for the ports.
//!
//! - **InMemoryItemStore / InMemoryStatsStore**: single-process stores, used by tests
//! - **SqliteStore**: shared file-backed store for multi-process workers
//! - **ActionRegistry**: in-process action dispatcher

pub mod dispatch;
pub mod memory;
pub mod sqlite;

pub use self::dispatch::ActionRegistry;
pub use self::memory::{InMemoryItemStore, InMemoryStatsStore};
pub use self::sqlite::SqliteStore;
