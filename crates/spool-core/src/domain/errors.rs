//! Errors and their operational classification.

use thiserror::Error;

use crate::typed::CodecError;

/// Operational classification of a failure.
///
/// - Transient: may succeed on the next tick
/// - Permanent: retrying cannot help (bad schedule, bad payload)
/// - Infrastructure: the backing store misbehaved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// Failure reported by an item or statistics store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// begin/commit/rollback failed.
    #[error("transaction failed during {op}: {message}")]
    Transaction { op: &'static str, message: String },

    /// A statement failed inside an open transaction.
    #[error("store driver error: {0}")]
    Driver(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn transaction(op: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Transaction {
            op,
            message: err.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Transaction { .. } => ErrorKind::Transient,
            StoreError::Driver(_) | StoreError::LockPoisoned => ErrorKind::Infrastructure,
        }
    }
}

/// A schedule that cannot be evaluated.
///
/// Never downgraded to "not due".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("invalid instant '{0}'")]
    InvalidInstant(String),
}

/// Top-level error of queue operations.
///
/// Store failures are normally logged and swallowed by the engine; they only
/// appear here where a caller asked for them explicitly.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueueError::Schedule(_) | QueueError::Serialization(_) => ErrorKind::Permanent,
            QueueError::Store(e) => e.kind(),
        }
    }
}
