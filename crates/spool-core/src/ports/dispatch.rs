//! ActionDispatcher port - fires the handlers registered for an action.
//!
//! The execution recorder only needs "fire everything listening on this
//! name". It is injected, so there is no process-wide hook table.

use async_trait::async_trait;

/// Error returned by a single action handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ActionError(pub String);

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// One listener of an action.
///
/// # Example
/// ```ignore
/// struct PurgeSessions;
///
/// #[async_trait]
/// impl ActionHandler for PurgeSessions {
///     async fn handle(&self, action: &str) -> Result<(), ActionError> {
///         sessions::purge_expired().await.map_err(|e| ActionError::new(e.to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, action: &str) -> Result<(), ActionError>;
}

/// Fires every handler registered for `action`.
///
/// Handler failures are the dispatcher's business; callers get nothing back.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn invoke(&self, action: &str);
}
