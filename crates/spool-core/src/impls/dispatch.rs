//! ActionRegistry - in-process ActionDispatcher.
//!
//! Maps an action name to the handlers listening on it. Several handlers may
//! listen on one action; they run in registration order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::ports::{ActionDispatcher, ActionHandler};

#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Vec<Arc<dyn ActionHandler>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.entry(action.into()).or_default().push(handler);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, action: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        self.register(action, handler);
        self
    }

    pub fn handler_count(&self, action: &str) -> usize {
        self.handlers.get(action).map_or(0, Vec::len)
    }

    pub fn registered_actions(&self) -> Vec<String> {
        let mut actions: Vec<String> = self.handlers.keys().cloned().collect();
        actions.sort();
        actions
    }
}

#[async_trait]
impl ActionDispatcher for ActionRegistry {
    async fn invoke(&self, action: &str) {
        let Some(handlers) = self.handlers.get(action) else {
            tracing::debug!(action, "no handlers registered");
            return;
        };
        for (index, handler) in handlers.iter().enumerate() {
            if let Err(e) = handler.handle(action).await {
                tracing::warn!(action, handler = index, error = %e, "action handler failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ActionError;
    use std::sync::Mutex;

    struct Recording {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl ActionHandler for Recording {
        async fn handle(&self, action: &str) -> Result<(), ActionError> {
            self.log.lock().unwrap().push(format!("{}:{action}", self.tag));
            if self.fail {
                Err(ActionError::new("boom"))
            } else {
                Ok(())
            }
        }
    }

    fn recording(tag: &'static str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<dyn ActionHandler> {
        Arc::new(Recording {
            tag,
            log: Arc::clone(log),
            fail,
        })
    }

    #[tokio::test]
    async fn invoke_runs_every_handler_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = ActionRegistry::new()
            .with("cleanup", recording("a", &log, false))
            .with("cleanup", recording("b", &log, false))
            .with("mail", recording("c", &log, false));

        registry.invoke("cleanup").await;

        assert_eq!(*log.lock().unwrap(), vec!["a:cleanup", "b:cleanup"]);
        assert_eq!(registry.handler_count("cleanup"), 2);
        assert_eq!(registry.registered_actions(), vec!["cleanup", "mail"]);
    }

    #[tokio::test]
    async fn failing_handler_does_not_stop_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = ActionRegistry::new()
            .with("cleanup", recording("a", &log, true))
            .with("cleanup", recording("b", &log, false));

        registry.invoke("cleanup").await;

        assert_eq!(*log.lock().unwrap(), vec!["a:cleanup", "b:cleanup"]);
    }

    #[tokio::test]
    async fn unknown_action_is_a_no_op() {
        let registry = ActionRegistry::new();
        registry.invoke("nothing").await;
        assert_eq!(registry.handler_count("nothing"), 0);
    }
}
