//! Task handlers and their dispatch table.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

/// Error returned by a handler; its message becomes the task's failure reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("invalid task data: {err}"))
    }
}

/// Executes the payload of one task type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the task with its opaque `data` and produce a result.
    async fn handle(&self, data: Value) -> Result<Value, HandlerError>;
}

/// Adapter turning an async closure into a [`TaskHandler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn handle(&self, data: Value) -> Result<Value, HandlerError> {
        (self.f)(data).await
    }
}

/// Fallback for task types without a registered handler: `{"success": true}`.
/// Not used in strict mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHandler;

#[async_trait]
impl TaskHandler for DefaultHandler {
    async fn handle(&self, _data: Value) -> Result<Value, HandlerError> {
        Ok(json!({ "success": true }))
    }
}

/// Dispatch table keyed by task type.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    fallback: Option<Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// Empty table that falls back to [`DefaultHandler`].
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Some(Arc::new(DefaultHandler)),
        }
    }

    /// Empty table with no fallback: unknown types resolve to nothing.
    pub fn strict() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: None,
        }
    }

    /// Register (or replace) the handler for `task_type`.
    pub fn register(&mut self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_type.into(), handler);
    }

    /// Register an async closure as the handler for `task_type`.
    pub fn register_fn<F, Fut>(&mut self, task_type: impl Into<String>, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.register(task_type, Arc::new(FnHandler::new(f)));
    }

    /// Drop the fallback handler.
    pub fn set_strict(&mut self, strict: bool) {
        self.fallback = if strict {
            None
        } else {
            Some(Arc::new(DefaultHandler))
        };
    }

    /// Handler for `task_type`, or the fallback.
    pub fn resolve(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers
            .get(task_type)
            .or(self.fallback.as_ref())
            .cloned()
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("HandlerRegistry")
            .field("types", &types)
            .field("strict", &self.fallback.is_none())
            .finish()
    }
}
