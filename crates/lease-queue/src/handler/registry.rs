//! Handler registry keyed by task type
//!
//! The registry is fixed once a queue is constructed. Its keys are the only
//! task types the queue asks the store for.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::{handler_fn, TaskContext, TaskError, TaskHandler};
use crate::persistence::Task;

/// Registry of task handlers
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a task type
    ///
    /// Registering the same type twice replaces the earlier handler.
    pub fn register<H: TaskHandler>(&mut self, task_type: impl Into<String>, handler: H) {
        self.register_arc(task_type, Arc::new(handler));
    }

    /// Register an already shared handler
    pub fn register_arc(&mut self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        let task_type = task_type.into();
        if self.handlers.insert(task_type.clone(), handler).is_some() {
            tracing::warn!(task_type = %task_type, "replacing previously registered handler");
        }
    }

    /// Register an async closure as the handler for a task type
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut registry = HandlerRegistry::new();
    /// registry.register_fn("SEND_EMAIL", |ctx, task| async move {
    ///     send(&task.payload).await.retryable()
    /// });
    /// ```
    pub fn register_fn<F, Fut>(&mut self, task_type: impl Into<String>, f: F)
    where
        F: Fn(TaskContext, Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.register(task_type, handler_fn(f));
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_handler<H: TaskHandler>(mut self, task_type: impl Into<String>, handler: H) -> Self {
        self.register(task_type, handler);
        self
    }

    /// Look up the handler for a task type
    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).cloned()
    }

    /// Check if a task type is registered
    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Registered task types, sorted
    pub fn supported_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("task_types", &self.supported_types())
            .finish()
    }
}
