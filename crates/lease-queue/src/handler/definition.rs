//! Task handler trait definition

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::{TaskContext, TaskError};
use crate::persistence::Task;

/// Executes tasks of one type
///
/// A handler owns the task's business logic and classifies its own
/// failures:
/// - `Ok(())` acknowledges the task
/// - [`TaskError::Retryable`] reschedules it with backoff
/// - [`TaskError::Unretryable`] fails it terminally
/// - [`TaskError::Cancelled`] / [`TaskError::DeadlineExceeded`] leave it to
///   lease expiry
///
/// Handlers are shared by every worker slot, so they must be `Send + Sync`
/// and should keep per-task state on the stack.
///
/// # Example
///
/// ```ignore
/// use lease_queue::prelude::*;
///
/// struct SendEmailHandler {
///     mailer: Mailer,
/// }
///
/// #[async_trait]
/// impl TaskHandler for SendEmailHandler {
///     async fn handle_task(&self, ctx: &TaskContext, task: &Task) -> Result<(), TaskError> {
///         let email: Email = decode_payload(task)?;
///         ctx.run(self.mailer.send(email)).await?.retryable()
///     }
/// }
/// ```
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Execute one task within the given scope
    async fn handle_task(&self, ctx: &TaskContext, task: &Task) -> Result<(), TaskError>;
}

/// Adapter that turns an async closure into a [`TaskHandler`]
pub struct FnHandler<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F, Fut>
where
    F: Fn(TaskContext, Task) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    async fn handle_task(&self, ctx: &TaskContext, task: &Task) -> Result<(), TaskError> {
        (self.f)(ctx.clone(), task.clone()).await
    }
}

/// Build a handler from an async closure
///
/// ```ignore
/// let handler = handler_fn(|_ctx, task| async move {
///     println!("processing {}", task.id);
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F, Fut>
where
    F: Fn(TaskContext, Task) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    FnHandler {
        f,
        _marker: PhantomData,
    }
}

/// Deserialize a task's payload
///
/// A payload that does not match the expected shape will never succeed on
/// retry, so the error is unretryable.
pub fn decode_payload<T: DeserializeOwned>(task: &Task) -> Result<T, TaskError> {
    serde_json::from_value(task.payload.clone()).map_err(|e| {
        TaskError::unretryable(anyhow::Error::new(e).context(format!(
            "invalid payload for task {} of type {}",
            task.id, task.task_type
        )))
    })
}
