//! Task dispatch and outcome classification

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::handler::{HandlerRegistry, TaskContext, TaskError};
use crate::persistence::{NackTaskParams, Task, TaskStatus, TaskStore};
use crate::reliability::RetryPolicy;

/// What the queue does with a task once its handler returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Mark the task done
    Ack,
    /// Leave the task untouched; its lease expires on its own
    Abandon,
    /// Reschedule after `delay`
    Retry { delay: Duration },
    /// Fail the task terminally
    Fail,
}

impl Disposition {
    /// Classify a handler outcome
    ///
    /// Scope exits are checked before retryability: once the lease may have
    /// passed to another owner, the task's state must not be touched.
    pub fn classify(
        outcome: &Result<(), TaskError>,
        task: &Task,
        policy: &RetryPolicy,
        retry_panics: bool,
    ) -> Self {
        match outcome {
            Ok(()) => Self::Ack,
            Err(TaskError::Cancelled | TaskError::DeadlineExceeded) => Self::Abandon,
            Err(TaskError::Retryable { retry_after, .. }) => Self::Retry {
                delay: retry_after.unwrap_or_else(|| policy.delay_for_attempt(task.attempt)),
            },
            Err(TaskError::Panicked { .. }) if retry_panics => Self::Retry {
                delay: policy.delay_for_attempt(task.attempt),
            },
            Err(TaskError::Unretryable { .. } | TaskError::Panicked { .. }) => Self::Fail,
        }
    }
}

/// Runs a single task and reports its outcome to the store
pub(crate) struct Dispatcher {
    store: Arc<dyn TaskStore>,
    handlers: HandlerRegistry,
    queue_name: String,
    lease_duration: Duration,
    retry_policy: RetryPolicy,
    retry_panics: bool,
}

impl Dispatcher {
    pub(crate) fn new(
        store: Arc<dyn TaskStore>,
        handlers: HandlerRegistry,
        queue_name: String,
        lease_duration: Duration,
        retry_policy: RetryPolicy,
        retry_panics: bool,
    ) -> Self {
        Self {
            store,
            handlers,
            queue_name,
            lease_duration,
            retry_policy,
            retry_panics,
        }
    }

    /// Execute the task under a scope derived from `shutdown` and its lease
    ///
    /// An outcome that arrives after the lease deadline is discarded: the
    /// task may already belong to another owner.
    #[instrument(
        skip(self, task, shutdown),
        fields(queue = %self.queue_name, task_id = task.id, task_type = %task.task_type, attempt = task.attempt)
    )]
    pub(crate) async fn process(&self, task: Task, shutdown: &CancellationToken) -> Disposition {
        let ctx = TaskContext::for_task(&task, &self.queue_name, self.lease_duration, shutdown);
        let outcome = self.execute(&ctx, &task).await;

        if ctx.is_deadline_exceeded() {
            warn!(
                task_id = task.id,
                attempt = task.attempt,
                succeeded = outcome.is_ok(),
                "lease expired before the handler returned, discarding outcome"
            );
            return Disposition::Abandon;
        }

        let disposition =
            Disposition::classify(&outcome, &task, &self.retry_policy, self.retry_panics);

        match (disposition, outcome) {
            (Disposition::Ack, _) => self.ack(&task).await,
            (Disposition::Abandon, Err(reason)) => {
                warn!(
                    task_id = task.id,
                    attempt = task.attempt,
                    max_retries = task.max_retries,
                    reason = %reason,
                    "task scope ended before completion, leaving it to lease expiry"
                );
                Disposition::Abandon
            }
            (Disposition::Retry { delay }, Err(err)) => {
                self.nack(&task, TaskStatus::ErrorRetryable, err.store_message(), Some(delay))
                    .await;
                disposition
            }
            (Disposition::Fail, Err(err)) => {
                self.nack(&task, TaskStatus::ErrorUnretryable, err.store_message(), None)
                    .await;
                disposition
            }
            (disposition, Ok(())) => disposition,
        }
    }

    async fn execute(&self, ctx: &TaskContext, task: &Task) -> Result<(), TaskError> {
        let Some(handler) = self.handlers.get(&task.task_type) else {
            return Err(TaskError::unretryable(anyhow::anyhow!(
                "unknown task type: {}",
                task.task_type
            )));
        };

        debug!(task_id = task.id, "invoking handler");

        match AssertUnwindSafe(handler.handle_task(ctx, task))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let err = TaskError::from_panic(payload);
                error!(task_id = task.id, error = %err, "handler panicked");
                Err(err)
            }
        }
    }

    async fn ack(&self, task: &Task) -> Disposition {
        match self.store.ack_tasks(&[task.id]).await {
            Ok(_) => {
                debug!(task_id = task.id, "task acknowledged");
                Disposition::Ack
            }
            Err(e) => {
                // Handler succeeded but the store never recorded it
                error!(task_id = task.id, error = %e, "failed to acknowledge task");
                let delay = self.retry_policy.delay_for_attempt(task.attempt);
                self.nack(
                    task,
                    TaskStatus::ErrorRetryable,
                    format!("acknowledge failed: {e}"),
                    Some(delay),
                )
                .await;
                Disposition::Retry { delay }
            }
        }
    }

    async fn nack(
        &self,
        task: &Task,
        status: TaskStatus,
        message: String,
        retry_in: Option<Duration>,
    ) {
        let retryable = status == TaskStatus::ErrorRetryable;
        error!(
            task_id = task.id,
            task_type = %task.task_type,
            attempt = task.attempt,
            max_retries = task.max_retries,
            retryable,
            retry_in_ms = retry_in.map(|d| d.as_millis() as u64),
            error = %message,
            "task failed"
        );

        let params = NackTaskParams {
            task_id: task.id,
            status,
            error_message: Some(message),
            retry_in,
            lease_owner: self.queue_name.clone(),
        };

        match self.store.nack_task(params).await {
            Ok(0) => warn!(task_id = task.id, "nack matched no task, lease already lost"),
            Ok(_) => {}
            Err(e) => error!(task_id = task.id, error = %e, "failed to nack task"),
        }
    }
}
