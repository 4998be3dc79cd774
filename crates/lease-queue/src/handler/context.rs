//! Task execution context

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::TaskError;
use crate::persistence::{saturating_add, Task, TaskId};

/// Upper bound on the monotonic deadline, roughly 30 years
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Execution scope handed to a task handler
///
/// The scope ends at whichever comes first: shutdown of the queue, or the
/// task's lease deadline. Past the deadline another queue instance may
/// legitimately re-pick the task, so handlers should stop promptly once the
/// scope is done and return [`TaskError::Cancelled`] or
/// [`TaskError::DeadlineExceeded`] (which [`TaskContext::check`] and
/// [`TaskContext::cancelled`] produce).
///
/// # Example
///
/// ```ignore
/// async fn handle_task(&self, ctx: &TaskContext, task: &Task) -> Result<(), TaskError> {
///     for chunk in chunks(&task.payload) {
///         ctx.check()?;
///         upload(chunk).await.retryable()?;
///     }
///
///     // Or race a long call against the scope
///     ctx.run(render_pdf(&task.payload)).await?
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: TaskId,
    attempt: i32,
    max_retries: i32,
    lease_owner: String,
    deadline: DateTime<Utc>,
    deadline_at: Instant,
    token: CancellationToken,
}

impl TaskContext {
    /// Create a context ending at `deadline` or when `token` is cancelled
    pub fn new(
        task: &Task,
        lease_owner: impl Into<String>,
        deadline: DateTime<Utc>,
        token: CancellationToken,
    ) -> Self {
        let remaining = (deadline - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .min(FAR_FUTURE);
        Self {
            task_id: task.id,
            attempt: task.attempt,
            max_retries: task.max_retries,
            lease_owner: lease_owner.into(),
            deadline,
            deadline_at: Instant::now() + remaining,
            token,
        }
    }

    /// Derive the scope for a picked task
    ///
    /// The deadline is the task's lease expiry, or `now + fallback_lease`
    /// when the store did not report one. Cancellation is inherited from
    /// `parent`.
    pub fn for_task(
        task: &Task,
        lease_owner: impl Into<String>,
        fallback_lease: Duration,
        parent: &CancellationToken,
    ) -> Self {
        let deadline = task
            .locked_until
            .unwrap_or_else(|| saturating_add(Utc::now(), fallback_lease));
        Self::new(task, lease_owner, deadline, parent.child_token())
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Attempts made before this one
    pub fn attempt(&self) -> i32 {
        self.attempt
    }

    pub fn max_retries(&self) -> i32 {
        self.max_retries
    }

    /// Identity under which the lease is held
    pub fn lease_owner(&self) -> &str {
        &self.lease_owner
    }

    /// Instant at which the lease expires
    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// Time left before the lease expires
    pub fn remaining(&self) -> Duration {
        self.deadline_at.saturating_duration_since(Instant::now())
    }

    /// Check if the driving scope was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Check if the lease deadline has passed
    pub fn is_deadline_exceeded(&self) -> bool {
        Instant::now() >= self.deadline_at
    }

    /// Check if the scope is over, for either reason
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_deadline_exceeded()
    }

    /// Return the scope's error if it is over
    pub fn check(&self) -> Result<(), TaskError> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled)
        } else if self.is_deadline_exceeded() {
            Err(TaskError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    /// Wait until the scope is over and return why
    ///
    /// Useful in select! patterns:
    ///
    /// ```ignore
    /// tokio::select! {
    ///     result = do_work() => result,
    ///     reason = ctx.cancelled() => Err(reason),
    /// }
    /// ```
    pub async fn cancelled(&self) -> TaskError {
        tokio::select! {
            _ = self.token.cancelled() => TaskError::Cancelled,
            _ = tokio::time::sleep_until(self.deadline_at) => TaskError::DeadlineExceeded,
        }
    }

    /// Run a future, giving up once the scope is over
    pub async fn run<F, T>(&self, fut: F) -> Result<T, TaskError>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            output = fut => Ok(output),
            reason = self.cancelled() => Err(reason),
        }
    }

    /// Token cancelled with this scope's shutdown signal, for sub-tasks
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}
