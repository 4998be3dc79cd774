//! TaskStore trait definition

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a persisted task row
pub type TaskId = i64;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Task status
///
/// Owned by the store. The queue only requests transitions through
/// [`TaskStore::ack_tasks`] and [`TaskStore::nack_task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting to be picked
    Pending,

    /// Leased by a queue instance
    Locked,

    /// Processed successfully
    Done,

    /// Failed, eligible again once its backoff has elapsed
    ErrorRetryable,

    /// Failed terminally, needs external intervention
    ErrorUnretryable,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Locked => "LOCKED",
            Self::Done => "DONE",
            Self::ErrorRetryable => "ERROR_RETRYABLE",
            Self::ErrorUnretryable => "ERROR_UNRETRYABLE",
        }
    }

    /// Whether the status ends the task's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::ErrorUnretryable)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "LOCKED" => Ok(Self::Locked),
            "DONE" => Ok(Self::Done),
            "ERROR_RETRYABLE" => Ok(Self::ErrorRetryable),
            "ERROR_UNRETRYABLE" => Ok(Self::ErrorUnretryable),
            other => Err(StoreError::Serialization(format!(
                "unknown task status: {other}"
            ))),
        }
    }
}

/// A persisted unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    /// Routing tag used to select a handler
    pub task_type: String,

    pub status: TaskStatus,

    pub payload: serde_json::Value,

    /// Processing attempts so far; drives the retry backoff
    pub attempt: i32,

    /// Attempt ceiling, enforced by the store when picking retryable tasks
    pub max_retries: i32,

    /// Lease expiry, set by the store on pick
    pub locked_until: Option<DateTime<Utc>>,

    /// Lease owner identity (the picking queue's name)
    pub locked_by: Option<String>,

    pub last_error: Option<String>,

    /// Earliest instant a retryable task may be picked again
    pub run_after: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a pending task (mostly useful for tests and store implementations)
    pub fn new(id: TaskId, task_type: impl Into<String>, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            task_type: task_type.into(),
            status: TaskStatus::Pending,
            payload,
            attempt: 0,
            max_retries: 3,
            locked_until: None,
            locked_by: None,
            last_error: None,
            run_after: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the attempt count
    pub fn with_attempt(mut self, attempt: i32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Set the attempt ceiling
    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the lease expiry
    pub fn with_locked_until(mut self, locked_until: DateTime<Utc>) -> Self {
        self.locked_until = Some(locked_until);
        self
    }
}

/// Parameters for [`TaskStore::pick_tasks`]
#[derive(Debug, Clone, PartialEq)]
pub struct PickTasksParams {
    /// Only tasks with one of these types are eligible
    pub supported_types: Vec<String>,

    /// Upper bound on returned tasks
    pub max_count: usize,

    /// How long the lease lasts from the moment of the pick
    pub lease_duration: Duration,

    /// Identity recorded as the lease owner
    pub lease_owner: String,
}

/// Parameters for [`TaskStore::nack_task`]
#[derive(Debug, Clone, PartialEq)]
pub struct NackTaskParams {
    pub task_id: TaskId,

    /// Either [`TaskStatus::ErrorRetryable`] or [`TaskStatus::ErrorUnretryable`]
    pub status: TaskStatus,

    pub error_message: Option<String>,

    /// Delay before the task becomes eligible again (retryable only)
    pub retry_in: Option<Duration>,

    /// Must match the current lease owner for the update to apply
    pub lease_owner: String,
}

/// Persistence boundary for the task queue
///
/// Implementations must be thread-safe. They are the sole arbiter of lease
/// exclusivity: a row returned by `pick_tasks` must never be handed to a
/// second concurrent caller, in this process or any other, until its lease
/// expires.
#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    /// Lease up to `max_count` eligible tasks
    ///
    /// Returns an empty vector, not an error, when nothing is eligible.
    async fn pick_tasks(&self, params: PickTasksParams) -> Result<Vec<Task>, StoreError>;

    /// Mark tasks as done
    ///
    /// Idempotent: acknowledging an already-done task succeeds.
    async fn ack_tasks(&self, ids: &[TaskId]) -> Result<u64, StoreError>;

    /// Mark a task as failed, terminally or pending a retry
    async fn nack_task(&self, params: NackTaskParams) -> Result<u64, StoreError>;
}

/// `at + duration`, clamped to the latest representable instant
pub(crate) fn saturating_add(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Locked,
            TaskStatus::Done,
            TaskStatus::ErrorRetryable,
            TaskStatus::ErrorUnretryable,
        ] {
            assert_eq!(status.to_string().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("RUNNING".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn saturating_add_clamps_oversized_durations() {
        let now = Utc::now();
        assert_eq!(
            saturating_add(now, Duration::from_secs(5)),
            now + chrono::Duration::seconds(5)
        );
        assert_eq!(saturating_add(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&TaskStatus::ErrorRetryable).unwrap();
        assert_eq!(json, "\"ERROR_RETRYABLE\"");
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::ErrorUnretryable.is_terminal());
        assert!(!TaskStatus::ErrorRetryable.is_terminal());
        assert!(!TaskStatus::Locked.is_terminal());
    }

    #[test]
    fn new_task_is_pending_and_unleased() {
        let task = Task::new(7, "TEST", serde_json::json!({"k": 1})).with_attempt(2);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempt, 2);
        assert!(task.locked_until.is_none());
        assert!(task.locked_by.is_none());
    }
}
