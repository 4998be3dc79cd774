//! Task execution error types
//!
//! Handlers classify their own failures. The queue never inspects error
//! messages: the variant alone decides whether a task is retried, failed
//! terminally, or left alone because its lease is no longer trusted.

use std::any::Any;
use std::time::Duration;

/// Failure returned by a task handler
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Transient failure; the task is rescheduled with backoff
    #[error("{error}")]
    Retryable {
        error: anyhow::Error,
        /// Overrides the queue's backoff when set
        retry_after: Option<Duration>,
    },

    /// Permanent failure; the task will not be picked again automatically
    #[error("{error}")]
    Unretryable { error: anyhow::Error },

    /// The driving scope was cancelled (shutdown)
    #[error("task execution cancelled")]
    Cancelled,

    /// The task's lease deadline passed while it was running
    #[error("task lease deadline exceeded")]
    DeadlineExceeded,

    /// The handler panicked; produced by the queue, not by handlers
    #[error("panic: {message}")]
    Panicked { message: String },
}

impl TaskError {
    /// Create a retryable error using the queue's backoff
    pub fn retryable(err: impl Into<anyhow::Error>) -> Self {
        Self::Retryable {
            error: err.into(),
            retry_after: None,
        }
    }

    /// Create a retryable error with an explicit delay
    pub fn retry_after(err: impl Into<anyhow::Error>, delay: Duration) -> Self {
        Self::Retryable {
            error: err.into(),
            retry_after: Some(delay),
        }
    }

    /// Create an unretryable error
    pub fn unretryable(err: impl Into<anyhow::Error>) -> Self {
        Self::Unretryable { error: err.into() }
    }

    /// Build from a caught panic payload
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::Panicked { message }
    }

    /// Check if the handler marked this error as retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }

    /// Check if this error is the execution scope's own cancellation or deadline
    pub fn is_scope_exit(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Message persisted with a negative acknowledgment
    pub fn store_message(&self) -> String {
        match self {
            Self::Retryable { error, .. } | Self::Unretryable { error } => format!("{error:#}"),
            other => other.to_string(),
        }
    }
}

impl From<anyhow::Error> for TaskError {
    /// Unmarked errors are terminal; retrying requires an explicit opt-in
    fn from(err: anyhow::Error) -> Self {
        Self::unretryable(err)
    }
}

/// Extension trait for Result to classify task errors inline
pub trait TaskResultExt<T> {
    /// Mark this result as retryable on error
    fn retryable(self) -> Result<T, TaskError>;

    /// Mark this result as unretryable on error
    fn unretryable(self) -> Result<T, TaskError>;
}

impl<T, E: Into<anyhow::Error>> TaskResultExt<T> for Result<T, E> {
    fn retryable(self) -> Result<T, TaskError> {
        self.map_err(TaskError::retryable)
    }

    fn unretryable(self) -> Result<T, TaskError> {
        self.map_err(TaskError::unretryable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_error() {
        let err = TaskError::retryable(anyhow::anyhow!("connection reset"));
        assert!(err.is_retryable());
        assert!(!err.is_scope_exit());
        assert_eq!(err.to_string(), "connection reset");
    }

    #[test]
    fn test_retry_after_keeps_delay() {
        let err = TaskError::retry_after(anyhow::anyhow!("rate limited"), Duration::from_secs(30));
        match err {
            TaskError::Retryable { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(30)))
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_from_anyhow_is_unretryable() {
        let err: TaskError = anyhow::anyhow!("bad payload").into();
        assert!(!err.is_retryable());
        assert!(matches!(err, TaskError::Unretryable { .. }));
    }

    #[test]
    fn test_scope_exit_variants() {
        assert!(TaskError::Cancelled.is_scope_exit());
        assert!(TaskError::DeadlineExceeded.is_scope_exit());
        assert!(!TaskError::Panicked { message: "x".into() }.is_scope_exit());
    }

    #[test]
    fn test_from_panic_payloads() {
        let err = TaskError::from_panic(Box::new("static str"));
        assert_eq!(err.to_string(), "panic: static str");

        let err = TaskError::from_panic(Box::new(String::from("owned")));
        assert_eq!(err.to_string(), "panic: owned");

        let err = TaskError::from_panic(Box::new(42_u32));
        assert_eq!(err.to_string(), "panic: unknown panic");
    }

    #[test]
    fn test_result_ext() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::other("disk full"));
        assert!(result.retryable().unwrap_err().is_retryable());

        let result: Result<(), anyhow::Error> = Err(anyhow::anyhow!("invalid input"));
        assert!(!result.unretryable().unwrap_err().is_retryable());
    }

    #[test]
    fn test_store_message_includes_context() {
        let err = TaskError::retryable(
            anyhow::anyhow!("timeout").context("failed to send receipt"),
        );
        assert_eq!(err.store_message(), "failed to send receipt: timeout");
    }
}
