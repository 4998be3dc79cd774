//! Reliability patterns for task execution
//!
//! This module provides:
//! - [`RetryPolicy`] - Linear backoff for retryable failures

mod retry;

pub(crate) use retry::duration_millis;
pub use retry::RetryPolicy;
