//! Queue configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reliability::{duration_millis, RetryPolicy};

pub const DEFAULT_WORKER_SLOTS: usize = 1;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(10);

/// Queue configuration
///
/// Zero values mean "unset" and are replaced by the defaults when the queue
/// is constructed, so a partially filled config (for example one
/// deserialized from a file) is always usable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue name, also the lease-owner identity written to the store
    pub queue_name: String,

    /// Number of concurrent worker slots
    pub worker_slots: usize,

    /// Interval between poll ticks
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,

    /// Lease requested for every picked task
    #[serde(with = "duration_millis")]
    pub lease_duration: Duration,

    /// Backoff for retryable failures
    pub retry_policy: RetryPolicy,

    /// Reschedule tasks whose handler panicked instead of failing them
    pub retry_panics: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: generate_queue_name(),
            worker_slots: DEFAULT_WORKER_SLOTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            lease_duration: DEFAULT_LEASE_DURATION,
            retry_policy: RetryPolicy::default(),
            retry_panics: false,
        }
    }
}

impl QueueConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `TASK_QUEUE_NAME` | `queue_name` |
    /// | `TASK_WORKER_SLOTS` | `worker_slots` |
    /// | `TASK_POLL_INTERVAL_MS` | `poll_interval` |
    /// | `TASK_LEASE_DURATION_MS` | `lease_duration` |
    /// | `TASK_RETRY_UNIT_MS` | `retry_policy.unit` |
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("TASK_QUEUE_NAME") {
            config.queue_name = name;
        }
        if let Some(slots) = parse_var::<usize>(&lookup, "TASK_WORKER_SLOTS")? {
            config.worker_slots = slots;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "TASK_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "TASK_LEASE_DURATION_MS")? {
            config.lease_duration = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "TASK_RETRY_UNIT_MS")? {
            config.retry_policy.unit = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Set the queue name
    pub fn with_queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue_name = name.into();
        self
    }

    /// Set the number of worker slots
    pub fn with_worker_slots(mut self, slots: usize) -> Self {
        self.worker_slots = slots;
        self
    }

    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the lease duration
    pub fn with_lease_duration(mut self, duration: Duration) -> Self {
        self.lease_duration = duration;
        self
    }

    /// Set the retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Reschedule panicked tasks as retryable
    pub fn with_retry_panics(mut self, retry: bool) -> Self {
        self.retry_panics = retry;
        self
    }

    /// Apply defaults to unset values and validate the rest
    pub fn resolve(mut self) -> Result<Self, ConfigError> {
        if self.queue_name.is_empty() {
            self.queue_name = generate_queue_name();
        } else if self.queue_name.trim().is_empty() {
            return Err(ConfigError::BlankQueueName);
        }
        if self.worker_slots == 0 {
            self.worker_slots = DEFAULT_WORKER_SLOTS;
        }
        if self.poll_interval.is_zero() {
            self.poll_interval = DEFAULT_POLL_INTERVAL;
        }
        if self.lease_duration.is_zero() {
            self.lease_duration = DEFAULT_LEASE_DURATION;
        }
        Ok(self)
    }
}

fn generate_queue_name() -> String {
    format!("default-{}", Uuid::now_v7())
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => Err(ConfigError::InvalidVar {
                var,
                reason: e.to_string(),
                value,
            }),
        },
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidVar {
        var: &'static str,
        value: String,
        reason: String,
    },

    /// The queue name consists only of whitespace
    #[error("queue name must not be blank")]
    BlankQueueName,
}
