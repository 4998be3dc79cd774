//! Retry policy implementation

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff applied to retryable task failures
///
/// The delay grows linearly with the number of attempts already made:
/// `attempt × unit`, optionally capped at `max_interval`. A task on its
/// first retry (attempt 1) waits one unit, the next waits two, and so on.
///
/// # Example
///
/// ```
/// use lease_queue::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::linear(Duration::from_secs(5))
///     .with_max_interval(Duration::from_secs(60));
///
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(10));
/// assert_eq!(policy.delay_for_attempt(100), Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay added per attempt already made
    #[serde(with = "duration_millis")]
    pub unit: Duration,

    /// Upper bound on any single delay
    #[serde(default, with = "option_duration_millis")]
    pub max_interval: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(Self::DEFAULT_UNIT)
    }
}

impl RetryPolicy {
    pub const DEFAULT_UNIT: Duration = Duration::from_secs(5);

    /// Create a linear backoff policy without a cap
    pub fn linear(unit: Duration) -> Self {
        Self {
            unit,
            max_interval: None,
        }
    }

    /// Create a policy that reschedules immediately
    pub fn immediate() -> Self {
        Self::linear(Duration::ZERO)
    }

    /// Set the per-attempt unit
    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    /// Cap every delay at `interval`
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = Some(interval);
        self
    }

    /// Delay before the next try of a task that has made `attempt` attempts
    ///
    /// Non-positive attempt counts yield no delay.
    pub fn delay_for_attempt(&self, attempt: i32) -> Duration {
        if attempt <= 0 {
            return Duration::ZERO;
        }

        let delay = self.unit.saturating_mul(attempt as u32);
        match self.max_interval {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

pub(crate) mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
