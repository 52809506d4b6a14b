//! Retry policy shapes.
//!
//! Retry semantics are server-owned: the worker only ever returns a
//! failure to the server, never re-dispatches a task itself. `RetryPolicy` is
//! still part of the data model — `ActivityOptions` and
//! `WorkflowStartOptions` carry one to tell the server how it should retry —
//! and its helpers (`delay_for_attempt`, `should_retry`) are pure functions
//! used by tests that simulate server-driven retries and by callers deciding
//! what policy to hand the server. Neither helper drives anything on its own.

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// A small amount of jitter is applied to every computed interval to avoid
/// a thundering herd of simultaneously-retried tasks. This is an
/// implementation detail of [`RetryPolicy::delay_for_attempt`], not part of
/// the wire-visible policy shape.
const JITTER_FRACTION: f64 = 0.1;

/// `{ initial_interval, backoff_coefficient, maximum_interval?, maximum_attempts?, non_retryable_error_types }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    #[serde(with = "duration_millis")]
    pub initial_interval: Duration,

    /// Multiplier applied to the interval after each retry.
    pub backoff_coefficient: f64,

    /// Upper bound on the computed interval. `None` means unbounded.
    #[serde(default, with = "option_duration_millis")]
    pub maximum_interval: Option<Duration>,

    /// Maximum number of attempts including the first. `None` means
    /// unlimited (retry forever unless the error type is non-retryable).
    #[serde(default)]
    pub maximum_attempts: Option<u32>,

    /// Application failure `type` values that must never be retried
    /// regardless of attempt count.
    #[serde(default)]
    pub non_retryable_error_types: HashSet<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Some(Duration::from_secs(100)),
            maximum_attempts: None,
            non_retryable_error_types: HashSet::new(),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with the spec's suggested defaults.
    pub fn exponential() -> Self {
        Self::default()
    }

    /// A policy that never retries (`maximum_attempts = 1`).
    pub fn no_retry() -> Self {
        Self {
            initial_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
            maximum_interval: Some(Duration::ZERO),
            maximum_attempts: Some(1),
            non_retryable_error_types: HashSet::new(),
        }
    }

    /// Fixed-interval retries (no backoff growth).
    pub fn fixed(interval: Duration, maximum_attempts: u32) -> Self {
        Self {
            initial_interval: interval,
            backoff_coefficient: 1.0,
            maximum_interval: Some(interval),
            maximum_attempts: Some(maximum_attempts),
            non_retryable_error_types: HashSet::new(),
        }
    }

    pub fn with_maximum_attempts(mut self, maximum_attempts: u32) -> Self {
        self.maximum_attempts = Some(maximum_attempts);
        self
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_maximum_interval(mut self, interval: Duration) -> Self {
        self.maximum_interval = Some(interval);
        self
    }

    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient;
        self
    }

    pub fn with_non_retryable_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.non_retryable_error_types.insert(error_type.into());
        self
    }

    /// Delay before the given 1-based attempt. Attempt 1 always has zero
    /// delay (it is the initial attempt, not a retry).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let retry_num = attempt - 1;
        let base =
            self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(retry_num as i32 - 1);
        let capped = match self.maximum_interval {
            Some(max) => base.min(max.as_secs_f64()),
            None => base,
        };

        if JITTER_FRACTION <= 0.0 {
            return Duration::from_secs_f64(capped);
        }

        let jitter_range = capped * JITTER_FRACTION;
        let offset = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        Duration::from_secs_f64((capped + offset).max(0.0))
    }

    /// Whether the given `Application.type` (if any) is retryable under
    /// this policy. `None` (no type available) is always retryable.
    pub fn should_retry(&self, error_type: Option<&str>) -> bool {
        match error_type {
            Some(t) => !self.non_retryable_error_types.contains(t),
            None => true,
        }
    }

    /// Whether a further attempt is allowed after `current_attempt`.
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        match self.maximum_attempts {
            Some(max) => current_attempt < max,
            None => true,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_millis()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis: Option<u64> = Option::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

</content>
