//! Retry policy for durable activities
//!
//! Exponential backoff between attempts, capped at `maximum_interval`.
//! Errors whose [`FlockError::kind`] appears in `non_retryable_error_types`
//! fail immediately.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::FlockError;

/// Activity retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub initial_interval: Duration,

    /// Multiplier applied to the delay after each attempt
    pub backoff_coefficient: f64,

    /// Upper bound for any single delay
    #[serde(with = "humantime_serde")]
    pub maximum_interval: Duration,

    /// Total attempts including the first (0 means unlimited)
    pub maximum_attempts: u32,

    /// Error kinds that are never retried
    pub non_retryable_error_types: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(60),
            maximum_attempts: 3,
            non_retryable_error_types: vec![
                "ConfigurationError".to_string(),
                "MissingEvaluatorError".to_string(),
                "NextAgentNotFoundError".to_string(),
                "AgentNotFoundError".to_string(),
            ],
        }
    }
}

impl RetryPolicy {
    /// A policy that runs the activity exactly once
    pub fn no_retry() -> Self {
        Self {
            maximum_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_maximum_attempts(mut self, attempts: u32) -> Self {
        self.maximum_attempts = attempts;
        self
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_maximum_interval(mut self, interval: Duration) -> Self {
        self.maximum_interval = interval;
        self
    }

    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient.max(1.0);
        self
    }

    pub fn with_non_retryable(mut self, kind: impl Into<String>) -> Self {
        self.non_retryable_error_types.push(kind.into());
        self
    }

    /// Delay before retry number `attempt` (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_interval.as_millis() as f64
            * self.backoff_coefficient.max(1.0).powi(attempt as i32);
        let clamped = base.min(self.maximum_interval.as_millis() as f64);
        Duration::from_millis(clamped as u64)
    }

    /// Whether another attempt is allowed after `attempts_made` failures of `error`
    pub fn should_retry(&self, error: &FlockError, attempts_made: u32) -> bool {
        if self.non_retryable_error_types.iter().any(|k| k == error.kind()) {
            return false;
        }
        self.maximum_attempts == 0 || attempts_made < self.maximum_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::default()
            .with_initial_interval(Duration::from_millis(100))
            .with_maximum_interval(Duration::from_millis(350));

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(350));
    }

    #[test]
    fn test_non_retryable_kinds() {
        let policy = RetryPolicy::default().with_maximum_attempts(5);
        let not_found = FlockError::NextAgentNotFound("ghost".to_string());
        let llm = FlockError::Llm("rate limited".to_string());

        assert!(!policy.should_retry(&not_found, 1));
        assert!(policy.should_retry(&llm, 1));
        assert!(policy.should_retry(&llm, 4));
        assert!(!policy.should_retry(&llm, 5));
    }

    #[test]
    fn test_unlimited_attempts() {
        let policy = RetryPolicy::default().with_maximum_attempts(0);
        assert!(policy.should_retry(&FlockError::Llm("x".to_string()), 1_000));
    }

    #[test]
    fn test_deserialize_humantime() {
        let policy: RetryPolicy = serde_json::from_value(serde_json::json!({
            "initial_interval": "250ms",
            "maximum_interval": "10s",
            "maximum_attempts": 4
        }))
        .unwrap();

        assert_eq!(policy.initial_interval, Duration::from_millis(250));
        assert_eq!(policy.maximum_interval, Duration::from_secs(10));
        assert_eq!(policy.backoff_coefficient, 2.0);
        assert_eq!(policy.maximum_attempts, 4);
    }
}
