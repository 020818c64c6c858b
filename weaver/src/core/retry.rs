//! Retry policy for transient agent failures.

use std::time::Duration;

use crate::core::errors::AgentError;

/// Backoff never grows beyond this.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Exponential backoff for retrying an agent with identical input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff: MAX_BACKOFF,
        }
    }

    /// Whether a failure on the given retry number (0 = first attempt) should be retried.
    pub fn should_retry(&self, error: &AgentError, retry: u32) -> bool {
        error.is_retryable() && retry < self.max_retries
    }

    /// Delay before retry number `retry + 1`: `initial * 2^retry`, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(500));
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(10), MAX_BACKOFF);
        assert_eq!(policy.backoff(40), MAX_BACKOFF);
    }

    #[test]
    fn invalid_output_is_never_retried() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        assert!(!policy.should_retry(&AgentError::InvalidOutput("x".into()), 0));
        assert!(policy.should_retry(&AgentError::Timeout("x".into()), 2));
        assert!(!policy.should_retry(&AgentError::Timeout("x".into()), 3));
    }
}
