//! Retry policy with exponential backoff for source requests.
//!
//! # Delay Calculation
//!
//! ```text
//! delay(n) = min(base_delay * multiplier^(n-1), max_delay)
//! ```
//!
//! where `n` is the attempt that just failed (1-indexed). A `Retry-After`
//! hint from a 429 response replaces the computed delay, capped at
//! `max_delay`.

use std::time::Duration;

use tracing::debug;

use crate::config::Config;
use crate::error::SourceError;

/// Default attempts, including the initial attempt.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Decision after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then make attempt number `attempt`.
    Retry {
        /// Backoff before the next attempt.
        delay: Duration,
        /// Next attempt number (1-indexed).
        attempt: u32,
    },
    /// Surface the error.
    GiveUp,
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Create a policy; `max_attempts` is raised to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            multiplier: if multiplier.is_finite() && multiplier >= 1.0 { multiplier } else { 1.0 },
        }
    }

    /// Build the policy described by the configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_attempts, config.retry_base_delay, config.retry_max_delay, DEFAULT_MULTIPLIER)
    }

    /// Maximum attempts, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide what to do after `attempt` failed with `error`.
    #[must_use]
    pub fn decide(&self, error: &SourceError, attempt: u32) -> RetryDecision {
        if !error.is_retryable() || attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        let delay = error
            .retry_after()
            .map_or_else(|| self.backoff(attempt), |hint| hint.min(self.max_delay));

        debug!(attempt, next_attempt = attempt + 1, delay_ms = delay.as_millis() as u64, %error, "will retry");
        RetryDecision::Retry { delay, attempt: attempt + 1 }
    }

    /// Backoff after the given failed attempt (1-indexed).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(5), 2.0)
    }

    #[test]
    fn test_backoff_schedule_is_capped() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_secs(1));
        assert_eq!(p.backoff(2), Duration::from_secs(2));
        assert_eq!(p.backoff(3), Duration::from_secs(4));
        assert_eq!(p.backoff(4), Duration::from_secs(5));
        assert_eq!(p.backoff(40), Duration::from_secs(5));
    }

    #[test]
    fn test_non_retryable_gives_up_immediately() {
        let p = policy();
        assert_eq!(p.decide(&SourceError::bad_request("bad"), 1), RetryDecision::GiveUp);
        assert_eq!(p.decide(&SourceError::not_found("x"), 1), RetryDecision::GiveUp);
        assert_eq!(p.decide(&SourceError::Unauthorized { status: 401 }, 1), RetryDecision::GiveUp);
    }

    #[test]
    fn test_attempts_exhausted() {
        let p = policy();
        let err = SourceError::server(503, "down");
        assert!(matches!(p.decide(&err, 2), RetryDecision::Retry { attempt: 3, .. }));
        assert_eq!(p.decide(&err, 3), RetryDecision::GiveUp);
    }

    #[test]
    fn test_retry_after_is_honoured_and_capped() {
        let p = policy();
        let short = SourceError::rate_limited(Some(2));
        assert_eq!(p.decide(&short, 1), RetryDecision::Retry { delay: Duration::from_secs(2), attempt: 2 });

        let long = SourceError::rate_limited(Some(600));
        assert_eq!(p.decide(&long, 1), RetryDecision::Retry { delay: Duration::from_secs(5), attempt: 2 });
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let p = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO, 2.0);
        assert_eq!(p.max_attempts(), 1);
        assert_eq!(p.decide(&SourceError::server(500, ""), 1), RetryDecision::GiveUp);
    }
}
