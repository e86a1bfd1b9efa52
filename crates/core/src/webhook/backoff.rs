//! Retry schedule for failed deliveries.

use chrono::{DateTime, Duration, Utc};

/// Exponential backoff: `min(base * 2^(attempt-1), max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Total attempts before a delivery is exhausted.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::seconds(30),
            max_delay: Duration::hours(1),
            max_attempts: 6,
        }
    }
}

impl BackoffPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(base: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_delay,
            max_attempts,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30);
        let factor = 1i32 << exponent;
        self.base
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// When to try again after failed attempt `attempt`, or `None` once the
    /// attempt budget is spent.
    #[must_use]
    pub fn next_retry(&self, attempt: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (attempt < self.max_attempts).then(|| now + self.delay_for(attempt))
    }
}
