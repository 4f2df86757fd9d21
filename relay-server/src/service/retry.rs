//! Conflict retry policy
//!
//! Bounds the optimistic update loop: a fixed number of attempts with a
//! doubling, capped backoff between them.

use std::time::Duration;

/// Retry bounds for conflicting updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total update attempts per workload, including the first one
    pub max_attempts: u32,

    /// Delay after the first conflict
    pub initial_backoff: Duration,

    /// Upper bound of the delay
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            ..Self::default()
        }
    }

    /// Delay following `current`; never shorter than `current`
    pub fn next_backoff(&self, current: Duration) -> Duration {
        current
            .saturating_mul(2)
            .min(self.max_backoff)
            .max(current)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
        }
    }
}
