//! Retry and backoff policies for the two failure classes the coordinator
//! handles.
//!
//! - [`RetryPolicy`]: a small, flat retry budget for transient data-fetch
//!   errors (fixed number of attempts, fixed delay).
//! - [`ConnectionBackoff`]: the exponential reconnect policy for process
//!   failures (doubling delay, capped, fully reset on success).
//!
//! Both are explicit bounded loops driven by counters; retry-by-recursion is
//! deliberately avoided.

use std::time::{Duration, Instant};

// =============================================================================
// Flat Retry
// =============================================================================

/// Policy for retrying a transient operation a fixed number of times.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Maximum attempts before the failure is surfaced.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    /// Three attempts with a five-second flat delay, matching the refresh
    /// retry budget.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Connection Backoff
// =============================================================================

/// Exponential backoff state for process reconnect attempts.
///
/// The delay for attempt `n` is `initial * 2^(n-1)`, capped at `max`. A
/// successful connection resets the counter and delay to initial values.
#[derive(Debug, Clone)]
pub struct ConnectionBackoff {
    attempts: u32,
    initial: Duration,
    max: Duration,
    last_success: Option<Instant>,
}

impl Default for ConnectionBackoff {
    /// Five-second initial delay capped at five minutes.
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(300))
    }
}

impl ConnectionBackoff {
    /// Create a backoff policy with the given initial and maximum delay.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            attempts: 0,
            initial,
            max,
            last_success: None,
        }
    }

    /// Register a failed attempt and return the delay to sleep before the
    /// next one.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts += 1;
        let factor = 2u32.saturating_pow(self.attempts.saturating_sub(1).min(16));
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Reset to initial values after a successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_success = Some(Instant::now());
    }

    /// Failed attempts since the last success.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// When the last successful connection happened, if any.
    pub fn last_success(&self) -> Option<Instant> {
        self.last_success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_from_initial() {
        let mut backoff = ConnectionBackoff::default();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_secs(20));
        assert_eq!(backoff.attempts(), 3);
    }

    #[test]
    fn reset_restarts_from_initial() {
        let mut backoff = ConnectionBackoff::default();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert!(backoff.last_success().is_some());
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn delay_is_capped() {
        let mut backoff = ConnectionBackoff::new(Duration::from_secs(5), Duration::from_secs(60));
        for _ in 0..10 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
    }

    #[test]
    fn large_attempt_counts_do_not_overflow() {
        let mut backoff = ConnectionBackoff::new(Duration::from_secs(1), Duration::from_secs(30));
        for _ in 0..1000 {
            assert!(backoff.next_delay() <= Duration::from_secs(30));
        }
    }

    #[test]
    fn default_retry_policy_budget() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(5));
    }
}
