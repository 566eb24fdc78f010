//! Retry delay schedule for connection attempts

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Exponential backoff: base * 2^attempt, capped at `max_delay`, no jitter
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    attempt: AtomicU32,
}

impl ExponentialBackoff {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            attempt: AtomicU32::new(0),
        }
    }

    /// Delay for the next attempt, advancing the counter
    pub fn next_delay(&self) -> Duration {
        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst);
        self.calculate_delay(attempt)
    }

    /// Delay before zero-based `attempt`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt.min(16));
        self.base_delay
            .checked_mul(multiplier)
            .map(|delay| delay.min(self.max_delay))
            .unwrap_or(self.max_delay)
    }

    pub fn reset(&self) {
        self.attempt.store(0, Ordering::SeqCst);
    }

    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(4))
    }
}
