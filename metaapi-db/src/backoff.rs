//! Exponential backoff schedule for connection attempts
//!
//! Pure: the policy only computes delays, the connection manager sleeps.

use std::time::Duration;

/// Delay doubles after each failure until it would exceed `ceiling`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub factor: u32,
    pub ceiling: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            factor: 2,
            ceiling: Duration::from_secs(16),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retrying after the failure at `index` (0-based).
    ///
    /// `None` once the delay would exceed the ceiling: the caller must give up.
    pub fn delay_after(&self, index: u32) -> Option<Duration> {
        let multiplier = self.factor.checked_pow(index)?;
        let delay = self.initial.checked_mul(multiplier)?;
        (delay <= self.ceiling).then_some(delay)
    }

    /// Every delay the policy allows, in order
    pub fn schedule(&self) -> Vec<Duration> {
        // factor <= 1 never exceeds the ceiling; cap the walk
        (0..64).map_while(|index| self.delay_after(index)).collect()
    }

    /// Retries permitted before the connection attempt is fatal
    pub fn max_retries(&self) -> u32 {
        self.schedule().len() as u32
    }
}
