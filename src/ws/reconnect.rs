//! Bounded reconnect policy with exponential backoff.
//!
//! Applied by the session loop after an unexpected close. The connection
//! manager itself never retries.

use std::time::Duration;

/// Retry budget and backoff bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts allowed after a drop. `0` disables reconnecting.
    pub max_retries: u32,
    /// Delay before the first attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// A policy that never reconnects.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before attempt number `attempt` (0-based), or `None` once the
    /// budget is spent. Doubles per attempt, capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}
