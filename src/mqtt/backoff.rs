//! Reconnect backoff
//!
//! Delays double after every failed attempt and are capped at `max`. A
//! successful reconnect resets the sequence to `base`.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    attempts: u32,
}

impl ReconnectBackoff {
    pub const DEFAULT_BASE: Duration = Duration::from_secs(1);
    /// Longest wait between two reconnect attempts.
    pub const DEFAULT_MAX: Duration = Duration::from_secs(300);

    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            attempts: 0,
        }
    }

    /// Delay to wait before the next attempt. Advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.checked_pow(self.attempts).unwrap_or(u32::MAX);
        let delay = self.base.saturating_mul(factor).min(self.max);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Delay the next call to `next_delay` would return, without advancing.
    pub fn current_delay(&self) -> Duration {
        self.clone().next_delay()
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE, Self::DEFAULT_MAX)
    }
}
