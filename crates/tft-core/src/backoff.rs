//! Retry and reconnect delay arithmetic.

use std::time::Duration;

/// Delay before retry number `attempt + 1`: `base * 2^attempt`.
///
/// Saturates at `Duration::MAX` instead of overflowing.
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(Duration::MAX)
}

/// Growing delay between device-link reconnect attempts.
///
/// Starts at `base`, multiplies by `factor` after every failure, never exceeds
/// `max`, and returns to `base` after a success.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    factor: f64,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(base: Duration, max: Duration, factor: f64) -> Self {
        Self {
            base,
            max,
            factor,
            current: base.min(max),
        }
    }

    /// Delay to wait before the next attempt.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Grows the delay after a failed attempt and returns the new value.
    pub fn record_failure(&mut self) -> Duration {
        let next = self.current.as_secs_f64() * self.factor;
        self.current = if next.is_finite() && next < self.max.as_secs_f64() {
            Duration::from_secs_f64(next)
        } else {
            self.max
        };
        self.current
    }

    /// Returns to the base delay after a successful attempt.
    pub fn reset(&mut self) {
        self.current = self.base.min(self.max);
    }
}

impl Default for ReconnectBackoff {
    /// 5 s base, ×1.5 per failure, 60 s cap.
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(60), 1.5)
    }
}
