//! Sliding-window throttle for outbound host requests.
//!
//! At most `capacity` acquisitions are admitted within any trailing window of
//! `window` length.  A caller that would exceed the limit sleeps until the
//! oldest admission leaves the window.
//!
//! The whole evict / wait / record sequence for one call runs under a single
//! async mutex, so concurrent callers are admitted strictly one at a time and
//! the window never holds more than `capacity` entries.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Requests per window used by the host client.
pub const DEFAULT_CAPACITY: usize = 20;

/// Window length used by the host client.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter admitting `capacity` calls per `window`.
    ///
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize, window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Waits until a request may be sent, then records it.
    pub async fn acquire(&self) {
        let mut admitted = self.admitted.lock().await;

        let now = Instant::now();
        while admitted
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) > self.window)
        {
            admitted.pop_front();
        }

        if admitted.len() >= self.capacity {
            if let Some(oldest) = admitted.front().copied() {
                let wait = self.window.saturating_sub(now.saturating_duration_since(oldest));
                debug!("rate limit reached, waiting {:?}", wait);
                sleep(wait).await;
            }
            admitted.pop_front();
        }

        admitted.push_back(Instant::now());
    }

    /// Number of admissions currently inside the window bookkeeping.
    pub async fn in_window(&self) -> usize {
        self.admitted.lock().await.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_WINDOW)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
