//! Test-mode bookkeeping.
//!
//! In test mode the bridge accepts and acknowledges everything the
//! touchscreen sends but never executes a command on the host.  The recorder
//! counts what would have been sent so the operator can check the wiring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::info;

/// Summary logged when the bridge stops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestModeStats {
    pub commands_processed: u64,
    pub runtime: Duration,
    pub commands_per_minute: f64,
}

/// Counts commands seen in test mode.
#[derive(Debug)]
pub struct TestModeRecorder {
    count: AtomicU64,
    started: Instant,
}

impl TestModeRecorder {
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Records one command and returns its sequence number (starting at 1).
    ///
    /// `translated` is the text that would have been sent to the host, or
    /// `None` for commands the bridge answered itself.
    pub fn record(&self, command: &str, translated: Option<&str>) -> u64 {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        match translated {
            Some(t) => info!("[TEST] Command #{n}: '{command}' -> '{t}' (NOT EXECUTED)"),
            None => info!("[TEST] Command #{n}: '{command}' (local command)"),
        }
        n
    }

    pub fn stats(&self) -> TestModeStats {
        let commands_processed = self.count.load(Ordering::Relaxed);
        let runtime = self.started.elapsed();
        let secs = runtime.as_secs_f64();
        let commands_per_minute = if secs > 0.0 {
            commands_processed as f64 / secs * 60.0
        } else {
            0.0
        };
        TestModeStats {
            commands_processed,
            runtime,
            commands_per_minute,
        }
    }

    /// Logs [`Self::stats`] at info level.
    pub fn log_stats(&self) {
        let stats = self.stats();
        info!("TEST MODE STATISTICS:");
        info!("   Commands processed: {}", stats.commands_processed);
        info!("   Runtime: {:.1} seconds", stats.runtime.as_secs_f64());
        info!("   Commands per minute: {:.1}", stats.commands_per_minute);
    }
}

impl Default for TestModeRecorder {
    fn default() -> Self {
        Self::new()
    }
}
