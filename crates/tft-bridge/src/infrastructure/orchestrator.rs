//! Bridge: the top-level coordinator.
//!
//! Owns the device link and the translation engine, holds the host client,
//! and runs three loops until the shutdown token fires:
//!
//! ```text
//!                      ┌───────────────────────────────┐
//!  serial ──▶ DeviceLink ──▶ dispatch loop (foreground) ──▶ TranslationEngine
//!    ▲                 │            │                               │
//!    │                 │            ▼                               ▼
//!    └── write_line ◀──┘      local answers                  HostApi::send_command
//!
//!  status-push loop     every 2 s: unsolicited temperature report
//!  device-reconnect     reopen the serial port with capped backoff
//! ```
//!
//! # Lifecycle
//!
//! `Idle → Running → ShuttingDown → Stopped`.  `Running` is entered once the
//! host client has started; the device link may connect later.  On shutdown
//! the background loops are cancelled and joined, then the device link is
//! closed and the host client stopped.  Cleanup runs once however many times
//! shutdown is requested.
//!
//! # Dispatch
//!
//! Commands are processed one at a time in arrival order and every command
//! gets a reply.  Nothing that goes wrong downstream stops the dispatch loop:
//! host failures become `ok` or `!!` replies and a panic inside one cycle is
//! caught and answered with `ok`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tft_core::backoff::ReconnectBackoff;
use tft_core::protocol::command::{firmware_info_line, LocalQuery};
use tft_core::protocol::temperature::{format_temperature_report, TEMPERATURE_FALLBACK};
use tft_core::protocol::{error_line, ACK};
use tft_core::BridgeConfig;

use crate::application::{HostApi, TranslationEngine};
use crate::infrastructure::device::{DeviceLink, PortOpener};

/// Bridge version reported in the firmware identification line.
pub const BRIDGE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Loop periods.  Tests shorten these.
#[derive(Debug, Clone)]
pub struct BridgeTimings {
    /// Sleep between polls of the device link.
    pub poll_interval: Duration,
    /// Period of the unsolicited temperature report.
    pub status_interval: Duration,
    /// Delay between failed device reconnect attempts.
    pub reconnect_backoff: ReconnectBackoff,
    /// How often a connected device link is checked for drops.
    pub connected_check: Duration,
}

impl Default for BridgeTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            status_interval: Duration::from_secs(2),
            reconnect_backoff: ReconnectBackoff::default(),
            connected_check: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Running,
    ShuttingDown,
    Stopped,
}

pub struct Bridge<H: HostApi + 'static> {
    config: Arc<BridgeConfig>,
    host: Arc<H>,
    translator: TranslationEngine<H>,
    device: Arc<DeviceLink>,
    timings: BridgeTimings,
    state: watch::Sender<BridgeState>,
    cleaned_up: AtomicBool,
}

impl<H: HostApi + 'static> Bridge<H> {
    pub fn new(config: Arc<BridgeConfig>, host: Arc<H>, opener: Arc<dyn PortOpener>) -> Self {
        if config.standalone_mode {
            warn!("STANDALONE MODE - running without installation, minimal setup required");
        }
        let (state, _) = watch::channel(BridgeState::Idle);
        Self {
            device: Arc::new(DeviceLink::new(&config, opener)),
            translator: TranslationEngine::new(Arc::clone(&host)),
            config,
            host,
            timings: BridgeTimings::default(),
            state,
            cleaned_up: AtomicBool::new(false),
        }
    }

    pub fn with_timings(mut self, timings: BridgeTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    pub fn device(&self) -> &Arc<DeviceLink> {
        &self.device
    }

    pub fn translator(&self) -> &TranslationEngine<H> {
        &self.translator
    }

    /// Opens the device link once.  The reconnect loop does this on its own;
    /// this is for callers that want the link up before `run`.
    pub async fn connect_device(&self) -> bool {
        self.device.connect().await
    }

    // ── Main loop ─────────────────────────────────────────────────────────────

    /// Runs the bridge until `cancel` fires, then shuts down.
    pub async fn run(self: &Arc<Self>, cancel: CancellationToken) {
        info!("starting TFT bridge v{BRIDGE_VERSION}");
        info!("host: {}:{}", self.config.host, self.config.port);
        info!(
            "serial: {} @ {} baud",
            self.config.serial_port, self.config.baud_rate
        );
        if !self.config.test_mode {
            info!("tip: use --test-mode first to verify the setup without affecting the printer");
        }

        self.host.start().await;
        self.state.send_replace(BridgeState::Running);
        info!("bridge started - will connect to devices as they become available");

        let background = cancel.child_token();
        let tasks: [(&str, JoinHandle<()>); 2] = [
            (
                "status push",
                tokio::spawn(Arc::clone(self).status_push_loop(background.clone())),
            ),
            (
                "device reconnect",
                tokio::spawn(Arc::clone(self).reconnect_loop(background.clone())),
            ),
        ];

        self.dispatch_loop(&cancel).await;
        info!("shutting down bridge...");
        self.state.send_replace(BridgeState::ShuttingDown);

        background.cancel();
        for (name, task) in tasks {
            match task.await {
                Ok(()) => debug!("{name} loop stopped"),
                Err(e) if e.is_cancelled() => debug!("{name} loop cancelled"),
                Err(e) => error!("{name} loop failed: {e}"),
            }
        }

        self.shutdown().await;
    }

    /// Closes the device link and stops the host client.  Runs once.
    pub async fn shutdown(&self) {
        if self.cleaned_up.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.send_replace(BridgeState::ShuttingDown);
        self.device.close();
        self.host.stop().await;
        self.state.send_replace(BridgeState::Stopped);
        info!("bridge shutdown complete");
    }

    async fn dispatch_loop(&self, cancel: &CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            if self.device.is_connected() {
                if let Some(line) = self.device.read_line() {
                    self.process_command(&line).await;
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.timings.poll_interval) => {}
            }
        }
    }

    async fn status_push_loop(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.timings.status_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !self.device.is_connected() {
                        continue;
                    }
                    let report = tokio::select! {
                        _ = cancel.cancelled() => break,
                        report = self.temperature_report() => report,
                    };
                    self.device.write_line(&report).await;
                }
            }
        }
    }

    async fn reconnect_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut backoff = self.timings.reconnect_backoff.clone();

        loop {
            if self.device.is_connected() {
                backoff.reset();
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(self.timings.connected_check) => continue,
                }
            }

            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                connected = self.device.connect() => connected,
            };
            if connected {
                info!("TFT connection established");
                backoff.reset();
                continue;
            }

            let wait = backoff.current();
            warn!("TFT connection failed, next attempt in {:.1}s", wait.as_secs_f64());
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(wait) => {}
            }
            backoff.record_failure();
        }
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Handles one line from the device and writes its reply.
    pub async fn process_command(&self, line: &str) {
        let command = line.trim();
        if command.is_empty() {
            return;
        }
        debug!("TFT -> {command}");

        let outcome = AssertUnwindSafe(self.dispatch(command)).catch_unwind().await;
        if let Err(panic) = outcome {
            error!(
                "error processing command '{command}': {}",
                panic_message(panic.as_ref())
            );
            // A failed write is already logged by the link.
            self.device.write_line(ACK).await;
        }
    }

    async fn dispatch(&self, command: &str) {
        if let Some(query) = LocalQuery::classify(command) {
            if self.config.test_mode {
                self.host.note_local_command(command);
            }
            match query {
                LocalQuery::FirmwareInfo => {
                    self.device.write_line(&firmware_info_line(BRIDGE_VERSION)).await;
                    self.device.write_line(ACK).await;
                }
                LocalQuery::TemperatureQuery => {
                    let report = self.temperature_report().await;
                    self.device.write_line(&report).await;
                }
            }
            return;
        }

        let Some(translated) = self.translator.translate(command).await else {
            debug!("unknown command: {command}");
            self.device.write_line(ACK).await;
            return;
        };

        info!("translating '{command}' -> '{translated}'");
        match self.host.send_command(&translated).await {
            Ok(_) => {
                self.device.write_line(ACK).await;
            }
            Err(e) => {
                warn!("host error for '{command}': {e}");
                self.device.write_line(&error_line(&e.to_string())).await;
            }
        }
    }

    /// Temperature report from the latest host status, or the zero fallback.
    async fn temperature_report(&self) -> String {
        match self.host.get_status().await {
            Ok(status) => format_temperature_report(&status),
            Err(e) => {
                debug!("host unavailable for temperature request: {e}");
                TEMPERATURE_FALLBACK.to_string()
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::ApiError;
    use crate::infrastructure::device::mock::MockPortOpener;
    use crate::infrastructure::host::mock::MockHost;

    type Fixture = (Arc<Bridge<MockHost>>, Arc<MockHost>, Arc<MockPortOpener>);

    fn bridge_with(host: MockHost, test_mode: bool) -> Fixture {
        let config = Arc::new(BridgeConfig {
            serial_port: "/dev/ttyMOCK0".to_string(),
            test_mode,
            ..BridgeConfig::default()
        });
        let host = Arc::new(host);
        let opener = Arc::new(MockPortOpener::new());
        let bridge = Bridge::new(
            config,
            Arc::clone(&host),
            Arc::clone(&opener) as Arc<dyn PortOpener>,
        );
        (Arc::new(bridge), host, opener)
    }

    fn status(ext: (f64, f64), bed: (f64, f64)) -> serde_json::Value {
        json!({"result": {"status": {
            "extruder": {"temperature": ext.0, "target": ext.1},
            "heater_bed": {"temperature": bed.0, "target": bed.1}
        }}})
    }

    // ── Local answers ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_firmware_info_answered_locally() {
        // Arrange
        let (bridge, host, opener) = bridge_with(MockHost::new(), false);
        bridge.connect_device().await;

        // Act
        bridge.process_command("M115").await;

        // Assert
        let written = opener.handle().written_lines();
        assert_eq!(written.len(), 2);
        assert!(written[0].starts_with("FIRMWARE_NAME:Klipper"));
        assert!(written[0].ends_with(&format!("BRIDGE_VERSION:{BRIDGE_VERSION}")));
        assert_eq!(written[1], "ok");
        assert!(host.sent_commands().is_empty());
        assert_eq!(host.config_queries(), 0);
    }

    #[tokio::test]
    async fn test_temperature_query_formats_status() {
        let (bridge, host, opener) =
            bridge_with(MockHost::new().with_status(status((205.3, 210.0), (60.1, 60.0))), false);
        bridge.connect_device().await;

        bridge.process_command("M105").await;

        assert_eq!(
            opener.handle().written_lines(),
            vec!["ok T:205.3 /210.0 B:60.1 /60.0"]
        );
        assert!(host.sent_commands().is_empty());
    }

    #[tokio::test]
    async fn test_temperature_query_falls_back_when_host_down() {
        let (bridge, _host, opener) = bridge_with(MockHost::new(), false);
        bridge.connect_device().await;

        bridge.process_command("M105").await;

        assert_eq!(opener.handle().written_lines(), vec![TEMPERATURE_FALLBACK]);
    }

    #[tokio::test]
    async fn test_local_commands_noted_in_test_mode() {
        let (bridge, host, _opener) = bridge_with(MockHost::new(), true);
        bridge.connect_device().await;

        bridge.process_command("M115").await;
        bridge.process_command("M105").await;

        assert_eq!(host.local_commands(), vec!["M115", "M105"]);
    }

    // ── Forwarded commands ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_translated_command_is_sent_and_acknowledged() {
        let (bridge, host, opener) = bridge_with(MockHost::new(), false);
        bridge.connect_device().await;

        bridge.process_command("G29").await;

        assert_eq!(host.sent_commands(), vec!["BED_MESH_CALIBRATE"]);
        assert_eq!(opener.handle().written_lines(), vec!["ok"]);
    }

    #[tokio::test]
    async fn test_unknown_command_still_acknowledged() {
        let (bridge, host, opener) = bridge_with(MockHost::new(), false);
        bridge.connect_device().await;

        bridge.process_command("M997").await;

        assert!(host.sent_commands().is_empty());
        assert_eq!(opener.handle().written_lines(), vec!["ok"]);
    }

    #[tokio::test]
    async fn test_host_reported_error_written_inline() {
        let host = MockHost::new().with_send_error(ApiError::Status {
            status: 400,
            message: "Must home axis first".into(),
        });
        let (bridge, _host, opener) = bridge_with(host, false);
        bridge.connect_device().await;

        bridge.process_command("G1 X10").await;

        assert_eq!(
            opener.handle().written_lines(),
            vec!["!! Must home axis first"]
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_written_inline() {
        // Arrange
        let host = MockHost::new().with_send_error(ApiError::Unreachable("refused".into()));
        let (bridge, host, opener) = bridge_with(host, false);
        bridge.connect_device().await;

        // Act
        bridge.process_command("G28").await;

        // Assert
        assert_eq!(
            opener.handle().written_lines(),
            vec!["!! host unreachable: refused"]
        );
        assert_eq!(host.sent_commands(), vec!["G28"]);
    }

    #[tokio::test]
    async fn test_timeout_written_inline() {
        let host = MockHost::new().with_send_error(ApiError::Timeout("after 5s".into()));
        let (bridge, _host, opener) = bridge_with(host, false);
        bridge.connect_device().await;

        bridge.process_command("G28").await;

        assert_eq!(
            opener.handle().written_lines(),
            vec!["!! request timed out: after 5s"]
        );
    }

    #[tokio::test]
    async fn test_rejected_command_written_inline() {
        let host = MockHost::new().with_send_error(ApiError::InvalidCommand);
        let (bridge, _host, opener) = bridge_with(host, false);
        bridge.connect_device().await;

        bridge.process_command("G28").await;

        assert_eq!(
            opener.handle().written_lines(),
            vec!["!! Invalid or empty G-code"]
        );
    }

    #[tokio::test]
    async fn test_blank_line_ignored() {
        let (bridge, host, opener) = bridge_with(MockHost::new(), false);
        bridge.connect_device().await;

        bridge.process_command("   ").await;

        assert!(opener.handle().written_lines().is_empty());
        assert_eq!(host.config_queries(), 0);
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_shutdown_runs_cleanup_once() {
        let (bridge, host, _opener) = bridge_with(MockHost::new(), false);

        bridge.shutdown().await;
        bridge.shutdown().await;

        assert_eq!(host.stop_calls(), 1);
        assert_eq!(bridge.state(), BridgeState::Stopped);
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
