//! ConnectionSupervisor: keeps the host's WebSocket push channel open.
//!
//! The push channel is independent of the request path: HTTP requests work
//! whether or not it is connected.  The supervisor owns the socket, drains
//! whatever the host pushes, notices when the socket closes, and reconnects
//! on a fixed check interval.
//!
//! ```text
//!            check tick, not connected
//! Disconnected ───────────────────────▶ Connecting
//!      ▲                                    │
//!      │  all attempts failed               │ handshake ok
//!      ├────────────────────────────────────┤
//!      │                                    ▼
//!      └──────── close / read error ─── Connected
//! ```
//!
//! State is published on a `watch` channel so other components can observe
//! it; only the supervisor writes it.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tft_core::backoff::retry_delay;
use tft_core::{BridgeConfig, ConnectionState};

/// Interval between connection checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

pub type PushChannel = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct ConnectionSupervisor {
    url: String,
    connect_timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    check_interval: Duration,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionSupervisor {
    pub fn new(config: &BridgeConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url: config.websocket_url(),
            connect_timeout: config.timeout,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            check_interval: DEFAULT_CHECK_INTERVAL,
            state,
        }
    }

    /// Overrides the check interval.  Zero is raised to one millisecond.
    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval.max(Duration::from_millis(1));
        self
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Opens the push channel, retrying with exponential backoff.
    ///
    /// Makes up to `max_retries` attempts (at least one), each bounded by the
    /// request timeout.  Returns the open socket, or `None` after the last
    /// failure.
    pub async fn connect(&self) -> Option<PushChannel> {
        self.state.send_replace(ConnectionState::Connecting);
        let attempts = self.max_retries.max(1);

        for attempt in 0..attempts {
            match timeout(self.connect_timeout, connect_async(self.url.as_str())).await {
                Ok(Ok((ws, _response))) => {
                    info!("connected to host push channel at {}", self.url);
                    self.state.send_replace(ConnectionState::Connected);
                    return Some(ws);
                }
                Ok(Err(e)) => {
                    warn!("push channel connection attempt {} failed: {e}", attempt + 1);
                }
                Err(_) => {
                    warn!(
                        "push channel connection attempt {} timed out after {:?}",
                        attempt + 1,
                        self.connect_timeout
                    );
                }
            }

            if attempt + 1 < attempts {
                sleep(retry_delay(self.retry_delay, attempt)).await;
            }
        }

        self.state.send_replace(ConnectionState::Disconnected);
        None
    }

    /// Supervises the push channel until `cancel` fires.
    ///
    /// The first check runs immediately.  On exit the socket is closed and the
    /// state is left `Disconnected`.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut channel: Option<PushChannel> = None;
        let mut check = interval(self.check_interval);
        check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                _ = check.tick() => {
                    if channel.is_none() {
                        debug!("push channel not connected, attempting to connect");
                        channel = tokio::select! {
                            _ = cancel.cancelled() => break,
                            ws = self.connect() => ws,
                        };
                    }
                }

                msg = next_message(&mut channel) => match msg {
                    Some(Ok(Message::Close(frame))) => {
                        warn!("host closed push channel: {:?}", frame);
                        channel = None;
                        self.state.send_replace(ConnectionState::Disconnected);
                    }
                    Some(Ok(_)) => {
                        // Notifications are not consumed; the socket only keeps the session alive.
                    }
                    Some(Err(e)) => {
                        warn!("push channel error: {e}");
                        channel = None;
                        self.state.send_replace(ConnectionState::Disconnected);
                    }
                    None => {
                        warn!("push channel ended");
                        channel = None;
                        self.state.send_replace(ConnectionState::Disconnected);
                    }
                },
            }
        }

        if let Some(mut ws) = channel.take() {
            // The peer may already be gone.
            if let Err(e) = ws.close(None).await {
                debug!("push channel close: {e}");
            }
        }
        self.state.send_replace(ConnectionState::Disconnected);
        debug!("push channel supervisor stopped");
    }
}

/// Next frame from the channel, or never if there is no channel.
async fn next_message(
    channel: &mut Option<PushChannel>,
) -> Option<Result<Message, tungstenite::Error>> {
    match channel {
        Some(ws) => ws.next().await,
        None => pending().await,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
