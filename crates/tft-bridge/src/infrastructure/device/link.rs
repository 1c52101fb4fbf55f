//! DeviceLink: framed line reader/writer over the controller's serial port.
//!
//! The link never raises I/O errors to its callers.  A failed read or write
//! drops the port and publishes `Disconnected`; the orchestrator's reconnect
//! loop notices and reopens it.
//!
//! All methods take `&self`, so one `Arc<DeviceLink>` is shared by the
//! dispatch loop, the status-push loop and the reconnect loop.  Port access is
//! serialized by internal mutexes that are never held across an `.await`.
//! Writes can block for the port's I/O timeout, so they run on the blocking
//! pool.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use tft_core::security::MAX_COMMAND_LEN;
use tft_core::{BridgeConfig, ConnectionState, LineBuffer};

use super::{LinePort, PortOpener};

/// Largest single read from the port.
const READ_CHUNK: usize = 1024;

type SharedPort = Arc<Mutex<Box<dyn LinePort>>>;

#[derive(Default)]
struct LinkIo {
    port: Option<SharedPort>,
    buffer: LineBuffer,
}

fn lock_port(port: &SharedPort) -> MutexGuard<'_, Box<dyn LinePort>> {
    port.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct DeviceLink {
    path: String,
    baud_rate: u32,
    standalone: bool,
    opener: Arc<dyn PortOpener>,
    io: Mutex<LinkIo>,
    state: watch::Sender<ConnectionState>,
}

impl DeviceLink {
    pub fn new(config: &BridgeConfig, opener: Arc<dyn PortOpener>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            path: config.serial_port.clone(),
            baud_rate: config.baud_rate,
            standalone: config.standalone_mode,
            opener,
            io: Mutex::new(LinkIo::default()),
            state,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn lock_io(&self) -> MutexGuard<'_, LinkIo> {
        self.io.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens the port.  Returns `true` once the link is connected.
    ///
    /// Missing device nodes fail fast.  The port is probed before it is
    /// opened with the full 8N1 settings; both run on the blocking pool.
    pub async fn connect(&self) -> bool {
        self.state.send_replace(ConnectionState::Connecting);

        if !self.opener.exists(&self.path) {
            if self.standalone {
                warn!("serial port {} does not exist (standalone mode)", self.path);
            } else {
                error!("serial port {} does not exist", self.path);
            }
            self.state.send_replace(ConnectionState::Disconnected);
            return false;
        }

        let opener = Arc::clone(&self.opener);
        let path = self.path.clone();
        let baud_rate = self.baud_rate;
        let opened = tokio::task::spawn_blocking(move || {
            opener.probe(&path, baud_rate)?;
            opener.open(&path, baud_rate)
        })
        .await;

        match opened {
            Ok(Ok(port)) => {
                {
                    let mut io = self.lock_io();
                    io.port = Some(Arc::new(Mutex::new(port)));
                    io.buffer.clear();
                }
                self.state.send_replace(ConnectionState::Connected);
                info!("connected to TFT on {} at {} baud", self.path, self.baud_rate);
                true
            }
            Ok(Err(e)) => {
                error!("cannot access serial port {}: {e}", self.path);
                self.state.send_replace(ConnectionState::Disconnected);
                false
            }
            Err(e) => {
                error!("serial open task failed: {e}");
                self.state.send_replace(ConnectionState::Disconnected);
                false
            }
        }
    }

    /// Returns the next complete line, without waiting for input.
    ///
    /// Lines already framed from an earlier read are returned before the port
    /// is polled again.
    pub fn read_line(&self) -> Option<String> {
        let mut io = self.lock_io();
        if let Some(line) = io.buffer.next_line() {
            return Some(line);
        }

        let port = io.port.clone()?;
        let mut link = lock_port(&port);
        let buffer = &mut io.buffer;

        let result = link.bytes_to_read().and_then(|pending| {
            if pending == 0 {
                return Ok(0);
            }
            let mut chunk = vec![0u8; (pending as usize).min(READ_CHUNK)];
            let n = link.read(&mut chunk)?;
            buffer.extend(&chunk[..n]);
            Ok(n)
        });

        match result {
            Ok(0) => None,
            Ok(_) => buffer.next_line(),
            Err(e) => {
                error!("serial read error: {e}");
                self.drop_port(&mut io);
                None
            }
        }
    }

    /// Writes one line.  Returns `false` if the link is down or the write
    /// failed.
    pub async fn write_line(&self, text: &str) -> bool {
        let Some(port) = self.lock_io().port.clone() else {
            return false;
        };

        let mut line = match text.char_indices().nth(MAX_COMMAND_LEN) {
            Some((cut, _)) => {
                let preview: String = text.chars().take(50).collect();
                warn!("data too long, truncating: {preview}...");
                text[..cut].to_string()
            }
            None => text.to_string(),
        };
        line.push('\n');

        let written = {
            let port = Arc::clone(&port);
            let bytes = line.clone().into_bytes();
            tokio::task::spawn_blocking(move || {
                let mut port = lock_port(&port);
                port.write_all(&bytes).and_then(|()| port.flush())
            })
            .await
        };

        let failure = match written {
            Ok(Ok(())) => {
                debug!("TFT <- {}", line.trim_end());
                return true;
            }
            Ok(Err(e)) => format!("serial write error: {e}"),
            Err(e) => format!("serial write task failed: {e}"),
        };
        error!("{failure}");

        // A reconnect may have replaced the port while the write was in flight.
        let mut io = self.lock_io();
        if io.port.as_ref().is_some_and(|current| Arc::ptr_eq(current, &port)) {
            self.drop_port(&mut io);
        }
        false
    }

    /// Releases the port.  Safe to call repeatedly.
    pub fn close(&self) {
        let mut io = self.lock_io();
        if io.port.take().is_some() {
            info!("serial connection closed");
        }
        io.buffer.clear();
        self.state.send_replace(ConnectionState::Disconnected);
    }

    fn drop_port(&self, io: &mut LinkIo) {
        io.port = None;
        io.buffer.clear();
        self.state.send_replace(ConnectionState::Disconnected);
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        self.close();
    }
}
