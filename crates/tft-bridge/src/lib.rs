//! tft-bridge library crate.
//!
//! Relays a touchscreen controller's serial command stream to a Moonraker
//! host.  The binary in `main.rs` and the integration tests in `tests/` share
//! this module tree.
//!
//! # Architecture
//!
//! ```text
//! Touchscreen (G-code lines over serial)
//!         ↕
//! [tft-bridge]
//!   ├── application/       HostApi seam, TranslationEngine, test-mode recorder
//!   └── infrastructure/
//!         ├── device/      DeviceLink over serialport
//!         ├── host/        ApiClient (reqwest) + push channel (tokio-tungstenite)
//!         ├── rate_limiter Sliding-window throttle for host requests
//!         └── orchestrator Bridge: dispatch, status push, device reconnect
//!         ↕
//! Moonraker (HTTP + WebSocket)
//! ```
//!
//! Pure logic (config validation, sanitization, translation tables, framing)
//! lives in `tft_core`.

/// Application layer: what the bridge does with a command.
pub mod application;

/// Infrastructure layer: serial, HTTP and WebSocket adapters plus the orchestrator.
pub mod infrastructure;
