//! # tft-core
//!
//! Shared, I/O-free foundation of the TFT bridge.
//!
//! The bridge sits between a touchscreen controller (which speaks a
//! line-oriented firmware command protocol over serial) and a Moonraker host
//! (which exposes an HTTP/WebSocket control API).  Everything in this crate is
//! pure: no sockets, no serial ports, no async runtime.  That keeps the
//! translation rules and validation logic testable without hardware.
//!
//! - **`config`** – The immutable [`BridgeConfig`] record and the
//!   [`validate`] function that produces it in strict or permissive mode.
//!
//! - **`security`** – Input sanitization for command text and job filenames.
//!
//! - **`backoff`** – Exponential retry delays and the capped reconnect
//!   backoff used by the device-link supervisor.
//!
//! - **`protocol`** – Line framing for the serial stream, classification of
//!   commands that are answered locally, and formatting of temperature
//!   reports.
//!
//! - **`translation`** – The ordered translation table, passthrough grammars
//!   and macro categorisation.

pub mod backoff;
pub mod config;
pub mod protocol;
pub mod security;
pub mod state;
pub mod translation;

pub use config::{validate, BridgeConfig, ConfigError, RawConfig, ValidationMode};
pub use protocol::framing::LineBuffer;
pub use state::ConnectionState;
pub use translation::{translate_with_macros, MacroCategory};
