//! Touchscreen line protocol.
//!
//! The touchscreen sends one command per newline-terminated line and expects
//! one or more reply lines ending in `ok` (or an error line prefixed `!!`)
//! before it sends the next command.
//!
//! - [`framing`] turns the raw serial byte stream into complete lines.
//! - [`command`] recognises the queries the bridge answers itself.
//! - [`temperature`] formats temperature replies from a host status document.

pub mod command;
pub mod framing;
pub mod temperature;

/// Final acknowledgement line for every command.
pub const ACK: &str = "ok";

/// Prefix of an inline error reply.
pub const ERROR_PREFIX: &str = "!!";

/// Formats an inline error reply: `!! <message>`.
pub fn error_line(message: &str) -> String {
    format!("{ERROR_PREFIX} {message}")
}
