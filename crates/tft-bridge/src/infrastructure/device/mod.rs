//! Serial link to the touchscreen controller.
//!
//! [`DeviceLink`] owns the open port and its [`LineBuffer`](tft_core::LineBuffer).
//! The port itself sits behind two small traits so the link can be driven by
//! real hardware ([`serial::SystemPortOpener`]) or by an in-memory
//! [`mock::MockPortOpener`] in tests.
//!
//! ```text
//!  PortOpener::exists ──▶ PortOpener::probe ──▶ PortOpener::open
//!                                                     │
//!                                           Box<dyn LinePort>
//!                                                     │
//!                     DeviceLink::read_line / write_line / close
//! ```

use std::io;

pub mod link;
pub mod mock;
pub mod serial;

pub use link::DeviceLink;
pub use serial::SystemPortOpener;

/// An open, byte-oriented port.
///
/// Reads and writes are blocking but bounded by the port's timeouts; callers
/// only read after `bytes_to_read` reports pending input.
pub trait LinePort: Send {
    /// Number of bytes that can be read without blocking.
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;
}

/// Locates and opens ports.
pub trait PortOpener: Send + Sync {
    /// `true` if a device node exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Opens and immediately releases the port to check it is accessible.
    fn probe(&self, path: &str, baud_rate: u32) -> io::Result<()>;

    /// Opens the port with the full link settings.
    fn open(&self, path: &str, baud_rate: u32) -> io::Result<Box<dyn LinePort>>;
}
