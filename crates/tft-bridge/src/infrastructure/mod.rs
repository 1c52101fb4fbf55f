//! Infrastructure layer for tft-bridge.
//!
//! Contains the I/O-facing adapters: the host HTTP client and its push
//! channel supervisor, the serial device link, the outbound rate limiter, and
//! the orchestrator that wires them to the application layer.
//!
//! **Dependency rule**: this layer may depend on `application` and `tft_core`,
//! but MUST NOT be imported by the `application` layer outside of tests.

pub mod device;
pub mod host;
pub mod orchestrator;
pub mod rate_limiter;
