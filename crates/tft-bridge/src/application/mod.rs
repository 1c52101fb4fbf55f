//! Application layer for tft-bridge.
//!
//! Knows *what* the bridge does with a command (answer it, translate it,
//! forward it) but not *how* bytes reach the host or the touchscreen.
//!
//! - [`host_api`]: the `HostApi` seam and its `ApiError` taxonomy
//! - [`translator`]: `TranslationEngine` with the lazily loaded macro registry
//! - [`test_mode`]: command recorder used when nothing may be executed

pub mod host_api;
pub mod test_mode;
pub mod translator;

pub use host_api::{ApiError, HostApi};
pub use test_mode::{TestModeRecorder, TestModeStats};
pub use translator::TranslationEngine;
