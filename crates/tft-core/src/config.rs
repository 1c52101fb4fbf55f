//! Bridge configuration: raw acquisition values and the validated record.
//!
//! Configuration flows through two types:
//!
//! - [`RawConfig`] holds values exactly as they were acquired (built-in
//!   defaults, then an optional TOML file, then environment variables and
//!   CLI flags layered on top by the binary).  Numeric fields are signed or
//!   floating point so out-of-range input can be reported instead of being
//!   silently wrapped.
//! - [`BridgeConfig`] is the immutable result of [`validate`].  Every
//!   component receives it behind an `Arc` and never mutates it.
//!
//! Validation runs in one of two [`ValidationMode`]s.  `Strict` rejects the
//! first invalid value with a [`ConfigError`]; `Permissive` (standalone
//! operation) replaces each invalid value with its default and logs a
//! warning.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Baud rates the touchscreen link may be configured with.
pub const VALID_BAUD_RATES: [u32; 9] = [
    9600, 19200, 38400, 57600, 115_200, 230_400, 250_000, 460_800, 921_600,
];

pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD_RATE: u32 = 250_000;
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 7125;
pub const DEFAULT_TIMEOUT_SECS: f64 = 5.0;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY_SECS: f64 = 1.0;

// ── Error type ────────────────────────────────────────────────────────────────

/// A configuration value that cannot be used.
///
/// Only produced in [`ValidationMode::Strict`].  Always fatal: the binary
/// reports it and exits before any link is opened.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("serial port cannot be empty")]
    EmptySerialPort,

    #[error("invalid baud rate: {0}. Must be one of {VALID_BAUD_RATES:?}")]
    InvalidBaudRate(u32),

    #[error("host cannot be empty")]
    EmptyHost,

    #[error("invalid port: {0}. Must be 1-65535")]
    InvalidPort(i64),

    #[error("timeout must be positive (got {0})")]
    NonPositiveTimeout(f64),

    #[error("max retries must be non-negative (got {0})")]
    NegativeMaxRetries(i64),

    #[error("retry delay must be non-negative (got {0})")]
    NegativeRetryDelay(f64),

    #[error("failed to parse configuration file: {0}")]
    Parse(String),
}

// ── Raw values ────────────────────────────────────────────────────────────────

/// Configuration values before validation.
///
/// Deserializable from TOML; any key that is absent takes its built-in
/// default, so an empty file is a valid file.
///
/// ```rust
/// use tft_core::RawConfig;
///
/// let raw = RawConfig::from_toml_str("baud_rate = 115200").unwrap();
/// assert_eq!(raw.baud_rate, 115200);
/// assert_eq!(raw.port, 7125);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub serial_port: String,
    pub baud_rate: u32,
    pub host: String,
    pub port: i64,
    pub timeout_secs: f64,
    pub max_retries: i64,
    pub retry_delay_secs: f64,
    pub test_mode: bool,
    pub standalone_mode: bool,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            // Empty until the CLI, the file, or standalone detection fills it in.
            serial_port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            host: DEFAULT_HOST.to_string(),
            port: i64::from(DEFAULT_PORT),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: i64::from(DEFAULT_MAX_RETRIES),
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            test_mode: false,
            standalone_mode: false,
        }
    }
}

impl RawConfig {
    /// Parses a TOML document.  Unknown keys are ignored.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// The mode implied by the standalone flag.
    pub fn mode(&self) -> ValidationMode {
        if self.standalone_mode {
            ValidationMode::Permissive
        } else {
            ValidationMode::Strict
        }
    }
}

// ── Validated record ──────────────────────────────────────────────────────────

/// Immutable, validated bridge configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Device path of the touchscreen's serial link.
    pub serial_port: String,
    /// One of [`VALID_BAUD_RATES`].
    pub baud_rate: u32,
    pub host: String,
    pub port: u16,
    /// Per-request and per-connect-attempt timeout.
    pub timeout: Duration,
    /// Attempts per host request and per push-channel connect.
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `retry_delay * 2^n`.
    pub retry_delay: Duration,
    /// Record commands instead of sending them to the host.
    pub test_mode: bool,
    /// Missing device paths are a warning rather than a connect failure.
    pub standalone_mode: bool,
}

impl BridgeConfig {
    /// `http://host:port`
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// `ws://host:port/websocket`
    pub fn websocket_url(&self) -> String {
        format!("ws://{}:{}/websocket", self.host, self.port)
    }
}

impl Default for BridgeConfig {
    /// Equivalent to validating `RawConfig::default()` with the default
    /// device path filled in.
    fn default() -> Self {
        Self {
            serial_port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs_f64(DEFAULT_RETRY_DELAY_SECS),
            test_mode: false,
            standalone_mode: false,
        }
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

/// How [`validate`] treats an invalid value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Reject with a [`ConfigError`].
    Strict,
    /// Replace with the default and log a warning.
    Permissive,
}

/// Validates raw values into a [`BridgeConfig`].
///
/// # Errors
///
/// In [`ValidationMode::Strict`], returns the first [`ConfigError`] found.
/// [`ValidationMode::Permissive`] never fails.
pub fn validate(raw: RawConfig, mode: ValidationMode) -> Result<BridgeConfig, ConfigError> {
    let permissive = mode == ValidationMode::Permissive;

    let serial_port = if raw.serial_port.trim().is_empty() {
        if !permissive {
            return Err(ConfigError::EmptySerialPort);
        }
        warn!("serial port empty, using {}", DEFAULT_SERIAL_PORT);
        DEFAULT_SERIAL_PORT.to_string()
    } else {
        raw.serial_port
    };

    let baud_rate = if VALID_BAUD_RATES.contains(&raw.baud_rate) {
        raw.baud_rate
    } else {
        if !permissive {
            return Err(ConfigError::InvalidBaudRate(raw.baud_rate));
        }
        warn!("invalid baud rate {}, using {}", raw.baud_rate, DEFAULT_BAUD_RATE);
        DEFAULT_BAUD_RATE
    };

    let host = if raw.host.trim().is_empty() {
        if !permissive {
            return Err(ConfigError::EmptyHost);
        }
        warn!("host empty, using {}", DEFAULT_HOST);
        DEFAULT_HOST.to_string()
    } else {
        raw.host
    };

    let port = match u16::try_from(raw.port) {
        Ok(p) if p != 0 => p,
        _ => {
            if !permissive {
                return Err(ConfigError::InvalidPort(raw.port));
            }
            warn!("invalid port {}, using {}", raw.port, DEFAULT_PORT);
            DEFAULT_PORT
        }
    };

    // Written as a negated comparison so NaN is rejected as well.
    let timeout_secs = if !(raw.timeout_secs > 0.0) || !raw.timeout_secs.is_finite() {
        if !permissive {
            return Err(ConfigError::NonPositiveTimeout(raw.timeout_secs));
        }
        warn!("invalid timeout {}, using {}s", raw.timeout_secs, DEFAULT_TIMEOUT_SECS);
        DEFAULT_TIMEOUT_SECS
    } else {
        raw.timeout_secs
    };

    let max_retries = match u32::try_from(raw.max_retries) {
        Ok(n) => n,
        Err(_) if raw.max_retries > 0 => u32::MAX,
        Err(_) => {
            if !permissive {
                return Err(ConfigError::NegativeMaxRetries(raw.max_retries));
            }
            warn!("invalid max retries {}, using {}", raw.max_retries, DEFAULT_MAX_RETRIES);
            DEFAULT_MAX_RETRIES
        }
    };

    let retry_delay_secs = if !(raw.retry_delay_secs >= 0.0) || !raw.retry_delay_secs.is_finite() {
        if !permissive {
            return Err(ConfigError::NegativeRetryDelay(raw.retry_delay_secs));
        }
        warn!(
            "invalid retry delay {}, using {}s",
            raw.retry_delay_secs, DEFAULT_RETRY_DELAY_SECS
        );
        DEFAULT_RETRY_DELAY_SECS
    } else {
        raw.retry_delay_secs
    };

    Ok(BridgeConfig {
        serial_port,
        baud_rate,
        host,
        port,
        timeout: Duration::from_secs_f64(timeout_secs),
        max_retries,
        retry_delay: Duration::from_secs_f64(retry_delay_secs),
        test_mode: raw.test_mode,
        standalone_mode: raw.standalone_mode,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
