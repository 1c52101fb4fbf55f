//! The host control API seam.
//!
//! The orchestrator and the translation engine talk to the host only through
//! [`HostApi`].  The HTTP implementation lives in
//! `infrastructure::host::api_client`; tests use
//! `infrastructure::host::mock::MockHost`.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// A failed host request.
///
/// `Unreachable`, `Timeout` and `Reset` are transient: the client retries them
/// with backoff.  Everything else is surfaced on the first occurrence.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// The connection was refused or could not be established.
    #[error("host unreachable: {0}")]
    Unreachable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    /// The host closed the connection mid-request.
    #[error("connection reset: {0}")]
    Reset(String),

    /// The host answered with a non-success status.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// The response body was not the JSON the client expected.
    #[error("invalid response: {0}")]
    Decode(String),

    /// The HTTP client could not be built or the request could not be formed.
    #[error("client error: {0}")]
    Client(String),

    /// Sanitization left nothing to send.
    #[error("Invalid or empty G-code")]
    InvalidCommand,

    /// A job filename failed validation.
    #[error("Invalid filename - potential security risk: {0}")]
    Security(String),
}

impl ApiError {
    /// `true` for failures worth retrying: the host may simply be absent or
    /// restarting.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Unreachable(_) | ApiError::Timeout(_) | ApiError::Reset(_)
        )
    }

    /// Diagnostic hint appended to the first failed attempt of a request.
    pub fn hint(&self, host: &str, port: u16) -> Option<String> {
        match self {
            ApiError::Unreachable(_) => Some(format!("host may not be running on {host}:{port}")),
            ApiError::Timeout(_) => Some("request timeout - check network connectivity".to_string()),
            ApiError::Reset(_) => {
                Some("host closed connection - may be overloaded or restarting".to_string())
            }
            _ => None,
        }
    }
}

/// Operations the bridge needs from the printer host.
///
/// Every method is fallible and may suspend.  Implementations must be safe to
/// share across the dispatch loop and the background loops.
#[async_trait]
pub trait HostApi: Send + Sync {
    /// Runs one command script on the host.
    async fn send_command(&self, command: &str) -> Result<Value, ApiError>;

    /// Queries heater, fan, toolhead and print state.
    async fn get_status(&self) -> Result<Value, ApiError>;

    /// Queries the host's parsed configuration (used for macro discovery).
    async fn query_config(&self) -> Result<Value, ApiError>;

    /// Opens connections and starts background work.  Never fails; problems
    /// are logged and retried.
    async fn start(&self) {}

    /// Stops background work and releases connections.
    async fn stop(&self) {}

    /// Records a command the bridge answered itself (test mode bookkeeping).
    fn note_local_command(&self, _command: &str) {}
}
