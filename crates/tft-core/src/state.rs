//! Connection state shared by the device link and the host push channel.

use std::fmt;

/// Lifecycle of a link (serial device or host push channel).
///
/// Each link's state is written only by the component that owns the link;
/// everything else reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No usable link.
    #[default]
    Disconnected,
    /// An open attempt is in progress.
    Connecting,
    /// The link is open and usable.
    Connected,
}

impl ConnectionState {
    /// Returns `true` only for [`ConnectionState::Connected`].
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}
