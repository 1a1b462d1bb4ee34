//! Connection lifecycle states, notifications and counters.

use std::fmt;
use std::time::Duration;

/// Lifecycle state of a [`super::Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never connected, or waiting for an interactive environment.
    Idle,
    /// Transport open requested, not yet established.
    Connecting,
    /// Transport open, `CONNECT` sent, waiting for `CONNECTED`.
    Handshaking,
    /// Session established; publish and deliveries are live.
    Open,
    /// Explicit disconnect in progress.
    Closing,
    /// Explicitly disconnected, or lost with reconnection disabled.
    Closed,
    /// Link lost; a reconnect attempt is scheduled.
    Reconnecting,
}

impl ConnectionState {
    /// Returns the lowercase state name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Reconnecting => "reconnecting",
        }
    }

    /// Returns `true` while a transport stream is live or being opened.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Handshaking | Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications about the link, broadcast to anyone listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The broker accepted the session.
    Connected {
        /// `session` header of `CONNECTED`, if any.
        session: Option<String>,
        /// `server` header of `CONNECTED`, if any.
        server: Option<String>,
    },
    /// The link dropped without being asked to.
    Lost {
        /// Why the link is considered gone.
        reason: String,
    },
    /// A reconnect attempt was scheduled.
    ReconnectScheduled {
        /// Attempt number since the last successful handshake.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// The transport reported an error.
    TransportError {
        /// Error text from the transport.
        message: String,
    },
    /// An explicit disconnect completed.
    Disconnected,
}

/// Counters kept by the connection for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Frames written to the transport (heart-beats excluded).
    pub frames_sent: u64,
    /// Frames decoded from the transport (heart-beats excluded).
    pub frames_received: u64,
    /// Score messages handed to the bus.
    pub messages_delivered: u64,
    /// `publish` calls rejected because the session was not open.
    pub publishes_rejected: u64,
    /// Inbound frames or bodies discarded as malformed.
    pub decode_errors: u64,
    /// Reconnect attempts scheduled.
    pub reconnect_attempts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_lowercase() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }

    #[test]
    fn active_states() {
        assert!(ConnectionState::Handshaking.is_active());
        assert!(!ConnectionState::Reconnecting.is_active());
        assert!(!ConnectionState::Idle.is_active());
    }
}
