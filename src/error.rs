//! Client error types.
//!
//! [`ClientError`] is the central error type of the crate. Every variant
//! carries a numeric code for logs and a recoverability flag; none of them
//! is meant to reach the game UI as a crash.

use crate::connection::ConnectionState;
use crate::stomp::DecodeError;

/// Client-side error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category   | Typical handling                        |
/// |-----------|------------|-----------------------------------------|
/// | 1000–1999 | Transport  | reconnect policy                        |
/// | 2000–2999 | Protocol   | log and discard, or treat as link loss  |
/// | 3000–3999 | Usage      | log and drop the message                |
/// | 4000–4999 | Ranking    | show stale table                        |
/// | 5000–5999 | Config     | abort start-up                          |
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The transport could not be opened.
    #[error("transport open failed: {0}")]
    TransportOpen(String),

    /// Writing to the transport failed, or it is not writable.
    #[error("transport error: {0}")]
    Transport(String),

    /// `publish` was called while the connection was not `Open`.
    #[error("not connected (state: {state})")]
    NotConnected {
        /// State the connection was in when the call was rejected.
        state: ConnectionState,
    },

    /// An inbound frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// No `CONNECTED` arrived within the handshake window.
    #[error("handshake timed out after {waited_ms} ms")]
    HandshakeTimeout {
        /// Length of the window that expired.
        waited_ms: u64,
    },

    /// An outbound body could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `connect` was refused because no interactive environment exists yet.
    #[error("interactive environment not available")]
    NotInteractive,

    /// The connection task has stopped.
    #[error("connection task is gone")]
    ConnectionClosed,

    /// The ranking request failed.
    #[error("ranking request failed: {0}")]
    Ranking(#[from] reqwest::Error),

    /// A configuration value is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::TransportOpen(_) => 1001,
            Self::Transport(_) => 1002,
            Self::Decode(_) => 2001,
            Self::HandshakeTimeout { .. } => 2002,
            Self::NotConnected { .. } => 3001,
            Self::Serialization(_) => 3002,
            Self::NotInteractive => 3003,
            Self::ConnectionClosed => 3004,
            Self::Ranking(_) => 4001,
            Self::InvalidConfig(_) => 5001,
        }
    }

    /// Returns `true` if the client keeps working after this error.
    ///
    /// Only a gone connection task and bad configuration are terminal.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ConnectionClosed | Self::InvalidConfig(_))
    }
}
