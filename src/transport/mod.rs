//! Transport adapters: one duplex text stream to the broker.
//!
//! A [`Transport`] opens asynchronously and reports everything that happens
//! afterwards as [`TransportEvent`]s on a channel owned by the connection.
//! Each `open` call is stamped with an epoch so events from a stream that
//! was already replaced are recognised and ignored.

pub mod memory;
pub mod websocket;

use tokio::sync::mpsc;

use crate::error::ClientError;

pub use memory::MemoryTransport;
pub use websocket::WebSocketTransport;

/// What happened on a transport stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// The stream is open and writable.
    Opened,
    /// One text message arrived.
    Message(String),
    /// The stream reported an error. A [`TransportEventKind::Closed`]
    /// follows if the stream ended.
    Error(String),
    /// The stream ended, cleanly or not.
    Closed,
}

/// A transport event stamped with the epoch of the `open` that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    /// Epoch passed to [`Transport::open`].
    pub epoch: u64,
    /// What happened.
    pub kind: TransportEventKind,
}

/// Sender half handed to a transport on `open`.
#[derive(Debug, Clone)]
pub struct EventSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSink {
    /// Creates a sink that stamps every event with `epoch`.
    #[must_use]
    pub const fn new(epoch: u64, tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { epoch, tx }
    }

    /// Epoch this sink stamps on events.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Delivers an event. Returns `false` once the connection is gone.
    pub fn emit(&self, kind: TransportEventKind) -> bool {
        self.tx
            .send(TransportEvent {
                epoch: self.epoch,
                kind,
            })
            .is_ok()
    }
}

/// One physical connection to the broker.
///
/// Implementations never block: `open` only starts the attempt, and the
/// outcome arrives through the [`EventSink`]. A stream that ends must emit
/// [`TransportEventKind::Closed`], also after an error.
pub trait Transport: Send + 'static {
    /// Starts opening a stream to `url`, replacing any previous stream.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::TransportOpen`] if the attempt cannot even be
    /// started (for example an unsupported URL scheme).
    fn open(&mut self, url: &str, events: EventSink) -> Result<(), ClientError>;

    /// Hands one text message to the stream.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the stream is not open.
    fn send(&mut self, raw: String) -> Result<(), ClientError>;

    /// Closes the stream. Safe to call on a closed transport.
    fn close(&mut self);

    /// Returns `true` while `send` can succeed.
    fn is_writable(&self) -> bool;
}
