//! In-memory transport.
//!
//! [`MemoryTransport`] records everything the connection writes and lets
//! the holder of a clone play the broker: accept the stream, deliver
//! frames, or drop the link. Clones share state, so a test keeps one clone
//! while the connection owns another.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{EventSink, Transport, TransportEventKind};
use crate::error::ClientError;

#[derive(Debug, Default)]
struct Shared {
    urls: Vec<String>,
    sent: Vec<String>,
    sink: Option<EventSink>,
    writable: bool,
    closes: usize,
    refuse_next_open: Option<String>,
}

/// Loopback [`Transport`] driven by hand.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryTransport {
    /// Creates a transport with no stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Completes the pending `open`: the stream becomes writable and
    /// `Opened` is emitted. Returns `false` if nothing is pending.
    pub fn accept(&self) -> bool {
        let mut shared = self.lock();
        let Some(sink) = shared.sink.clone() else {
            return false;
        };
        shared.writable = true;
        drop(shared);
        sink.emit(TransportEventKind::Opened)
    }

    /// Delivers raw text as if the broker had sent it.
    pub fn deliver(&self, raw: &str) -> bool {
        let sink = self.lock().sink.clone();
        sink.is_some_and(|sink| sink.emit(TransportEventKind::Message(raw.to_owned())))
    }

    /// Reports a stream error without ending the stream.
    pub fn fail(&self, reason: &str) -> bool {
        let sink = self.lock().sink.clone();
        sink.is_some_and(|sink| sink.emit(TransportEventKind::Error(reason.to_owned())))
    }

    /// Ends the stream from the remote side.
    pub fn drop_link(&self) -> bool {
        let mut shared = self.lock();
        shared.writable = false;
        let Some(sink) = shared.sink.take() else {
            return false;
        };
        drop(shared);
        sink.emit(TransportEventKind::Closed)
    }

    /// Makes the next `open` call fail synchronously with `reason`.
    pub fn refuse_next_open(&self, reason: &str) {
        self.lock().refuse_next_open = Some(reason.to_owned());
    }

    /// Number of `open` calls that started a stream.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.lock().urls.len()
    }

    /// URL of the most recent `open`.
    #[must_use]
    pub fn last_url(&self) -> Option<String> {
        self.lock().urls.last().cloned()
    }

    /// Number of `close` calls.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    /// Everything written so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    /// Drains and returns everything written so far.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().sent)
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self, url: &str, events: EventSink) -> Result<(), ClientError> {
        let mut shared = self.lock();
        if let Some(reason) = shared.refuse_next_open.take() {
            return Err(ClientError::TransportOpen(reason));
        }
        shared.urls.push(url.to_owned());
        shared.sink = Some(events);
        shared.writable = false;
        Ok(())
    }

    fn send(&mut self, raw: String) -> Result<(), ClientError> {
        let mut shared = self.lock();
        if !shared.writable {
            return Err(ClientError::Transport("memory stream is not open".to_owned()));
        }
        shared.sent.push(raw);
        Ok(())
    }

    fn close(&mut self) {
        let mut shared = self.lock();
        shared.closes += 1;
        shared.writable = false;
        shared.sink = None;
    }

    fn is_writable(&self) -> bool {
        self.lock().writable
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn accept_emits_opened_with_epoch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = MemoryTransport::new();
        let remote = transport.clone();
        assert!(transport.open("ws://test/websocket", EventSink::new(3, tx)).is_ok());
        assert!(!transport.is_writable());

        assert!(remote.accept());
        assert!(transport.is_writable());
        let Ok(event) = rx.try_recv() else {
            panic!("expected Opened");
        };
        assert_eq!(event.epoch, 3);
        assert_eq!(event.kind, TransportEventKind::Opened);
    }

    #[test]
    fn send_requires_open_stream() {
        let mut transport = MemoryTransport::new();
        assert!(transport.send("x".to_owned()).is_err());
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn close_detaches_the_remote() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport = MemoryTransport::new();
        let remote = transport.clone();
        assert!(transport.open("ws://test/websocket", EventSink::new(1, tx)).is_ok());
        transport.close();
        transport.close();
        assert_eq!(remote.close_count(), 2);
        assert!(!remote.deliver("MESSAGE\n\n\u{0}"));
    }

    #[test]
    fn refused_open_is_not_counted() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport = MemoryTransport::new();
        transport.refuse_next_open("offline");
        let result = transport.open("ws://test/websocket", EventSink::new(1, tx));
        assert!(matches!(result, Err(ClientError::TransportOpen(reason)) if reason == "offline"));
        assert_eq!(transport.open_count(), 0);
    }
}
