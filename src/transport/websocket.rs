//! WebSocket transport built on `tokio-tungstenite`.
//!
//! Each `open` spawns a task that owns the socket. Outbound text goes to
//! the task over an unbounded channel; inbound messages and lifecycle
//! changes come back through the [`EventSink`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{EventSink, Transport, TransportEventKind};
use crate::error::ClientError;

/// Instruction for the socket task.
#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close,
}

/// WebSocket implementation of [`Transport`].
#[derive(Debug, Default)]
pub struct WebSocketTransport {
    writer: Option<mpsc::UnboundedSender<Outgoing>>,
    ready: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    /// Creates a transport with no stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for WebSocketTransport {
    fn open(&mut self, url: &str, events: EventSink) -> Result<(), ClientError> {
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ClientError::TransportOpen(format!(
                "unsupported endpoint {url}: expected ws:// or wss://"
            )));
        }
        self.close();

        let (writer, outgoing) = mpsc::unbounded_channel();
        let ready = Arc::new(AtomicBool::new(false));
        self.task = Some(tokio::spawn(run_socket(
            url.to_owned(),
            events,
            outgoing,
            Arc::clone(&ready),
        )));
        self.writer = Some(writer);
        self.ready = ready;
        Ok(())
    }

    fn send(&mut self, raw: String) -> Result<(), ClientError> {
        if !self.is_writable() {
            return Err(ClientError::Transport("socket is not open".to_owned()));
        }
        self.writer
            .as_ref()
            .ok_or_else(|| ClientError::Transport("socket is not open".to_owned()))?
            .send(Outgoing::Text(raw))
            .map_err(|_| ClientError::Transport("socket task has stopped".to_owned()))
    }

    fn close(&mut self) {
        let was_open = self.ready.swap(false, Ordering::AcqRel);
        if let Some(writer) = self.writer.take() {
            let _ = writer.send(Outgoing::Close);
        }
        // An open socket exits on its own after the close frame; a pending
        // upgrade may never finish.
        if let Some(task) = self.task.take()
            && !was_open
        {
            task.abort();
        }
    }

    fn is_writable(&self) -> bool {
        self.writer.is_some() && self.ready.load(Ordering::Acquire)
    }
}

/// Owns the socket for one epoch: connects, then pumps both directions
/// until either side closes.
async fn run_socket(
    url: String,
    events: EventSink,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    ready: Arc<AtomicBool>,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::debug!(%url, epoch = events.epoch(), error = %e, "websocket connect failed");
            events.emit(TransportEventKind::Error(e.to_string()));
            events.emit(TransportEventKind::Closed);
            return;
        }
    };

    ready.store(true, Ordering::Release);
    events.emit(TransportEventKind::Opened);
    let (mut ws_tx, mut ws_rx) = stream.split();

    loop {
        tokio::select! {
            // Outbound text from the connection
            out = outgoing.recv() => {
                match out {
                    Some(Outgoing::Text(text)) => {
                        if let Err(e) = ws_tx.send(Message::text(text)).await {
                            events.emit(TransportEventKind::Error(e.to_string()));
                            break;
                        }
                    }
                    Some(Outgoing::Close) | None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            // Inbound from the broker
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        events.emit(TransportEventKind::Message(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => {
                            events.emit(TransportEventKind::Message(text));
                        }
                        Err(_) => tracing::warn!("dropping non-UTF-8 binary message"),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        events.emit(TransportEventKind::Error(e.to_string()));
                        break;
                    }
                }
            }
        }
    }

    ready.store(false, Ordering::Release);
    events.emit(TransportEventKind::Closed);
    tracing::debug!(epoch = events.epoch(), "websocket stream ended");
}
