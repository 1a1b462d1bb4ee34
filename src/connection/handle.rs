//! Connection task and its handle.
//!
//! Handles the request/event/timer loop for a single broker connection.
//! The [`ConnectionMachine`] lives on one task; every [`Connection`] clone
//! talks to it over a request channel, so frames, requests and timers are
//! processed strictly one at a time.

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use uuid::Uuid;

use super::machine::ConnectionMachine;
use super::state::{ConnectionEvent, ConnectionState, ConnectionStats};
use super::ConnectionConfig;
use crate::domain::{ScoreBus, ScoreFeed};
use crate::error::ClientError;
use crate::transport::{Transport, TransportEvent};

/// Requests from handles to the connection task.
#[derive(Debug)]
enum Request {
    Connect(oneshot::Sender<Result<(), ClientError>>),
    Disconnect(oneshot::Sender<()>),
    Publish {
        destination: String,
        json: String,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Subscribe {
        topic: String,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Unsubscribe(oneshot::Sender<Result<(), ClientError>>),
    SetInteractive(bool),
    Stats(oneshot::Sender<ConnectionStats>),
}

/// Handle to one broker connection.
///
/// Cheap to clone; all clones drive the same session. The connection task
/// disconnects and stops when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct Connection {
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<ConnectionState>,
    bus: ScoreBus,
    events: broadcast::Sender<ConnectionEvent>,
    session_id: Uuid,
}

impl Connection {
    /// Spawns the connection task on the current Tokio runtime.
    ///
    /// The connection starts in `Idle`; nothing is opened until
    /// [`Self::connect`]. With `interactive` false, `connect` is refused
    /// until [`Self::set_interactive`] enables it.
    #[must_use]
    pub fn spawn<T: Transport>(config: ConnectionConfig, transport: T, interactive: bool) -> Self {
        let (machine, transport_rx) = ConnectionMachine::new(config, transport, interactive);
        let bus = machine.bus().clone();
        let events = machine.notifier();
        let session_id = machine.session_id();
        let (state_tx, state) = watch::channel(machine.state());
        let (requests, request_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_connection(machine, request_rx, transport_rx, state_tx));

        Self {
            requests,
            state,
            bus,
            events,
            session_id,
        }
    }

    /// Starts connecting. A no-op if already connecting or open.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotInteractive`] if connecting is not allowed
    /// yet, or [`ClientError::ConnectionClosed`] if the task is gone.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Connect(reply))?;
        rx.await.map_err(|_| ClientError::ConnectionClosed)?
    }

    /// Disconnects and cancels any pending reconnect. Idempotent.
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self.request(Request::Disconnect(reply)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Publishes `body` as JSON to `destination`.
    ///
    /// Nothing is queued: a message published while the session is not
    /// open is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] unless the session is open,
    /// [`ClientError::Serialization`] if `body` does not serialize,
    /// [`ClientError::Transport`] if the write fails, or
    /// [`ClientError::ConnectionClosed`] if the task is gone.
    pub async fn publish<B: Serialize + ?Sized>(
        &self,
        destination: &str,
        body: &B,
    ) -> Result<(), ClientError> {
        let json = serde_json::to_string(body)?;
        let (reply, rx) = oneshot::channel();
        self.request(Request::Publish {
            destination: destination.to_owned(),
            json,
            reply,
        })?;
        rx.await.map_err(|_| ClientError::ConnectionClosed)?
    }

    /// Registers `topic` as the subscription kept across reconnects.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the subscription frame cannot
    /// be written, or [`ClientError::ConnectionClosed`] if the task is gone.
    pub async fn subscribe(&self, topic: &str) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Subscribe {
            topic: topic.to_owned(),
            reply,
        })?;
        rx.await.map_err(|_| ClientError::ConnectionClosed)?
    }

    /// Drops the registered subscription.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if `UNSUBSCRIBE` cannot be
    /// written, or [`ClientError::ConnectionClosed`] if the task is gone.
    pub async fn unsubscribe(&self) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Unsubscribe(reply))?;
        rx.await.map_err(|_| ClientError::ConnectionClosed)?
    }

    /// Tells the connection whether an interactive environment exists.
    pub fn set_interactive(&self, interactive: bool) {
        let _ = self.request(Request::SetInteractive(interactive));
    }

    /// Counters kept by the connection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectionClosed`] if the task is gone.
    pub async fn stats(&self) -> Result<ConnectionStats, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Stats(reply))?;
        rx.await.map_err(|_| ClientError::ConnectionClosed)
    }

    /// Last state published by the task.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Waits until the connection reaches `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectionClosed`] if the task stops first.
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<(), ClientError> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::ConnectionClosed)
    }

    /// Feed of score messages received from now on.
    #[must_use]
    pub fn scores(&self) -> ScoreFeed {
        self.bus.subscribe()
    }

    /// Receiver of connection notifications from now on.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Id correlating this connection's log lines.
    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    fn request(&self, request: Request) -> Result<(), ClientError> {
        self.requests
            .send(request)
            .map_err(|_| ClientError::ConnectionClosed)
    }
}

/// Runs the request/event/timer loop until every handle is dropped.
async fn run_connection<T: Transport>(
    mut machine: ConnectionMachine<T>,
    mut requests: mpsc::UnboundedReceiver<Request>,
    mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    state_tx: watch::Sender<ConnectionState>,
) {
    let session = machine.session_id();
    tracing::debug!(%session, "connection task started");

    loop {
        let deadline = machine.next_deadline();
        tokio::select! {
            // Request from a handle
            request = requests.recv() => {
                match request {
                    Some(request) => handle_request(&mut machine, request, &state_tx),
                    None => {
                        machine.disconnect(Instant::now());
                        publish_state(&machine, &state_tx);
                        break;
                    }
                }
            }
            // Event from the transport
            Some(event) = transport_events.recv() => {
                machine.handle_transport_event(event, Instant::now());
            }
            // Reconnect, handshake or heart-beat timer
            () = wait_until(deadline) => {
                machine.on_tick(Instant::now());
            }
        }
        publish_state(&machine, &state_tx);
    }

    tracing::debug!(%session, "connection task stopped");
}

/// Applies one request. The new state is published before the reply goes
/// out so callers observe it as soon as their call returns.
fn handle_request<T: Transport>(
    machine: &mut ConnectionMachine<T>,
    request: Request,
    state_tx: &watch::Sender<ConnectionState>,
) {
    let now = Instant::now();
    match request {
        Request::Connect(reply) => {
            let result = machine.connect(now);
            publish_state(machine, state_tx);
            let _ = reply.send(result);
        }
        Request::Disconnect(reply) => {
            machine.disconnect(now);
            publish_state(machine, state_tx);
            let _ = reply.send(());
        }
        Request::Publish {
            destination,
            json,
            reply,
        } => {
            let _ = reply.send(machine.publish_json(&destination, json, now));
        }
        Request::Subscribe { topic, reply } => {
            let _ = reply.send(machine.subscribe(&topic, now));
        }
        Request::Unsubscribe(reply) => {
            let _ = reply.send(machine.unsubscribe(now));
        }
        Request::SetInteractive(interactive) => machine.set_interactive(interactive),
        Request::Stats(reply) => {
            let _ = reply.send(machine.stats());
        }
    }
}

fn publish_state<T: Transport>(
    machine: &ConnectionMachine<T>,
    state_tx: &watch::Sender<ConnectionState>,
) {
    let next = machine.state();
    state_tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
