//! STOMP session state machine.
//!
//! ```text
//!  Idle ──connect──▶ Connecting ──Opened──▶ Handshaking ──CONNECTED──▶ Open
//!                        ▲                       │                       │
//!                        │ timer        loss / timeout          loss / missed heart-beat
//!                        │                       ▼                       │
//!                        └──────────────── Reconnecting ◀────────────────┘
//!
//!  disconnect: Connecting | Handshaking | Open ──▶ Closing ──▶ Closed
//!              Reconnecting ──▶ Closed (timer cancelled)
//! ```
//!
//! The machine performs no waiting of its own. Time is passed in by the
//! caller, and [`ConnectionMachine::next_deadline`] tells the driver when
//! [`ConnectionMachine::on_tick`] must run next.

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use uuid::Uuid;

use super::state::{ConnectionEvent, ConnectionState, ConnectionStats};
use super::subscription::SubscriptionRegistry;
use super::ConnectionConfig;
use crate::domain::{InboundMessage, ScoreBus, ScoreResponse};
use crate::error::ClientError;
use crate::stomp::{Command, Frame, HeartBeat, Inbound, decode_stream};
use crate::transport::{EventSink, Transport, TransportEvent, TransportEventKind};

/// Silence tolerated on an open session, as a multiple of the negotiated
/// incoming heart-beat interval.
const HEART_BEAT_GRACE: u32 = 2;

/// Capacity of the connection notification channel.
const NOTIFICATION_CAPACITY: usize = 64;

/// Outgoing heart-beat: a single EOL.
const HEART_BEAT_EOL: &str = "\n";

/// The connection core. Owns the transport exclusively.
#[derive(Debug)]
pub struct ConnectionMachine<T> {
    config: ConnectionConfig,
    transport: T,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    session_id: Uuid,
    state: ConnectionState,
    interactive: bool,
    /// Incremented on every `open`; events from older streams are ignored.
    epoch: u64,
    subscriptions: SubscriptionRegistry,
    /// Negotiated on `CONNECTED`, disabled otherwise.
    heart_beat: HeartBeat,
    reconnect_at: Option<Instant>,
    handshake_deadline: Option<Instant>,
    last_inbound: Instant,
    last_outbound: Instant,
    reconnect_attempt: u32,
    stats: ConnectionStats,
    bus: ScoreBus,
    notifications: broadcast::Sender<ConnectionEvent>,
}

impl<T: Transport> ConnectionMachine<T> {
    /// Creates a machine in `Idle` and the receiver its transport events
    /// arrive on.
    ///
    /// With `interactive` false the machine refuses to connect until
    /// [`Self::set_interactive`] enables it.
    #[must_use]
    pub fn new(
        config: ConnectionConfig,
        transport: T,
        interactive: bool,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let now = Instant::now();
        let machine = Self {
            bus: ScoreBus::new(config.bus_capacity),
            config,
            transport,
            transport_tx,
            session_id: Uuid::new_v4(),
            state: ConnectionState::Idle,
            interactive,
            epoch: 0,
            subscriptions: SubscriptionRegistry::new(),
            heart_beat: HeartBeat::DISABLED,
            reconnect_at: None,
            handshake_deadline: None,
            last_inbound: now,
            last_outbound: now,
            reconnect_attempt: 0,
            stats: ConnectionStats::default(),
            notifications,
        };
        (machine, transport_rx)
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Counters since creation.
    #[must_use]
    pub const fn stats(&self) -> ConnectionStats {
        self.stats
    }

    /// Random id used to correlate this connection's log lines.
    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Epoch of the current transport stream.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Heart-beats negotiated for the open session.
    #[must_use]
    pub const fn heart_beat(&self) -> HeartBeat {
        self.heart_beat
    }

    /// Whether `connect` may leave `Idle`.
    #[must_use]
    pub const fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Id of the subscription live on this session.
    #[must_use]
    pub fn active_subscription(&self) -> Option<&str> {
        self.subscriptions.active_id()
    }

    /// Bus that inbound score messages are published on.
    #[must_use]
    pub const fn bus(&self) -> &ScoreBus {
        &self.bus
    }

    /// Sender of connection notifications; subscribe to observe them.
    #[must_use]
    pub fn notifier(&self) -> broadcast::Sender<ConnectionEvent> {
        self.notifications.clone()
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Enables or disables connecting.
    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    /// Starts connecting.
    ///
    /// A no-op while `Connecting`, `Handshaking` or `Open`. From
    /// `Reconnecting` the pending timer is cancelled and the attempt starts
    /// now.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotInteractive`] if no interactive environment
    /// is available; the state does not change.
    pub fn connect(&mut self, now: Instant) -> Result<(), ClientError> {
        if self.state.is_active() {
            tracing::debug!(session = %self.session_id, state = %self.state, "connect ignored");
            return Ok(());
        }
        if !self.interactive {
            tracing::debug!(session = %self.session_id, "connect refused: not interactive");
            return Err(ClientError::NotInteractive);
        }
        if self.state != ConnectionState::Reconnecting {
            self.reconnect_attempt = 0;
        }
        self.reconnect_at = None;
        self.open_transport(now);
        Ok(())
    }

    /// Tears the session down. Always honoured, never fails.
    ///
    /// Sends `DISCONNECT` when the transport is still writable and cancels
    /// any pending reconnect. A no-op from `Idle` and `Closed`.
    pub fn disconnect(&mut self, now: Instant) {
        match self.state {
            ConnectionState::Idle | ConnectionState::Closed => {
                tracing::debug!(session = %self.session_id, state = %self.state, "disconnect ignored");
                return;
            }
            ConnectionState::Reconnecting => {
                self.reconnect_at = None;
            }
            ConnectionState::Connecting
            | ConnectionState::Handshaking
            | ConnectionState::Open
            | ConnectionState::Closing => {
                self.transition(ConnectionState::Closing);
                if self.transport.is_writable()
                    && let Err(e) = self.send_frame(&Frame::disconnect(), now)
                {
                    tracing::debug!(session = %self.session_id, error = %e, "DISCONNECT not sent");
                }
                self.transport.close();
            }
        }
        self.reset_session();
        self.transition(ConnectionState::Closed);
        self.notify(ConnectionEvent::Disconnected);
    }

    /// Publishes `body` as JSON to `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] unless the session is `Open`;
    /// nothing is written or queued in that case.
    /// Returns [`ClientError::Serialization`] if `body` does not serialize,
    /// or [`ClientError::Transport`] if the write fails.
    pub fn publish<B: Serialize + ?Sized>(
        &mut self,
        destination: &str,
        body: &B,
        now: Instant,
    ) -> Result<(), ClientError> {
        self.ensure_open()?;
        let json = serde_json::to_string(body)?;
        self.publish_json(destination, json, now)
    }

    /// Publishes an already serialized JSON body to `destination`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::publish`], minus serialization.
    pub fn publish_json(
        &mut self,
        destination: &str,
        json: String,
        now: Instant,
    ) -> Result<(), ClientError> {
        self.ensure_open()?;
        self.send_frame(&Frame::send(destination, json), now)?;
        tracing::debug!(session = %self.session_id, %destination, "score published");
        Ok(())
    }

    /// Registers `topic` as the subscription to keep.
    ///
    /// On an open session the previous subscription is dropped and the new
    /// one issued immediately; otherwise it is issued after the next
    /// handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if a frame cannot be written.
    pub fn subscribe(&mut self, topic: &str, now: Instant) -> Result<(), ClientError> {
        if self.subscriptions.topic() == Some(topic) && self.subscriptions.active_id().is_some() {
            return Ok(());
        }
        let previous = self.subscriptions.register(topic);
        if self.state != ConnectionState::Open {
            return Ok(());
        }
        if let Some(id) = previous {
            self.send_frame(&Frame::unsubscribe(&id), now)?;
        }
        self.issue_subscription(now)
    }

    /// Forgets the registered topic, unsubscribing on an open session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if `UNSUBSCRIBE` cannot be written.
    pub fn unsubscribe(&mut self, now: Instant) -> Result<(), ClientError> {
        match self.subscriptions.clear() {
            Some(id) if self.state == ConnectionState::Open => {
                self.send_frame(&Frame::unsubscribe(&id), now)
            }
            _ => Ok(()),
        }
    }

    // ── Inputs ──────────────────────────────────────────────────────

    /// Feeds one transport event. Events from older streams are dropped.
    pub fn handle_transport_event(&mut self, event: TransportEvent, now: Instant) {
        if event.epoch != self.epoch {
            tracing::trace!(session = %self.session_id, stale = event.epoch, current = self.epoch, "stale transport event");
            return;
        }
        match event.kind {
            TransportEventKind::Opened => {
                if self.state == ConnectionState::Connecting {
                    self.on_opened(now);
                } else {
                    tracing::debug!(session = %self.session_id, state = %self.state, "unexpected Opened");
                }
            }
            TransportEventKind::Message(raw) => self.on_raw(&raw, now),
            TransportEventKind::Error(message) => {
                tracing::warn!(session = %self.session_id, epoch = self.epoch, error = %message, "transport error");
                self.notify(ConnectionEvent::TransportError { message });
            }
            TransportEventKind::Closed => {
                if self.state.is_active() {
                    let reason = if self.state == ConnectionState::Connecting {
                        ClientError::TransportOpen("stream closed before opening".to_owned())
                            .to_string()
                    } else {
                        "transport closed".to_owned()
                    };
                    self.lose_link(now, &reason);
                }
            }
        }
    }

    /// Runs timers that are due at `now`.
    pub fn on_tick(&mut self, now: Instant) {
        if let Some(at) = self.reconnect_at
            && now >= at
        {
            self.reconnect_at = None;
            tracing::info!(session = %self.session_id, attempt = self.reconnect_attempt, "reconnecting");
            self.open_transport(now);
            return;
        }

        if self.is_establishing()
            && let Some(deadline) = self.handshake_deadline
            && now >= deadline
        {
            let err = ClientError::HandshakeTimeout {
                waited_ms: u64::try_from(self.config.handshake_window().as_millis())
                    .unwrap_or(u64::MAX),
            };
            tracing::warn!(session = %self.session_id, state = %self.state, error = %err, "session not established in time");
            self.lose_link(now, &err.to_string());
            return;
        }

        if self.state != ConnectionState::Open {
            return;
        }
        if let Some(deadline) = self.liveness_deadline()
            && now >= deadline
        {
            tracing::warn!(session = %self.session_id, "broker heart-beat missed");
            self.lose_link(now, "heart-beat missed");
            return;
        }
        if let Some(due) = self.heart_beat_due()
            && now >= due
        {
            match self.transport.send(HEART_BEAT_EOL.to_owned()) {
                Ok(()) => self.last_outbound = now,
                Err(e) => {
                    tracing::warn!(session = %self.session_id, error = %e, "heart-beat write failed");
                    self.lose_link(now, &e.to_string());
                }
            }
        }
    }

    /// Earliest instant at which [`Self::on_tick`] has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let mut deadlines = vec![self.reconnect_at];
        match self.state {
            ConnectionState::Connecting | ConnectionState::Handshaking => {
                deadlines.push(self.handshake_deadline);
            }
            ConnectionState::Open => {
                deadlines.push(self.liveness_deadline());
                deadlines.push(self.heart_beat_due());
            }
            _ => {}
        }
        deadlines.into_iter().flatten().min()
    }

    // ── Internals ───────────────────────────────────────────────────

    fn ensure_open(&mut self) -> Result<(), ClientError> {
        if self.state == ConnectionState::Open {
            return Ok(());
        }
        self.stats.publishes_rejected += 1;
        let err = ClientError::NotConnected { state: self.state };
        tracing::warn!(session = %self.session_id, error = %err, code = err.error_code(), "publish rejected");
        Err(err)
    }

    fn open_transport(&mut self, now: Instant) {
        self.epoch += 1;
        self.transition(ConnectionState::Connecting);
        // Covers a stream that never opens; restarted once it does.
        self.handshake_deadline = Some(now + self.config.handshake_window());
        let sink = EventSink::new(self.epoch, self.transport_tx.clone());
        if let Err(e) = self.transport.open(&self.config.url, sink) {
            tracing::warn!(session = %self.session_id, url = %self.config.url, error = %e, code = e.error_code(), "transport open failed");
            self.lose_link(now, &e.to_string());
        }
    }

    fn on_opened(&mut self, now: Instant) {
        let frame = Frame::connect(&self.config.host, self.config.heart_beat);
        match self.send_frame(&frame, now) {
            Ok(()) => {
                self.transition(ConnectionState::Handshaking);
                self.handshake_deadline = Some(now + self.config.handshake_window());
            }
            Err(e) => {
                tracing::warn!(session = %self.session_id, error = %e, "CONNECT not sent");
                self.lose_link(now, &e.to_string());
            }
        }
    }

    fn on_raw(&mut self, raw: &str, now: Instant) {
        self.last_inbound = now;
        for unit in decode_stream(raw) {
            match unit {
                Ok(Inbound::HeartBeat) => {
                    tracing::trace!(session = %self.session_id, "heart-beat received");
                }
                Ok(Inbound::Frame(frame)) => {
                    self.stats.frames_received += 1;
                    self.on_frame(&frame, now);
                }
                Err(e) => {
                    self.stats.decode_errors += 1;
                    let err = ClientError::from(e);
                    tracing::warn!(session = %self.session_id, error = %err, "discarding malformed frame");
                }
            }
        }
    }

    fn on_frame(&mut self, frame: &Frame, now: Instant) {
        match (self.state, frame.command) {
            (ConnectionState::Handshaking, Command::Connected) => self.on_connected(frame, now),
            (ConnectionState::Open, Command::Message) => self.on_message(frame),
            (_, Command::Error) => {
                tracing::warn!(
                    session = %self.session_id,
                    error_message = frame.header("message").unwrap_or_default(),
                    body = %frame.body,
                    "broker sent ERROR"
                );
            }
            (state, command) => {
                tracing::debug!(session = %self.session_id, %state, %command, "discarding frame");
            }
        }
    }

    fn on_connected(&mut self, frame: &Frame, now: Instant) {
        let server = match frame.header("heart-beat").map(HeartBeat::parse).transpose() {
            Ok(server) => server.unwrap_or(HeartBeat::DISABLED),
            Err(e) => {
                tracing::warn!(session = %self.session_id, error = %e, "ignoring broker heart-beat header");
                HeartBeat::DISABLED
            }
        };
        self.heart_beat = HeartBeat::negotiate(self.config.heart_beat, server);
        self.handshake_deadline = None;
        self.reconnect_attempt = 0;
        self.transition(ConnectionState::Open);
        tracing::info!(
            session = %self.session_id,
            outgoing_ms = self.heart_beat.outgoing.as_millis(),
            incoming_ms = self.heart_beat.incoming.as_millis(),
            "session established"
        );
        self.notify(ConnectionEvent::Connected {
            session: frame.header("session").map(str::to_owned),
            server: frame.header("server").map(str::to_owned),
        });
        if let Err(e) = self.issue_subscription(now) {
            tracing::warn!(session = %self.session_id, error = %e, "SUBSCRIBE not sent");
            self.lose_link(now, &e.to_string());
        }
    }

    fn on_message(&mut self, frame: &Frame) {
        let Some(subscription) = frame.header("subscription") else {
            tracing::debug!(session = %self.session_id, "discarding MESSAGE without subscription");
            return;
        };
        if !self.subscriptions.matches(subscription) {
            tracing::debug!(session = %self.session_id, %subscription, "discarding MESSAGE for inactive subscription");
            return;
        }
        let body = match frame.json_body::<ScoreResponse>() {
            Ok(body) => body,
            Err(e) => {
                self.stats.decode_errors += 1;
                tracing::warn!(session = %self.session_id, error = %e, "discarding undecodable score body");
                return;
            }
        };
        let topic = frame
            .header("destination")
            .or(self.subscriptions.topic())
            .unwrap_or_default()
            .to_owned();
        self.stats.messages_delivered += 1;
        let receivers = self.bus.publish(InboundMessage {
            topic,
            body,
            received_at: Utc::now(),
        });
        tracing::debug!(session = %self.session_id, %subscription, receivers, "score delivered");
    }

    fn issue_subscription(&mut self, now: Instant) -> Result<(), ClientError> {
        let Some(sub) = self.subscriptions.activate() else {
            return Ok(());
        };
        self.send_frame(&Frame::subscribe(&sub.id, &sub.topic), now)?;
        tracing::info!(session = %self.session_id, subscription = %sub.id, topic = %sub.topic, "subscribed");
        Ok(())
    }

    fn send_frame(&mut self, frame: &Frame, now: Instant) -> Result<(), ClientError> {
        self.transport.send(frame.encode())?;
        self.last_outbound = now;
        self.stats.frames_sent += 1;
        Ok(())
    }

    /// Unexpected loss while connecting, handshaking or open.
    fn lose_link(&mut self, now: Instant, reason: &str) {
        self.transport.close();
        self.reset_session();
        self.notify(ConnectionEvent::Lost {
            reason: reason.to_owned(),
        });

        let delay = self.config.reconnect_delay;
        if delay.is_zero() {
            self.transition(ConnectionState::Closed);
            return;
        }
        self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
        self.stats.reconnect_attempts += 1;
        self.reconnect_at = Some(now + delay);
        self.transition(ConnectionState::Reconnecting);
        tracing::info!(
            session = %self.session_id,
            attempt = self.reconnect_attempt,
            delay_ms = delay.as_millis(),
            %reason,
            "reconnect scheduled"
        );
        self.notify(ConnectionEvent::ReconnectScheduled {
            attempt: self.reconnect_attempt,
            delay,
        });
    }

    /// Drops everything that only lives as long as one session.
    const fn is_establishing(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Handshaking
        )
    }

    fn reset_session(&mut self) {
        self.subscriptions.invalidate();
        self.heart_beat = HeartBeat::DISABLED;
        self.handshake_deadline = None;
    }

    fn liveness_deadline(&self) -> Option<Instant> {
        let incoming = self.heart_beat.incoming;
        (!incoming.is_zero()).then(|| self.last_inbound + incoming * HEART_BEAT_GRACE)
    }

    fn heart_beat_due(&self) -> Option<Instant> {
        let outgoing = self.heart_beat.outgoing;
        (!outgoing.is_zero()).then(|| self.last_outbound + outgoing)
    }

    fn transition(&mut self, to: ConnectionState) {
        if self.state != to {
            tracing::info!(session = %self.session_id, from = %self.state, %to, epoch = self.epoch, "connection state changed");
            self.state = to;
        }
    }

    fn notify(&self, event: ConnectionEvent) {
        // No listeners is fine.
        let _ = self.notifications.send(event);
    }
}
