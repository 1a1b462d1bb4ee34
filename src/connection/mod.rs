//! Broker connection: STOMP session state machine and its driver task.
//!
//! [`ConnectionMachine`] holds every rule about handshakes, subscriptions,
//! heart-beats and reconnection, and never blocks. [`Connection`] runs a
//! machine on its own task and is the handle the rest of the client uses.

pub mod handle;
pub mod machine;
pub mod state;
pub mod subscription;

use std::time::Duration;

use crate::stomp::HeartBeat;

pub use handle::Connection;
pub use machine::ConnectionMachine;
pub use state::{ConnectionEvent, ConnectionState, ConnectionStats};
pub use subscription::{Subscription, SubscriptionRegistry};

/// Default pause before a reconnect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// Handshake window used when incoming heart-beats are disabled.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default heart-beat request, milliseconds in both directions.
pub const DEFAULT_HEART_BEAT: HeartBeat = HeartBeat::from_millis(10_000, 10_000);

/// Default capacity of the inbound score bus.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Settings for one [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Broker endpoint, `ws://host/path` or `wss://host/path`.
    pub url: String,
    /// Value of the `host` header sent in `CONNECT`.
    pub host: String,
    /// Heart-beats requested from the broker.
    pub heart_beat: HeartBeat,
    /// Pause before reconnecting after a loss. Zero disables reconnection.
    pub reconnect_delay: Duration,
    /// Handshake window used when incoming heart-beats are disabled.
    pub handshake_timeout: Duration,
    /// Capacity of the inbound score bus.
    pub bus_capacity: usize,
}

impl ConnectionConfig {
    /// Creates a configuration for `url` with default timings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            host: host_of(&url).to_owned(),
            url,
            heart_beat: DEFAULT_HEART_BEAT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }

    /// Sets the requested heart-beats.
    #[must_use]
    pub fn with_heart_beat(mut self, heart_beat: HeartBeat) -> Self {
        self.heart_beat = heart_beat;
        self
    }

    /// Sets the reconnect delay. Zero disables reconnection.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the handshake window used without incoming heart-beats.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the score bus capacity. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity.max(1);
        self
    }

    /// How long to wait for the stream to open, and again for `CONNECTED`:
    /// the requested incoming heart-beat interval, or
    /// [`Self::handshake_timeout`] when that is zero.
    #[must_use]
    pub fn handshake_window(&self) -> Duration {
        if self.heart_beat.incoming.is_zero() {
            self.handshake_timeout
        } else {
            self.heart_beat.incoming
        }
    }
}

/// Authority part of a URL: `ws://a:9090/websocket` → `a:9090`.
fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split(['/', '?', '#']).next().unwrap_or(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_taken_from_url() {
        assert_eq!(ConnectionConfig::new("ws://localhost:9090/websocket").host, "localhost:9090");
        assert_eq!(ConnectionConfig::new("wss://score.example").host, "score.example");
    }

    #[test]
    fn handshake_window_follows_incoming_heart_beat() {
        let cfg = ConnectionConfig::new("ws://h/ws").with_heart_beat(HeartBeat::from_millis(0, 4_000));
        assert_eq!(cfg.handshake_window(), Duration::from_secs(4));
        let cfg = cfg.with_heart_beat(HeartBeat::DISABLED);
        assert_eq!(cfg.handshake_window(), DEFAULT_HANDSHAKE_TIMEOUT);
    }

    #[test]
    fn bus_capacity_is_clamped() {
        assert_eq!(ConnectionConfig::new("ws://h/ws").with_bus_capacity(0).bus_capacity, 1);
    }
}
