//! Client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Every key has a default, so an empty
//! environment yields a client for a broker on `localhost:9090`.

use std::time::Duration;

use crate::connection::ConnectionConfig;
use crate::error::ClientError;
use crate::stomp::HeartBeat;

/// Top-level client configuration.
///
/// Loaded once at startup via [`ClientConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Broker authority, `host:port`.
    pub broker_host: String,

    /// Use `wss://` and `https://` instead of `ws://` and `http://`.
    pub broker_tls: bool,

    /// WebSocket endpoint path on the broker.
    pub broker_path: String,

    /// Topic score broadcasts arrive on.
    pub score_topic: String,

    /// Destination scores are published to.
    pub score_destination: String,

    /// Path of the ranking endpoint.
    pub ranking_path: String,

    /// Heart-beat the client offers to send, in milliseconds.
    pub heartbeat_outgoing_ms: u64,

    /// Heart-beat the client wants to receive, in milliseconds.
    pub heartbeat_incoming_ms: u64,

    /// Pause before reconnecting, in milliseconds (0 = never reconnect).
    pub reconnect_delay_ms: u64,

    /// Capacity of the inbound score bus.
    pub score_bus_capacity: usize,

    /// Whether connecting is allowed from the start.
    pub interactive: bool,
}

impl ClientConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] if a value is unusable.
    pub fn from_env() -> Result<Self, ClientError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which maps a key to its value.
    ///
    /// Missing or unparsable numbers and booleans fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] if the broker host is blank
    /// or a path does not start with `/`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        let config = Self {
            broker_host: text("BROKER_HOST", "localhost:9090").trim().to_owned(),
            broker_tls: parse_env_bool(&lookup, "BROKER_TLS", false),
            broker_path: text("BROKER_PATH", "/websocket"),
            score_topic: text("SCORE_TOPIC", "/list/score"),
            score_destination: text("SCORE_DESTINATION", "/app/score"),
            ranking_path: text("RANKING_PATH", "/ranking/position"),
            heartbeat_outgoing_ms: parse_env(&lookup, "HEARTBEAT_OUTGOING_MS", 10_000),
            heartbeat_incoming_ms: parse_env(&lookup, "HEARTBEAT_INCOMING_MS", 10_000),
            reconnect_delay_ms: parse_env(&lookup, "RECONNECT_DELAY_MS", 500),
            score_bus_capacity: parse_env(&lookup, "SCORE_BUS_CAPACITY", 256),
            interactive: parse_env_bool(&lookup, "INTERACTIVE", true),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ClientError> {
        if self.broker_host.is_empty() {
            return Err(ClientError::InvalidConfig("BROKER_HOST is empty".to_owned()));
        }
        for (key, path) in [
            ("BROKER_PATH", &self.broker_path),
            ("SCORE_TOPIC", &self.score_topic),
            ("SCORE_DESTINATION", &self.score_destination),
            ("RANKING_PATH", &self.ranking_path),
        ] {
            if !path.starts_with('/') {
                return Err(ClientError::InvalidConfig(format!(
                    "{key} must start with '/', got {path:?}"
                )));
            }
        }
        Ok(())
    }

    /// Broker WebSocket URL, e.g. `ws://localhost:9090/websocket`.
    #[must_use]
    pub fn websocket_url(&self) -> String {
        let scheme = if self.broker_tls { "wss" } else { "ws" };
        format!("{scheme}://{}{}", self.broker_host, self.broker_path)
    }

    /// Ranking URL, e.g. `http://localhost:9090/ranking/position`.
    #[must_use]
    pub fn ranking_url(&self) -> String {
        let scheme = if self.broker_tls { "https" } else { "http" };
        format!("{scheme}://{}{}", self.broker_host, self.ranking_path)
    }

    /// Settings for the broker connection.
    #[must_use]
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.websocket_url())
            .with_heart_beat(HeartBeat::from_millis(
                self.heartbeat_outgoing_ms,
                self.heartbeat_incoming_ms,
            ))
            .with_reconnect_delay(Duration::from_millis(self.reconnect_delay_ms))
            .with_bus_capacity(self.score_bus_capacity)
    }
}

/// Parses `key` as `T`, returning `default` on missing or invalid values.
fn parse_env<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses `key` as a boolean. Accepts `"true"`, `"1"`, `"false"`, `"0"`
/// (case-insensitive). Returns `default` otherwise.
fn parse_env_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<ClientConfig, ClientError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        ClientConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_point_at_local_broker() {
        let Ok(cfg) = load(&[]) else {
            panic!("defaults must be valid");
        };
        assert_eq!(cfg.websocket_url(), "ws://localhost:9090/websocket");
        assert_eq!(cfg.ranking_url(), "http://localhost:9090/ranking/position");
        assert_eq!(cfg.score_topic, "/list/score");
        assert_eq!(cfg.score_destination, "/app/score");
        assert!(cfg.interactive);

        let conn = cfg.connection_config();
        assert_eq!(conn.host, "localhost:9090");
        assert_eq!(conn.heart_beat, HeartBeat::from_millis(10_000, 10_000));
        assert_eq!(conn.reconnect_delay, Duration::from_millis(500));
        assert_eq!(conn.bus_capacity, 256);
    }

    #[test]
    fn tls_switches_both_schemes() {
        let Ok(cfg) = load(&[("BROKER_TLS", "TRUE"), ("BROKER_HOST", "score.example")]) else {
            panic!("valid config rejected");
        };
        assert_eq!(cfg.websocket_url(), "wss://score.example/websocket");
        assert_eq!(cfg.ranking_url(), "https://score.example/ranking/position");
    }

    #[test]
    fn bad_numbers_fall_back_to_defaults() {
        let Ok(cfg) = load(&[("RECONNECT_DELAY_MS", "soon"), ("HEARTBEAT_INCOMING_MS", "0")]) else {
            panic!("valid config rejected");
        };
        assert_eq!(cfg.reconnect_delay_ms, 500);
        assert_eq!(cfg.heartbeat_incoming_ms, 0);
    }

    #[test]
    fn blank_host_is_rejected() {
        let err = tokio_test::assert_err!(load(&[("BROKER_HOST", "  ")]));
        assert_eq!(err.error_code(), 5001);
    }

    #[test]
    fn relative_path_is_rejected() {
        assert!(matches!(
            load(&[("SCORE_TOPIC", "list/score")]),
            Err(ClientError::InvalidConfig(_))
        ));
    }

    #[test]
    fn interactive_can_be_turned_off() {
        let Ok(cfg) = load(&[("INTERACTIVE", "0")]) else {
            panic!("valid config rejected");
        };
        assert!(!cfg.interactive);
    }
}
