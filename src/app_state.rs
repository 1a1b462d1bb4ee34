//! Shared application state handed to the game front end.

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::ClientError;
use crate::service::{RankingClient, ScoreBridge};
use crate::transport::{Transport, WebSocketTransport};

/// Everything the game needs to talk to the scoring service.
///
/// Cheap to clone; clones share the same connection.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Broker connection.
    pub connection: Connection,
    /// Publishes game progress and exposes score broadcasts.
    pub bridge: ScoreBridge,
    /// Reads the ranking table.
    pub ranking: RankingClient,
}

impl AppState {
    /// Wires a WebSocket-backed client from `config`.
    ///
    /// The score topic is registered but nothing is opened until
    /// [`Connection::connect`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectionClosed`] if the connection task
    /// stops before the topic is registered.
    pub async fn build(config: &ClientConfig) -> Result<Self, ClientError> {
        Self::with_transport(config, WebSocketTransport::new()).await
    }

    /// Same as [`Self::build`] over an arbitrary transport.
    ///
    /// # Errors
    ///
    /// See [`Self::build`].
    pub async fn with_transport<T: Transport>(
        config: &ClientConfig,
        transport: T,
    ) -> Result<Self, ClientError> {
        let connection = Connection::spawn(config.connection_config(), transport, config.interactive);
        connection.subscribe(&config.score_topic).await?;
        tracing::info!(
            session = %connection.session_id(),
            url = %config.websocket_url(),
            topic = %config.score_topic,
            "client ready"
        );
        Ok(Self {
            bridge: ScoreBridge::new(connection.clone(), config.score_destination.clone()),
            ranking: RankingClient::new(config.ranking_url()),
            connection,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use crate::transport::MemoryTransport;

    fn config() -> ClientConfig {
        let Ok(config) = ClientConfig::from_lookup(|key| match key {
            "HEARTBEAT_OUTGOING_MS" | "HEARTBEAT_INCOMING_MS" => Some("0".to_owned()),
            _ => None,
        }) else {
            panic!("config rejected");
        };
        config
    }

    #[tokio::test(start_paused = true)]
    async fn registered_topic_is_subscribed_on_connect() {
        let remote = MemoryTransport::new();
        let Ok(state) = AppState::with_transport(&config(), remote.clone()).await else {
            panic!("wiring failed");
        };
        assert_eq!(state.connection.state(), ConnectionState::Idle);
        assert_eq!(state.bridge.destination(), "/app/score");
        assert_eq!(state.ranking.url(), "http://localhost:9090/ranking/position");

        tokio_test::assert_ok!(state.connection.connect().await);
        assert_eq!(remote.last_url().as_deref(), Some("ws://localhost:9090/websocket"));
        assert!(remote.accept());
        assert!(remote.deliver("CONNECTED\nversion:1.2\n\n\u{0}"));
        tokio_test::assert_ok!(state.connection.wait_for_state(ConnectionState::Open).await);

        let Ok(stats) = state.connection.stats().await else {
            panic!("stats unavailable");
        };
        assert_eq!(stats.frames_sent, 2);
        assert!(remote
            .sent()
            .iter()
            .any(|f| f == "SUBSCRIBE\nid:sub-1\ndestination:/list/score\n\n\u{0}"));
    }
}
