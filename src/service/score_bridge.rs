//! Score bridge: turns game events into score publications.

use serde::Serialize;

use crate::connection::Connection;
use crate::domain::{GameEvent, ScoreFeed, ScoreMessage};
use crate::error::ClientError;

/// Publishes game progress to the scoring service and exposes its
/// broadcasts.
///
/// Publication never fails from the caller's point of view: a message
/// that cannot be sent is logged and dropped, and the return value says
/// whether the frame reached the transport.
#[derive(Debug, Clone)]
pub struct ScoreBridge {
    connection: Connection,
    destination: String,
}

impl ScoreBridge {
    /// Creates a bridge publishing to `destination` over `connection`.
    #[must_use]
    pub fn new(connection: Connection, destination: impl Into<String>) -> Self {
        Self {
            connection,
            destination: destination.into(),
        }
    }

    /// Returns the underlying connection.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Destination scores are published to.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Publishes `WORD=<word>;TIME=<seconds>`.
    pub async fn publish_word_found(&self, word: &str, elapsed_secs: u64) -> bool {
        self.publish_message(&ScoreMessage::word_found(word, elapsed_secs))
            .await
    }

    /// Publishes `GAME=SOLVED;TIME=<seconds>`.
    pub async fn publish_game_solved(&self, elapsed_secs: u64) -> bool {
        self.publish_message(&ScoreMessage::game_solved(elapsed_secs))
            .await
    }

    /// Publishes the score message for a game event.
    pub async fn publish_event(&self, event: &GameEvent) -> bool {
        self.publish_message(&event.to_score_message()).await
    }

    /// Publishes any JSON body, such as a [`ScoreMessage`] or a
    /// `{name, score, time}` record.
    pub async fn publish_message<B: Serialize + ?Sized>(&self, body: &B) -> bool {
        match self.connection.publish(&self.destination, body).await {
            Ok(()) => true,
            Err(e @ ClientError::NotConnected { .. }) => {
                tracing::warn!(destination = %self.destination, error = %e, "score dropped");
                false
            }
            Err(e) => {
                tracing::warn!(
                    destination = %self.destination,
                    code = e.error_code(),
                    error = %e,
                    "score publish failed"
                );
                false
            }
        }
    }

    /// Feed of score broadcasts received from now on.
    #[must_use]
    pub fn on_score_broadcast(&self) -> ScoreFeed {
        self.connection.scores()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::connection::{ConnectionConfig, ConnectionState};
    use crate::stomp::HeartBeat;
    use crate::transport::MemoryTransport;

    fn bridge() -> (ScoreBridge, MemoryTransport) {
        let remote = MemoryTransport::new();
        let config = ConnectionConfig::new("ws://localhost:9090/websocket")
            .with_heart_beat(HeartBeat::DISABLED);
        let connection = Connection::spawn(config, remote.clone(), true);
        (ScoreBridge::new(connection, "/app/score"), remote)
    }

    async fn open(bridge: &ScoreBridge, remote: &MemoryTransport) {
        tokio_test::assert_ok!(bridge.connection().subscribe("/list/score").await);
        tokio_test::assert_ok!(bridge.connection().connect().await);
        assert!(remote.accept());
        assert!(remote.deliver("CONNECTED\nversion:1.2\n\n\u{0}"));
        tokio_test::assert_ok!(
            bridge
                .connection()
                .wait_for_state(ConnectionState::Open)
                .await
        );
        remote.take_sent();
    }

    #[tokio::test(start_paused = true)]
    async fn word_found_is_dropped_while_disconnected() {
        let (bridge, remote) = bridge();
        assert!(!bridge.publish_word_found("GATO", 12).await);
        assert!(remote.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn word_found_and_solved_bodies() {
        let (bridge, remote) = bridge();
        open(&bridge, &remote).await;

        assert!(bridge.publish_word_found("GATO", 12).await);
        assert!(bridge.publish_game_solved(95).await);
        let sent = remote.take_sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|f| f.starts_with("SEND\ndestination:/app/score\n")));
        assert!(sent.first().is_some_and(|f| f.ends_with("{\"message\":\"WORD=GATO;TIME=12\"}\u{0}")));
        assert!(sent.get(1).is_some_and(|f| f.ends_with("{\"message\":\"GAME=SOLVED;TIME=95\"}\u{0}")));
    }

    #[tokio::test(start_paused = true)]
    async fn game_events_map_to_messages() {
        let (bridge, remote) = bridge();
        open(&bridge, &remote).await;

        let mut game = crate::domain::WordSearchGame::new(["SOL"]);
        let events = game.mark_found("sol", Duration::from_secs(7));
        for event in &events {
            assert!(bridge.publish_event(event).await);
        }
        let sent = remote.take_sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.last().is_some_and(|f| f.contains("GAME=SOLVED;TIME=7")));
    }

    #[tokio::test(start_paused = true)]
    async fn record_bodies_are_published_as_is() {
        let (bridge, remote) = bridge();
        assert!(!bridge.publish_message(&serde_json::json!({"name": "Tester"})).await);
        open(&bridge, &remote).await;

        let record = serde_json::json!({"name": "Tester", "score": 100, "time": 12_345});
        assert!(bridge.publish_message(&record).await);
        let sent = remote.take_sent();
        assert_eq!(sent.len(), 1);
        assert!(sent.first().is_some_and(|f| f.ends_with(
            "\n\n{\"name\":\"Tester\",\"score\":100,\"time\":12345}\u{0}"
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_feed_only_sees_future_messages() {
        let (bridge, remote) = bridge();
        open(&bridge, &remote).await;
        let broadcast = "MESSAGE\nsubscription:sub-1\ndestination:/list/score\n\n{\"message\":\"WORD=MAR;TIME=3\"}\u{0}";

        let mut early = bridge.on_score_broadcast();
        assert!(remote.deliver(broadcast));
        let Some(first) = early.next().await else {
            panic!("feed closed");
        };
        assert_eq!(first.body.field("WORD"), Some("MAR"));

        let mut late = bridge.on_score_broadcast();
        assert!(late.try_next().is_none());
    }
}
