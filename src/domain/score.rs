//! Score payloads exchanged with the scoring service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outbound score body: one free-text `message` field.
///
/// Game events use the `KEY=VALUE;KEY=VALUE` convention, for example
/// `WORD=GATO;TIME=12`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreMessage {
    /// Free-text message.
    pub message: String,
}

impl ScoreMessage {
    /// Wraps an arbitrary message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// `WORD=<word>;TIME=<seconds>`.
    #[must_use]
    pub fn word_found(word: &str, elapsed_secs: u64) -> Self {
        Self::new(format!("WORD={word};TIME={elapsed_secs}"))
    }

    /// `GAME=SOLVED;TIME=<seconds>`.
    #[must_use]
    pub fn game_solved(elapsed_secs: u64) -> Self {
        Self::new(format!("GAME=SOLVED;TIME={elapsed_secs}"))
    }
}

/// Score record broadcast by the service and returned by the ranking
/// endpoint.
///
/// Only `message` is guaranteed; the service fills the other fields when
/// it knows them. A bare `{"message": ...}` body decodes with the rest
/// left as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResponse {
    /// Free-text message, same convention as [`ScoreMessage`].
    pub message: String,
    /// Player name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Accumulated score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    /// Elapsed time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
}

impl ScoreResponse {
    /// Returns the value of `key` in a `KEY=VALUE;...` message.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.message.split(';').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k.trim() == key).then_some(v.trim())
        })
    }
}

/// Score broadcast received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Destination header of the `MESSAGE` frame.
    pub topic: String,
    /// Decoded body.
    pub body: ScoreResponse,
    /// Local receive time.
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn word_found_format() {
        assert_eq!(ScoreMessage::word_found("GATO", 12).message, "WORD=GATO;TIME=12");
        assert_eq!(ScoreMessage::game_solved(90).message, "GAME=SOLVED;TIME=90");
    }

    #[test]
    fn bare_message_decodes_as_response() {
        let Ok(resp) = serde_json::from_str::<ScoreResponse>(r#"{"message":"WORD=SOL;TIME=5"}"#)
        else {
            panic!("expected a ScoreResponse");
        };
        assert_eq!(resp.message, "WORD=SOL;TIME=5");
        assert!(resp.name.is_none() && resp.score.is_none() && resp.time.is_none());
    }

    #[test]
    fn full_response_decodes() {
        let json = r#"{"message":"ok","name":"Tester","score":100,"time":12345}"#;
        let Ok(resp) = serde_json::from_str::<ScoreResponse>(json) else {
            panic!("expected a ScoreResponse");
        };
        assert_eq!(resp.name.as_deref(), Some("Tester"));
        assert_eq!(resp.score, Some(100));
        assert_eq!(resp.time, Some(12_345));
    }

    #[test]
    fn message_fields_are_addressable() {
        let resp = ScoreResponse {
            message: "WORD=SOL;TIME=5".to_owned(),
            name: None,
            score: None,
            time: None,
        };
        assert_eq!(resp.field("WORD"), Some("SOL"));
        assert_eq!(resp.field("TIME"), Some("5"));
        assert_eq!(resp.field("SCORE"), None);
    }

    #[test]
    fn outbound_serializes_to_single_field() {
        let Ok(json) = serde_json::to_string(&ScoreMessage::word_found("GATO", 12)) else {
            panic!("serialization failed");
        };
        assert_eq!(json, r#"{"message":"WORD=GATO;TIME=12"}"#);
    }
}
