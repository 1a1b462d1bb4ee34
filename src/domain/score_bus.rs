//! Broadcast channel for inbound score messages.
//!
//! [`ScoreBus`] wraps a [`tokio::sync::broadcast`] channel. The connection
//! publishes every accepted `MESSAGE` frame through the bus, and each
//! observer holds its own [`ScoreFeed`].

use tokio::sync::broadcast;

use super::InboundMessage;

/// Broadcast bus for [`InboundMessage`]s.
///
/// When the ring buffer is full, the oldest messages are dropped for
/// lagging receivers.
#[derive(Debug, Clone)]
pub struct ScoreBus {
    sender: broadcast::Sender<InboundMessage>,
}

impl ScoreBus {
    /// Creates a new `ScoreBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes a message to all current feeds.
    ///
    /// Returns the number of feeds that received it. Without feeds the
    /// message is dropped.
    pub fn publish(&self, message: InboundMessage) -> usize {
        self.sender.send(message).unwrap_or(0)
    }

    /// Creates a feed that yields every message published from now on.
    #[must_use]
    pub fn subscribe(&self) -> ScoreFeed {
        ScoreFeed {
            receiver: self.sender.subscribe(),
        }
    }
}

/// One observer's view of the [`ScoreBus`].
#[derive(Debug)]
pub struct ScoreFeed {
    receiver: broadcast::Receiver<InboundMessage>,
}

impl ScoreFeed {
    /// Waits for the next message.
    ///
    /// Skips over messages lost to lag. Returns `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<InboundMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "score feed lagged behind bus");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns a message if one is ready, without waiting.
    pub fn try_next(&mut self) -> Option<InboundMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => return Some(message),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "score feed lagged behind bus");
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::ScoreResponse;
    use chrono::Utc;

    fn make_message(text: &str) -> InboundMessage {
        InboundMessage {
            topic: "/list/score".to_string(),
            body: ScoreResponse {
                message: text.to_string(),
                name: None,
                score: None,
                time: None,
            },
            received_at: Utc::now(),
        }
    }

    #[test]
    fn publish_without_feeds_returns_zero() {
        let bus = ScoreBus::new(16);
        assert_eq!(bus.publish(make_message("WORD=SOL;TIME=5")), 0);
    }

    #[tokio::test]
    async fn every_feed_receives_the_message() {
        let bus = ScoreBus::new(16);
        let mut feed1 = bus.subscribe();
        let mut feed2 = bus.subscribe();

        assert_eq!(bus.publish(make_message("WORD=SOL;TIME=5")), 2);

        let Some(m1) = feed1.next().await else {
            panic!("feed1 got nothing");
        };
        let Some(m2) = feed2.next().await else {
            panic!("feed2 got nothing");
        };
        assert_eq!(m1.body.message, "WORD=SOL;TIME=5");
        assert_eq!(m1, m2);
    }

    #[tokio::test]
    async fn late_feed_sees_only_future_messages() {
        let bus = ScoreBus::new(16);
        let _early = bus.subscribe();
        bus.publish(make_message("first"));

        let mut late = bus.subscribe();
        assert!(late.try_next().is_none());
        bus.publish(make_message("second"));
        let Some(m) = late.next().await else {
            panic!("late feed got nothing");
        };
        assert_eq!(m.body.message, "second");
    }

    #[tokio::test]
    async fn lagging_feed_skips_to_retained_messages() {
        let bus = ScoreBus::new(2);
        let mut feed = bus.subscribe();
        for text in ["a", "b", "c"] {
            bus.publish(make_message(text));
        }
        let Some(m) = feed.next().await else {
            panic!("feed got nothing");
        };
        assert_eq!(m.body.message, "b");
    }

    #[test]
    fn dropped_feed_stops_counting() {
        let bus = ScoreBus::new(4);
        let feed = bus.subscribe();
        assert_eq!(bus.publish(make_message("a")), 1);
        drop(feed);
        assert_eq!(bus.publish(make_message("b")), 0);
    }
}
