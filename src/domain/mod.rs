//! Domain layer: score payloads, the inbound score bus, and game progress.

pub mod game;
pub mod score;
pub mod score_bus;

pub use game::{GameEvent, WordSearchGame};
pub use score::{InboundMessage, ScoreMessage, ScoreResponse};
pub use score_bus::{ScoreBus, ScoreFeed};
