//! Service layer: what the game talks to.
//!
//! [`ScoreBridge`] publishes game progress through a
//! [`crate::connection::Connection`] and exposes score broadcasts;
//! [`RankingClient`] reads the ranking table over HTTP.

pub mod ranking;
pub mod score_bridge;

pub use ranking::RankingClient;
pub use score_bridge::ScoreBridge;
