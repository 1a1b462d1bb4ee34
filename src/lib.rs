//! # sopa-client
//!
//! Real-time score client for the Sopa de Letras word-search game.
//!
//! The game publishes each found word and the solved puzzle to a scoring
//! service over STOMP 1.2 on a WebSocket, and shows the scores the service
//! broadcasts to every player. Connections recover from link loss on
//! their own; an explicit disconnect always wins over a pending
//! reconnect.
//!
//! ## Architecture
//!
//! ```text
//! Game (WordSearchGame)
//!     │
//!     ├── ScoreBridge / RankingClient (service/)
//!     │
//!     ├── Connection handle ──► connection task (connection/)
//!     │                             │
//!     │                             ├── ConnectionMachine
//!     │                             ├── STOMP codec (stomp/)
//!     │                             └── Transport (transport/)
//!     │
//!     └── ScoreBus ◄── MESSAGE frames (domain/)
//! ```

pub mod app_state;
pub mod config;
pub mod connection;
pub mod domain;
pub mod error;
pub mod service;
pub mod stomp;
pub mod transport;
