//! STOMP 1.2 message codec.
//!
//! Pure translation between application payloads and text frames. The
//! connection layer owns all state; nothing here performs I/O.

pub mod frame;
pub mod heartbeat;

pub use frame::{Command, DecodeError, Frame, Inbound, decode, decode_stream, encode};
pub use heartbeat::HeartBeat;
