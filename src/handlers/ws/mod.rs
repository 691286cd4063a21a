//! Client WebSocket endpoint
//!
//! # Handshake
//!
//! The client offers the shared secret as a `Sec-WebSocket-Protocol` value.
//! A match selects that subprotocol and opens a session; anything else is
//! closed with 1008 "Invalid API key".
//!
//! # Protocol
//!
//! ## Client → Server
//!
//! - Raw base64 PCM s16le mono, as text or binary frames
//!
//! ## Server → Client
//!
//! - **media**: Assistant audio `{"event":"media","data":...,"sample_rate":...}`
//! - **stop**: Discard buffered playback `{"event":"stop"}`
//! - **transcript**: Finalized user or assistant utterance
//! - **close**: 1000 on a clean end, 1011 on a pipeline fault

pub mod auth;
mod handler;

pub use auth::{authorize_subprotocol, offered_subprotocols};
pub use handler::ws_handler;
