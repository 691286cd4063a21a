//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `ws` - Client voice session WebSocket

pub mod api;
pub mod ws;

pub use ws::ws_handler;
