//! Adapter for engines speaking the realtime WebSocket event protocol.
//!
//! Audio in both directions is base64 PCM16 mono at 24 kHz. Turn ending is
//! left to the engine's server-side detection; barge-in is decided by the
//! bridge and sent as `response.cancel`.

mod client;
mod config;
mod messages;

pub use client::RealtimeEngine;
pub use config::RealtimeVoice;
pub use messages::{ClientEvent, ConversationItem, ServerEvent, SessionConfig, ToolDef};

/// PCM16 rate used by the realtime protocol in both directions.
pub const REALTIME_SAMPLE_RATE: u32 = 24000;

/// Model requested when none is configured.
pub const REALTIME_DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";
