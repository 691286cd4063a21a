//! Typed frames passed between pipeline stages.
//!
//! Frames are immutable values. A stage either forwards the frame it received
//! or produces a new one; nothing is modified in place.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::tools::ToolDeclaration;

/// Bytes per PCM s16le sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Which side of the bridge produced an audio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioDirection {
    /// Microphone audio from the client.
    Inbound,
    /// Synthesized audio from the engine.
    Outbound,
}

/// A chunk of PCM s16le audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub payload: Bytes,
    pub sample_rate: u32,
    pub channels: u16,
    pub direction: AudioDirection,
}

impl AudioFrame {
    pub fn new(payload: Bytes, sample_rate: u32, channels: u16, direction: AudioDirection) -> Self {
        Self {
            payload,
            sample_rate,
            channels,
            direction,
        }
    }

    /// Mono inbound frame.
    pub fn inbound(payload: Bytes, sample_rate: u32) -> Self {
        Self::new(payload, sample_rate, 1, AudioDirection::Inbound)
    }

    /// Mono outbound frame.
    pub fn outbound(payload: Bytes, sample_rate: u32) -> Self {
        Self::new(payload, sample_rate, 1, AudioDirection::Outbound)
    }

    /// Samples per channel.
    pub fn sample_count(&self) -> usize {
        self.payload.len() / BYTES_PER_SAMPLE / self.channels.max(1) as usize
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.sample_count() as u64 * 1000) / self.sample_rate as u64
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Start,
    Stop,
    Interruption,
}

/// Conversation participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finalized utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFrame {
    pub role: Role,
    pub content: String,
    /// RFC 3339 UTC timestamp taken when the utterance was received.
    pub timestamp: String,
}

impl TranscriptFrame {
    pub fn new(role: Role, content: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Transcript stamped with the current time.
    pub fn now(role: Role, content: impl Into<String>) -> Self {
        Self::new(role, content, now_rfc3339())
    }
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

impl ContextMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Snapshot of the conversation handed to the engine.
#[derive(Debug, Clone)]
pub struct ContextFrame {
    pub messages: Vec<ContextMessage>,
    pub tools: Arc<[ToolDeclaration]>,
}

impl ContextFrame {
    /// Concatenated system messages, in order.
    pub fn system_instruction(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    /// Non-system messages, in order.
    pub fn turns(&self) -> impl Iterator<Item = &ContextMessage> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }
}

#[derive(Debug, Clone)]
pub enum Frame {
    Audio(AudioFrame),
    Control(ControlKind),
    Transcript(TranscriptFrame),
    Context(ContextFrame),
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_frame_sample_count() {
        let frame = AudioFrame::inbound(Bytes::from(vec![0u8; 640]), 16000);
        assert_eq!(frame.sample_count(), 320);
        assert_eq!(frame.duration_ms(), 20);
        assert_eq!(frame.channels, 1);
        assert_eq!(frame.direction, AudioDirection::Inbound);
    }

    #[test]
    fn test_audio_frame_stereo_sample_count() {
        let frame = AudioFrame::new(
            Bytes::from(vec![0u8; 640]),
            16000,
            2,
            AudioDirection::Outbound,
        );
        assert_eq!(frame.sample_count(), 160);
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_transcript_now_is_rfc3339() {
        let frame = TranscriptFrame::now(Role::User, "hello");
        assert!(OffsetDateTime::parse(&frame.timestamp, &Rfc3339).is_ok());
    }

    #[test]
    fn test_context_system_instruction() {
        let ctx = ContextFrame {
            messages: vec![
                ContextMessage::new(Role::System, "be brief"),
                ContextMessage::new(Role::User, "hi"),
            ],
            tools: Arc::from(Vec::new()),
        };
        assert_eq!(ctx.system_instruction().as_deref(), Some("be brief"));
        assert_eq!(ctx.turns().count(), 1);
    }
}
