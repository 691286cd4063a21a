//! Wire codec for the browser connection.
//!
//! Outbound frames become JSON text messages keyed by `event`:
//!
//! ```json
//! {"event": "media", "data": "<base64 pcm>", "sample_rate": 16000, "channels": 1, "format": "pcm_s16le"}
//! {"event": "stop"}
//! {"event": "transcript", "role": "user", "content": "...", "timestamp": "..."}
//! ```
//!
//! Inbound messages carry raw base64 PCM s16le mono audio, as either a text or
//! a binary WebSocket message. Frames with no wire representation serialize to
//! `None`.

use base64::prelude::*;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::error;

use super::frames::{AudioFrame, BYTES_PER_SAMPLE, ControlKind, Frame, Role, TranscriptFrame};
use crate::errors::DecodeError;

/// Sample format tag carried on every media event.
pub const PCM_FORMAT: &str = "pcm_s16le";

/// Outbound JSON envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundEvent {
    Media {
        data: String,
        sample_rate: u32,
        channels: u16,
        format: String,
    },
    Stop,
    Transcript {
        role: Role,
        content: String,
        timestamp: String,
    },
}

/// Stateless apart from the client sample rate negotiated at setup.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolCodec {
    sample_rate: u32,
}

impl ProtocolCodec {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Produce the wire text for a frame, or `None` if the frame is not
    /// forwarded to the client.
    pub fn serialize(&self, frame: &Frame) -> Option<String> {
        let event = match frame {
            Frame::Audio(audio) => self.media_event(audio),
            Frame::Control(ControlKind::Interruption) => OutboundEvent::Stop,
            Frame::Control(ControlKind::Start | ControlKind::Stop) => return None,
            Frame::Transcript(transcript) => Self::transcript_event(transcript),
            Frame::Context(_) => return None,
        };

        match serde_json::to_string(&event) {
            Ok(json) => Some(json),
            Err(e) => {
                error!("Failed to serialize outbound event: {}", e);
                None
            }
        }
    }

    /// Decode an inbound payload into a mono audio frame at the client rate.
    ///
    /// Text and binary messages share the same encoding, so both arrive here
    /// as bytes.
    pub fn deserialize(&self, wire: &[u8]) -> Result<AudioFrame, DecodeError> {
        let text = std::str::from_utf8(wire)?.trim();
        if text.is_empty() {
            return Err(DecodeError::Empty);
        }

        let pcm = BASE64_STANDARD.decode(text)?;
        if pcm.is_empty() {
            return Err(DecodeError::Empty);
        }
        if pcm.len() % BYTES_PER_SAMPLE != 0 {
            return Err(DecodeError::PartialSample(pcm.len()));
        }

        Ok(AudioFrame::inbound(Bytes::from(pcm), self.sample_rate))
    }

    pub fn deserialize_text(&self, text: &str) -> Result<AudioFrame, DecodeError> {
        self.deserialize(text.as_bytes())
    }

    fn media_event(&self, audio: &AudioFrame) -> OutboundEvent {
        OutboundEvent::Media {
            data: BASE64_STANDARD.encode(&audio.payload),
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            format: PCM_FORMAT.to_string(),
        }
    }

    fn transcript_event(transcript: &TranscriptFrame) -> OutboundEvent {
        OutboundEvent::Transcript {
            role: transcript.role,
            content: transcript.content.clone(),
            timestamp: transcript.timestamp.clone(),
        }
    }
}
