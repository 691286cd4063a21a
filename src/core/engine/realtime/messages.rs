//! Realtime protocol event types.
//!
//! Client events sent by the bridge:
//! - session.update
//! - input_audio_buffer.append
//! - conversation.item.create
//! - response.create
//! - response.cancel
//!
//! Server events consumed by the bridge:
//! - session.created / session.updated
//! - response.created / response.done
//! - response.output_item.added
//! - response.audio.delta
//! - response.audio_transcript.done
//! - conversation.item.input_audio_transcription.completed
//! - response.function_call_arguments.done
//! - error
//!
//! Any other server event deserializes to [`ServerEvent::Unknown`].

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::frames::{ContextFrame, Role};

/// Audio format name for 16-bit little-endian PCM.
pub const PCM16_FORMAT: &str = "pcm16";

// =============================================================================
// Session Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    pub model: String,
}

/// Server-side turn detection. The engine decides when the user turn ends;
/// interruptions are decided locally, so `interrupt_response` stays off.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename = "server_vad")]
pub struct TurnDetection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silence_duration_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_padding_ms: Option<u32>,
    pub create_response: bool,
    pub interrupt_response: bool,
}

/// Function declaration as the engine expects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

// =============================================================================
// Conversation Items
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub item_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ContentPart>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ConversationItem {
    /// Text message from a past turn.
    pub fn message(role: Role, text: &str) -> Self {
        let content_type = match role {
            Role::Assistant => "text",
            Role::User | Role::System => "input_text",
        };
        Self {
            item_type: "message".to_string(),
            role: Some(role.as_str().to_string()),
            content: Some(vec![ContentPart {
                content_type: content_type.to_string(),
                text: Some(text.to_string()),
            }]),
            ..Default::default()
        }
    }

    pub fn function_output(call_id: &str, output: String) -> Self {
        Self {
            item_type: "function_call_output".to_string(),
            call_id: Some(call_id.to_string()),
            output: Some(output),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub content_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

// =============================================================================
// Client Events
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Echoed back in an `error` that answers this update
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        session: SessionConfig,
    },

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded PCM16
        audio: String,
    },

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    #[serde(rename = "response.create")]
    ResponseCreate,

    #[serde(rename = "response.cancel")]
    ResponseCancel,
}

impl ClientEvent {
    pub fn audio_append(data: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
        }
    }
}

/// Tool declarations converted to engine function definitions.
pub fn tool_defs(context: &ContextFrame) -> Vec<ToolDef> {
    context
        .tools
        .iter()
        .map(|tool| ToolDef {
            tool_type: "function".to_string(),
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameter_schema(),
        })
        .collect()
}

// =============================================================================
// Server Events
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "error")]
    Error { error: ApiError },

    #[serde(rename = "session.created")]
    SessionCreated { session: Session },

    #[serde(rename = "session.updated")]
    SessionUpdated { session: Session },

    #[serde(rename = "response.created")]
    ResponseCreated { response: Response },

    #[serde(rename = "response.done")]
    ResponseDone { response: Response },

    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        #[serde(default)]
        response_id: Option<String>,
        item: ConversationItem,
    },

    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        #[serde(default)]
        response_id: Option<String>,
        delta: String,
    },

    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        #[serde(default)]
        response_id: Option<String>,
        transcript: String,
    },

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted { transcript: String },

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        call_id: String,
        /// Newer protocol revisions include the name here
        #[serde(default)]
        name: Option<String>,
        arguments: String,
    },

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    /// Client event that caused the error, when the engine knows it
    #[serde(default)]
    pub event_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}
