//! Engine adapter abstraction.
//!
//! An engine is a remote speech-to-speech service. The adapter owns the
//! network connection; the pipeline talks to it through [`EngineAdapter`] and
//! consumes everything the engine produces as [`EngineEvent`]s on a bounded
//! channel returned by [`EngineAdapter::connect`].
//!
//! Only `connect` and `disconnect` take `&mut self`. Everything in between
//! takes `&self`, so both pipeline stages can drive one engine without a lock.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use zeroize::Zeroize;

use crate::core::frames::{AudioFrame, ContextFrame, Role};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Engine error: {0}")]
    ProviderError(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Unsupported engine provider: {0}")]
    UnsupportedProvider(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Provider key understood by `create_engine`
    pub provider: String,
    /// WebSocket endpoint of the engine
    pub url: String,
    pub api_key: String,
    #[serde(default)]
    pub model: Option<String>,
    pub voice: String,
    /// Rate of the PCM the engine expects
    pub input_sample_rate: u32,
    /// Rate of the PCM the engine produces
    pub output_sample_rate: u32,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("provider", &self.provider)
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("input_sample_rate", &self.input_sample_rate)
            .field("output_sample_rate", &self.output_sample_rate)
            .finish()
    }
}

impl Drop for EngineConfig {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

// =============================================================================
// Events
// =============================================================================

/// Everything an engine can report. The channel closing means the engine
/// connection is gone.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Synthesized assistant audio at the engine output rate.
    Audio {
        frame: AudioFrame,
        response_id: Option<String>,
    },
    /// A finalized utterance, user speech as recognized or assistant speech
    /// as spoken.
    Transcript { role: Role, content: String },
    /// The engine asks for a tool to be run.
    ToolCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    ResponseStarted { response_id: Option<String> },
    ResponseDone { response_id: Option<String> },
    /// `fatal` errors end the session.
    Error { message: String, fatal: bool },
}

// =============================================================================
// Adapter Trait
// =============================================================================

#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// Open the engine connection and return its event stream.
    async fn connect(&mut self) -> EngineResult<mpsc::Receiver<EngineEvent>>;

    /// Replace the engine's view of the conversation: instructions, tools and
    /// prior turns.
    async fn send_context(&self, context: &ContextFrame) -> EngineResult<()>;

    /// Stream user audio at the engine input rate.
    async fn send_audio(&self, pcm: Bytes) -> EngineResult<()>;

    /// Ask the engine to speak next.
    async fn trigger_response(&self) -> EngineResult<()>;

    /// Cancel the response in progress; the user has started a new turn.
    async fn interrupt(&self) -> EngineResult<()>;

    async fn submit_tool_result(&self, call_id: &str, result: &Value) -> EngineResult<()>;

    async fn disconnect(&mut self) -> EngineResult<()>;

    fn is_ready(&self) -> bool;

    fn provider_name(&self) -> &'static str;
}

pub type BoxedEngine = Box<dyn EngineAdapter>;

/// Builds an unconnected engine for a session.
pub type EngineFactory = std::sync::Arc<dyn Fn(&EngineConfig) -> EngineResult<BoxedEngine> + Send + Sync>;
