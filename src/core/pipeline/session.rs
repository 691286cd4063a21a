//! Per-session settings, hooks and results.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::core::aggregators::TranscriptCallback;
use crate::core::vad::VADConfig;

/// Default bound for each per-session channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Hook invoked with the session id.
pub type SessionCallback =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Static parameters a session is built from.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Rate of the PCM exchanged with the browser
    pub client_sample_rate: u32,
    /// Rate the engine expects for user audio
    pub engine_input_sample_rate: u32,
    /// Rate the engine produces assistant audio at
    pub engine_output_sample_rate: u32,
    pub vad: VADConfig,
    pub system_instruction: String,
    pub channel_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            client_sample_rate: 16000,
            engine_input_sample_rate: 24000,
            engine_output_sample_rate: 24000,
            vad: VADConfig::default(),
            system_instruction: crate::core::tools::DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Optional lifecycle hooks.
#[derive(Clone, Default)]
pub struct SessionHooks {
    /// Called once the engine is connected, before the greeting is requested.
    pub on_connect: Option<SessionCallback>,
    /// Called after the engine has been released.
    pub on_disconnect: Option<SessionCallback>,
    pub on_transcript: Option<TranscriptCallback>,
}

impl std::fmt::Debug for SessionHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHooks")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_transcript", &self.on_transcript.is_some())
            .finish()
    }
}

/// Counters reported when a session ends cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,
    pub interruptions: u64,
    pub coalesced_interruptions: u64,
    pub transcripts: u64,
    pub tool_calls: u64,
    /// Assistant audio chunks dropped because their response was cancelled
    pub discarded_audio: u64,
    pub malformed_inputs: u64,
}
