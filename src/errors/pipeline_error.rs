use thiserror::Error;

use crate::core::engine::EngineError;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Policy violation, used for authentication failures.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Internal error, used for pipeline faults.
pub const CLOSE_PIPELINE_ERROR: u16 = 1011;

/// Malformed inbound wire payload. The message is dropped and the session
/// continues.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Empty payload")]
    Empty,

    #[error("Binary payload is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Payload of {0} bytes is not a whole number of 16-bit samples")]
    PartialSample(usize),
}

/// Unrecoverable failure inside a session. The session is torn down and the
/// client receives close code 1011.
#[derive(Debug, Error)]
pub enum PipelineFault {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Engine connection closed")]
    EngineClosed,

    #[error("Transport closed")]
    TransportClosed,

    #[error("Stage failure: {0}")]
    Stage(String),
}

impl PipelineFault {
    pub fn close_code(&self) -> u16 {
        CLOSE_PIPELINE_ERROR
    }

    pub fn close_reason(&self) -> &'static str {
        "Pipeline error"
    }
}

pub type PipelineResult<T> = Result<T, PipelineFault>;

/// Failure resolving or running a tool call. Reported back to the engine as an
/// error payload; the conversation continues.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolInvocationError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Missing required parameter '{param}' for {tool}")]
    MissingParameter { tool: String, param: String },

    #[error("Tool {tool} failed: {reason}")]
    HandlerFailed { tool: String, reason: String },

    #[error("Tool {0} returned a non-object result")]
    InvalidResult(String),
}

impl ToolInvocationError {
    /// Payload submitted to the engine in place of a tool result.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}
