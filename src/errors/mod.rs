//! Error types shared across the bridge.
//!
//! Each concern gets its own enum so callers can map failures onto the
//! behavior the connection needs: auth failures close with 1008, decode
//! failures are dropped, pipeline faults close with 1011 and tool failures are
//! reported back to the engine.

pub mod auth_error;
pub mod pipeline_error;

pub use auth_error::{AuthError, AuthResult};
pub use pipeline_error::{
    CLOSE_NORMAL, CLOSE_PIPELINE_ERROR, CLOSE_POLICY_VIOLATION, DecodeError, PipelineFault,
    PipelineResult, ToolInvocationError,
};
