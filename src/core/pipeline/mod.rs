//! Per-connection conversation pipeline.

mod orchestrator;
mod session;

pub use orchestrator::Pipeline;
pub use session::{
    DEFAULT_CHANNEL_CAPACITY, PipelineSettings, SessionCallback, SessionHooks, SessionSummary,
};
