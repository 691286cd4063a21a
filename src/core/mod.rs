pub mod aggregators;
pub mod codec;
pub mod engine;
pub mod frames;
pub mod pipeline;
pub mod resampler;
pub mod tools;
pub mod transport;
pub mod vad;

// Re-export commonly used types for convenience
pub use codec::{OutboundEvent, ProtocolCodec};
pub use engine::{
    BoxedEngine, EngineAdapter, EngineConfig, EngineError, EngineEvent, EngineFactory,
    EngineResult, create_engine, get_supported_engines,
};
pub use frames::{AudioFrame, ContextFrame, ControlKind, Frame, Role, TranscriptFrame};
pub use pipeline::{Pipeline, PipelineSettings, SessionHooks, SessionSummary};
pub use resampler::StreamResampler;
pub use tools::{ToolDeclaration, ToolRegistry};
pub use transport::{OutboundMessage, TransportOutput, TransportReceiver};
pub use vad::{BargeInController, VADConfig};
