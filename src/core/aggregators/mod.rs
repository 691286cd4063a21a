//! Conversation aggregators.
//!
//! [`TurnAggregator`] keeps the context sent to the engine.
//! [`TranscriptAggregator`] forwards finalized utterances to the client.

mod transcript;
mod turn;

pub use transcript::{TranscriptAggregator, TranscriptCallback};
pub use turn::TurnAggregator;
