//! Voice Activity Detection (VAD) module
//!
//! Speech detection over the inbound audio stream plus the barge-in decision
//! that turns a speech start during assistant playback into an interruption.
//!
//! # Example
//!
//! ```rust,ignore
//! use voice_bridge::core::vad::{EnergyVAD, VADConfig, VADEvent, VoiceActivityDetector};
//!
//! let mut vad = EnergyVAD::new(VADConfig::default(), 16000)?;
//!
//! for event in vad.process(&pcm_chunk) {
//!     match event {
//!         VADEvent::SpeechStarted { .. } => println!("Speech started!"),
//!         VADEvent::SpeechStopped => println!("Speech ended!"),
//!     }
//! }
//! ```

pub mod barge_in;
pub mod config;
pub mod detector;

pub use barge_in::{BargeInController, BargeInDecision};
pub use config::{VAD_FRAME_MS, VADConfig};
pub use detector::{
    EnergyVAD, VADEvent, VADState, VADStats, VoiceActivityDetector, frame_volume,
};

use anyhow::Result;

/// Create a VAD instance with the given configuration
pub fn create_vad(config: VADConfig, sample_rate: u32) -> Result<Box<dyn VoiceActivityDetector>> {
    Ok(Box::new(EnergyVAD::new(config, sample_rate)?))
}
