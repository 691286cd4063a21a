//! VAD configuration types

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Analysis frame length in milliseconds.
pub const VAD_FRAME_MS: u32 = 20;

/// Configuration for voice activity detection and barge-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VADConfig {
    /// Sustained speech required before speech start is reported (seconds)
    pub start_secs: f32,

    /// Sustained silence required before speech stop is reported (seconds)
    pub stop_secs: f32,

    /// Normalized volume (0.0 - 1.0) at or above which a frame counts as speech
    pub min_volume: f32,

    /// Audio retained before speech start so the onset of a word is not clipped (ms)
    pub speech_pad_ms: u32,

    /// Exponential smoothing factor applied to frame volume (0.0 - 1.0).
    /// Lower values react more slowly.
    pub smoothing: f32,
}

impl Default for VADConfig {
    fn default() -> Self {
        Self {
            start_secs: 0.2,
            stop_secs: 0.5,
            min_volume: 0.4,
            speech_pad_ms: 300,
            smoothing: 0.2,
        }
    }
}

impl VADConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames of sustained speech needed to leave silence
    pub fn start_frames(&self) -> u32 {
        frames_for_duration_ms((self.start_secs * 1000.0) as u32)
    }

    /// Frames of sustained silence needed to end speech
    pub fn stop_frames(&self) -> u32 {
        frames_for_duration_ms((self.stop_secs * 1000.0) as u32)
    }

    /// Frames kept as pre-roll
    pub fn pad_frames(&self) -> usize {
        if self.speech_pad_ms == 0 {
            return 0;
        }
        frames_for_duration_ms(self.speech_pad_ms) as usize
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_volume) {
            anyhow::bail!("VAD min_volume must be between 0.0 and 1.0");
        }
        if !(self.start_secs >= 0.0 && self.start_secs.is_finite()) {
            anyhow::bail!("VAD start_secs must be a non-negative number");
        }
        if !(self.stop_secs > 0.0 && self.stop_secs.is_finite()) {
            anyhow::bail!("VAD stop_secs must be greater than 0");
        }
        if !(self.smoothing > 0.0 && self.smoothing <= 1.0) {
            anyhow::bail!("VAD smoothing must be in (0.0, 1.0]");
        }
        if self.speech_pad_ms > 5000 {
            anyhow::bail!("VAD speech_pad_ms must not exceed 5000");
        }
        Ok(())
    }
}

fn frames_for_duration_ms(duration_ms: u32) -> u32 {
    duration_ms.div_ceil(VAD_FRAME_MS).max(1)
}
