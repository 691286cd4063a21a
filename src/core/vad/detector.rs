//! Energy-based VAD detector implementation

use std::collections::VecDeque;

use anyhow::Result;
use bytes::Bytes;
use tracing::{debug, info, trace};

use super::config::{VAD_FRAME_MS, VADConfig};
use crate::core::frames::BYTES_PER_SAMPLE;

/// Floor of the dBFS range mapped onto normalized volume.
const VOLUME_FLOOR_DBFS: f32 = -60.0;

/// Speech state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VADState {
    /// No speech detected
    Silence,
    /// Confirmed speech in progress
    SpeechActive,
    /// Volume dropped below threshold, waiting for `stop_secs` of silence
    SpeechTrailing,
}

/// Transition reported by the detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VADEvent {
    /// Speech confirmed. `pre_roll` holds the audio that preceded it.
    SpeechStarted { pre_roll: Bytes },
    SpeechStopped,
}

/// Trait for Voice Activity Detection implementations
pub trait VoiceActivityDetector: Send {
    /// Feed a chunk of PCM s16le audio. Returns transitions in the order they
    /// occurred within the chunk.
    fn process(&mut self, pcm: &[u8]) -> Vec<VADEvent>;

    /// Reset internal state (call when starting a new audio stream)
    fn reset(&mut self);

    fn state(&self) -> VADState;

    fn is_speaking(&self) -> bool {
        matches!(
            self.state(),
            VADState::SpeechActive | VADState::SpeechTrailing
        )
    }
}

/// RMS volume detector over fixed 20 ms frames.
pub struct EnergyVAD {
    config: VADConfig,
    sample_rate: u32,
    state: VADState,
    /// Samples per analysis frame
    frame_samples: usize,
    /// Samples waiting for a full frame
    pending: Vec<i16>,
    /// Consecutive speech frames while in silence
    speech_frames: u32,
    /// Consecutive silence frames while trailing
    silence_frames: u32,
    start_frames: u32,
    stop_frames: u32,
    /// Pre-speech audio buffer (ring buffer of frames)
    pre_roll: VecDeque<Vec<i16>>,
    pre_roll_frames: usize,
    smoothed_volume: f32,
    total_frames: u64,
    total_speech_frames: u64,
    utterances: u64,
}

impl EnergyVAD {
    pub fn new(config: VADConfig, sample_rate: u32) -> Result<Self> {
        config.validate()?;
        if sample_rate == 0 {
            anyhow::bail!("VAD sample_rate must be greater than 0");
        }

        let frame_samples = ((sample_rate * VAD_FRAME_MS) / 1000).max(1) as usize;
        let start_frames = config.start_frames();
        let stop_frames = config.stop_frames();
        let pre_roll_frames = config.pad_frames();

        info!(
            "Energy VAD initialized: min_volume={:.2}, start={}s ({}f), stop={}s ({}f), pad={}ms",
            config.min_volume,
            config.start_secs,
            start_frames,
            config.stop_secs,
            stop_frames,
            config.speech_pad_ms
        );

        Ok(Self {
            config,
            sample_rate,
            state: VADState::Silence,
            frame_samples,
            pending: Vec::with_capacity(frame_samples),
            speech_frames: 0,
            silence_frames: 0,
            start_frames,
            stop_frames,
            pre_roll: VecDeque::with_capacity(pre_roll_frames),
            pre_roll_frames,
            smoothed_volume: 0.0,
            total_frames: 0,
            total_speech_frames: 0,
            utterances: 0,
        })
    }

    pub fn config(&self) -> &VADConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Current smoothed volume (0.0 - 1.0)
    pub fn volume(&self) -> f32 {
        self.smoothed_volume
    }

    fn process_frame(&mut self, frame: Vec<i16>) -> Option<VADEvent> {
        let raw = frame_volume(&frame);
        self.smoothed_volume += self.config.smoothing * (raw - self.smoothed_volume);
        self.total_frames += 1;

        let is_speech = self.smoothed_volume >= self.config.min_volume;
        if is_speech {
            self.total_speech_frames += 1;
        }

        if self.state == VADState::Silence && self.pre_roll_frames > 0 {
            if self.pre_roll.len() >= self.pre_roll_frames {
                self.pre_roll.pop_front();
            }
            self.pre_roll.push_back(frame);
        }

        let prev_state = self.state;
        let event = self.transition_state(is_speech);

        trace!(
            "VAD frame {}: volume={:.3} (raw={:.3}), state={:?}->{:?}",
            self.total_frames, self.smoothed_volume, raw, prev_state, self.state
        );

        event
    }

    fn transition_state(&mut self, is_speech: bool) -> Option<VADEvent> {
        match self.state {
            VADState::Silence => {
                if !is_speech {
                    self.speech_frames = 0;
                    return None;
                }
                self.speech_frames += 1;
                if self.speech_frames < self.start_frames {
                    return None;
                }

                debug!(
                    "Speech started after {} frames ({}ms)",
                    self.speech_frames,
                    self.speech_frames * VAD_FRAME_MS
                );
                self.state = VADState::SpeechActive;
                self.speech_frames = 0;
                self.silence_frames = 0;
                self.utterances += 1;
                Some(VADEvent::SpeechStarted {
                    pre_roll: self.take_pre_roll(),
                })
            }
            VADState::SpeechActive | VADState::SpeechTrailing => {
                if is_speech {
                    if self.state == VADState::SpeechTrailing {
                        trace!("Speech resumed after {} silence frames", self.silence_frames);
                    }
                    self.state = VADState::SpeechActive;
                    self.silence_frames = 0;
                    return None;
                }

                self.silence_frames += 1;
                if self.silence_frames < self.stop_frames {
                    self.state = VADState::SpeechTrailing;
                    return None;
                }

                debug!(
                    "Speech ended after {} silence frames ({}ms)",
                    self.silence_frames,
                    self.silence_frames * VAD_FRAME_MS
                );
                self.state = VADState::Silence;
                self.silence_frames = 0;
                Some(VADEvent::SpeechStopped)
            }
        }
    }

    fn take_pre_roll(&mut self) -> Bytes {
        let mut bytes = Vec::with_capacity(
            self.pre_roll.len() * self.frame_samples * BYTES_PER_SAMPLE,
        );
        for frame in self.pre_roll.drain(..) {
            for sample in frame {
                bytes.extend_from_slice(&sample.to_le_bytes());
            }
        }
        Bytes::from(bytes)
    }

    /// Get statistics about VAD activity
    pub fn get_stats(&self) -> VADStats {
        let speech_ratio = if self.total_frames > 0 {
            self.total_speech_frames as f32 / self.total_frames as f32
        } else {
            0.0
        };

        VADStats {
            total_frames: self.total_frames,
            total_speech_frames: self.total_speech_frames,
            speech_ratio,
            utterances: self.utterances,
        }
    }
}

impl VoiceActivityDetector for EnergyVAD {
    fn process(&mut self, pcm: &[u8]) -> Vec<VADEvent> {
        if pcm.is_empty() || pcm.len() % BYTES_PER_SAMPLE != 0 {
            return Vec::new();
        }

        self.pending.extend(
            pcm.chunks_exact(BYTES_PER_SAMPLE)
                .map(|b| i16::from_le_bytes([b[0], b[1]])),
        );

        let mut events = Vec::new();
        while self.pending.len() >= self.frame_samples {
            let rest = self.pending.split_off(self.frame_samples);
            let frame = std::mem::replace(&mut self.pending, rest);
            if let Some(event) = self.process_frame(frame) {
                events.push(event);
            }
        }
        events
    }

    fn reset(&mut self) {
        self.state = VADState::Silence;
        self.pending.clear();
        self.speech_frames = 0;
        self.silence_frames = 0;
        self.pre_roll.clear();
        self.smoothed_volume = 0.0;

        debug!("VAD state reset");
    }

    fn state(&self) -> VADState {
        self.state
    }
}

/// Normalized volume of one frame: RMS in dBFS mapped from [-60, 0] onto [0, 1].
pub fn frame_volume(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum_sq / samples.len() as f64).sqrt();
    if rms < 1.0 {
        return 0.0;
    }
    let dbfs = 20.0 * (rms / 32768.0).log10() as f32;
    ((dbfs - VOLUME_FLOOR_DBFS) / -VOLUME_FLOOR_DBFS).clamp(0.0, 1.0)
}

/// Statistics about VAD activity
#[derive(Debug, Clone)]
pub struct VADStats {
    /// Total frames processed
    pub total_frames: u64,
    /// Total frames classified as speech
    pub total_speech_frames: u64,
    /// Ratio of speech frames to total frames
    pub speech_ratio: f32,
    /// Number of confirmed utterances
    pub utterances: u64,
}

impl std::fmt::Display for VADStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VAD Stats: {} frames ({} speech, {:.1}% ratio), {} utterances",
            self.total_frames,
            self.total_speech_frames,
            self.speech_ratio * 100.0,
            self.utterances
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16000;

    fn tone(ms: u32) -> Vec<u8> {
        let len = (RATE * ms / 1000) as usize;
        (0..len)
            .map(|i| {
                let t = i as f32 / RATE as f32;
                (16000.0 * (2.0 * std::f32::consts::PI * 220.0 * t).sin()) as i16
            })
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }

    fn silence(ms: u32) -> Vec<u8> {
        vec![0u8; (RATE * ms / 1000) as usize * 2]
    }

    fn vad() -> EnergyVAD {
        EnergyVAD::new(VADConfig::default(), RATE).unwrap()
    }

    #[test]
    fn test_frame_volume() {
        assert_eq!(frame_volume(&[]), 0.0);
        assert_eq!(frame_volume(&[0; 320]), 0.0);
        assert!(frame_volume(&[i16::MAX; 320]) > 0.999);
        // -60 dBFS and below map to zero
        assert_eq!(frame_volume(&[30; 320]), 0.0);
        let mid = frame_volume(&[3277; 320]);
        assert!((mid - 0.667).abs() < 0.01, "mid volume {}", mid);
    }

    #[test]
    fn test_sustained_speech_starts_once() {
        let mut vad = vad();
        let events = vad.process(&tone(1000));
        let starts = events
            .iter()
            .filter(|e| matches!(e, VADEvent::SpeechStarted { .. }))
            .count();
        assert_eq!(starts, 1);
        assert_eq!(vad.state(), VADState::SpeechActive);
    }

    #[test]
    fn test_silence_stops_once() {
        let mut vad = vad();
        let mut events = vad.process(&tone(1000));
        events.extend(vad.process(&silence(1000)));

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], VADEvent::SpeechStarted { .. }));
        assert_eq!(events[1], VADEvent::SpeechStopped);
        assert_eq!(vad.state(), VADState::Silence);
        assert_eq!(vad.get_stats().utterances, 1);
    }

    #[test]
    fn test_short_blip_is_ignored() {
        let mut vad = vad();
        let mut events = vad.process(&tone(100));
        events.extend(vad.process(&silence(500)));
        assert!(events.is_empty());
        assert_eq!(vad.state(), VADState::Silence);
    }

    #[test]
    fn test_pause_within_stop_window_keeps_utterance() {
        let mut vad = vad();
        let mut events = vad.process(&tone(1000));
        events.extend(vad.process(&silence(200)));
        assert_eq!(vad.state(), VADState::SpeechTrailing);
        events.extend(vad.process(&tone(500)));
        assert_eq!(vad.state(), VADState::SpeechActive);
        events.extend(vad.process(&silence(1000)));

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], VADEvent::SpeechStarted { .. }));
        assert_eq!(events[1], VADEvent::SpeechStopped);
    }

    #[test]
    fn test_pre_roll_is_bounded() {
        let mut vad = vad();
        vad.process(&silence(2000));
        let events = vad.process(&tone(1000));
        match &events[0] {
            VADEvent::SpeechStarted { pre_roll } => {
                // 15 frames of 320 samples
                assert_eq!(pre_roll.len(), 15 * 320 * 2);
            }
            _ => panic!("Expected speech start"),
        }
    }

    #[test]
    fn test_chunking_does_not_change_transitions() {
        let mut audio = tone(1000);
        audio.extend(silence(1000));

        let mut whole = vad();
        let expected = whole.process(&audio);

        let mut chunked = vad();
        let mut actual = Vec::new();
        for chunk in audio.chunks(146) {
            actual.extend(chunked.process(chunk));
        }
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_empty_and_odd_chunks_leave_state_untouched() {
        let mut vad = vad();
        vad.process(&tone(1000));
        assert_eq!(vad.state(), VADState::SpeechActive);

        assert!(vad.process(&[]).is_empty());
        assert!(vad.process(&[1, 2, 3]).is_empty());
        assert_eq!(vad.state(), VADState::SpeechActive);
    }

    #[test]
    fn test_reset() {
        let mut vad = vad();
        vad.process(&tone(1000));
        vad.reset();
        assert_eq!(vad.state(), VADState::Silence);
        assert_eq!(vad.volume(), 0.0);
        assert!(!vad.is_speaking());
    }

    #[test]
    fn test_vad_stats_display() {
        let stats = VADStats {
            total_frames: 1000,
            total_speech_frames: 300,
            speech_ratio: 0.3,
            utterances: 4,
        };

        let display = format!("{}", stats);
        assert!(display.contains("1000 frames"));
        assert!(display.contains("300 speech"));
        assert!(display.contains("30.0%"));
        assert!(display.contains("4 utterances"));
    }
}
