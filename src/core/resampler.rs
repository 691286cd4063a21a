//! Continuous sample-rate conversion for PCM s16le streams.
//!
//! Input is buffered into fixed 10 ms blocks and fed to a polynomial
//! fixed-input resampler. The tail that does not fill a block stays pending
//! until the next push, so splitting a signal into arbitrary chunks produces
//! the same output as pushing it in one piece.

use bytes::Bytes;
use rubato::{FastFixedIn, PolynomialDegree, Resampler, ResamplerConstructionError};
use tracing::{debug, warn};

use super::frames::BYTES_PER_SAMPLE;

const BLOCK_MS: u32 = 10;

/// Headroom for the ratio, required by the resampler constructor.
const MAX_RATIO_RELATIVE: f64 = 10.0;

/// One instance per direction. Never shared.
pub struct StreamResampler {
    rates: Option<(u32, u32)>,
    resampler: Option<FastFixedIn<f32>>,
    block_size: usize,
    pending: Vec<f32>,
}

impl Default for StreamResampler {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamResampler {
    pub fn new() -> Self {
        Self {
            rates: None,
            resampler: None,
            block_size: 0,
            pending: Vec::new(),
        }
    }

    /// Convert a chunk of PCM s16le from `from_rate` to `to_rate`.
    ///
    /// Equal rates return the input unchanged. An empty chunk returns an empty
    /// buffer without touching any state.
    pub fn push(&mut self, pcm: &Bytes, from_rate: u32, to_rate: u32) -> Bytes {
        if from_rate == to_rate {
            return pcm.clone();
        }
        if pcm.len() < BYTES_PER_SAMPLE {
            return Bytes::new();
        }

        if let Err(e) = self.configure(from_rate, to_rate) {
            warn!(
                "Failed to build resampler {}Hz -> {}Hz: {}",
                from_rate, to_rate, e
            );
            return Bytes::new();
        }

        self.pending.extend(pcm16_to_f32(pcm));
        self.drain_blocks()
    }

    /// Samples buffered waiting for a full block.
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    pub fn reset(&mut self) {
        self.rates = None;
        self.resampler = None;
        self.block_size = 0;
        self.pending.clear();
    }

    fn configure(&mut self, from_rate: u32, to_rate: u32) -> Result<(), ResamplerConstructionError> {
        if self.rates == Some((from_rate, to_rate)) && self.resampler.is_some() {
            return Ok(());
        }
        if self.rates.is_some() {
            debug!(
                "Resampler rate pair changed to {}Hz -> {}Hz, resetting state",
                from_rate, to_rate
            );
        }

        let block_size = ((from_rate * BLOCK_MS) / 1000).max(1) as usize;
        let ratio = to_rate as f64 / from_rate as f64;
        let resampler = FastFixedIn::<f32>::new(
            ratio,
            MAX_RATIO_RELATIVE,
            PolynomialDegree::Septic,
            block_size,
            1,
        )?;

        self.pending.clear();
        self.block_size = block_size;
        self.resampler = Some(resampler);
        self.rates = Some((from_rate, to_rate));
        Ok(())
    }

    fn drain_blocks(&mut self) -> Bytes {
        let Some(resampler) = self.resampler.as_mut() else {
            return Bytes::new();
        };

        let mut output: Vec<f32> = Vec::new();
        let mut consumed = 0;
        while self.pending.len() - consumed >= self.block_size {
            let block = &self.pending[consumed..consumed + self.block_size];
            match resampler.process(&[block], None) {
                Ok(mut channels) => {
                    if let Some(samples) = channels.pop() {
                        output.extend(samples);
                    }
                }
                Err(e) => {
                    warn!("Resampler failed on block, dropping it: {}", e);
                }
            }
            consumed += self.block_size;
        }
        self.pending.drain(..consumed);

        Bytes::from(f32_to_pcm16(&output))
    }
}

/// Little-endian s16 bytes to normalized f32. A trailing odd byte is ignored.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect()
}

/// Normalized f32 to little-endian s16 bytes, clamping out-of-range values.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for &s in samples {
        let v = (s * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, rate: u32, freq: f32) -> Bytes {
        let samples: Vec<f32> = (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect();
        Bytes::from(f32_to_pcm16(&samples))
    }

    #[test]
    fn test_identity_passthrough() {
        let mut resampler = StreamResampler::new();
        let input = sine(480, 16000, 440.0);
        let output = resampler.push(&input, 16000, 16000);
        assert_eq!(output, input);
        assert_eq!(output.as_ptr(), input.as_ptr());
        assert_eq!(resampler.pending_samples(), 0);
    }

    #[test]
    fn test_empty_input_keeps_state() {
        let mut resampler = StreamResampler::new();
        let input = sine(100, 24000, 440.0);
        resampler.push(&input, 24000, 16000);
        let pending = resampler.pending_samples();

        let output = resampler.push(&Bytes::new(), 24000, 16000);
        assert!(output.is_empty());
        assert_eq!(resampler.pending_samples(), pending);
    }

    #[test]
    fn test_partial_block_is_buffered() {
        let mut resampler = StreamResampler::new();
        // 10 ms at 24 kHz is 240 samples; 100 samples is not a full block
        let output = resampler.push(&sine(100, 24000, 440.0), 24000, 16000);
        assert!(output.is_empty());
        assert_eq!(resampler.pending_samples(), 100);
    }

    #[test]
    fn test_output_length_follows_ratio() {
        let mut resampler = StreamResampler::new();
        let input = sine(16000, 16000, 440.0);
        let output = resampler.push(&input, 16000, 24000);
        let out_samples = output.len() / BYTES_PER_SAMPLE;
        assert!(
            (23_760..=24_240).contains(&out_samples),
            "unexpected output length {}",
            out_samples
        );
    }

    #[test]
    fn test_chunked_matches_whole_signal() {
        let input = sine(24_000, 24000, 300.0);

        let mut whole = StreamResampler::new();
        let expected = whole.push(&input, 24000, 16000);

        let mut chunked = StreamResampler::new();
        let mut actual = Vec::new();
        let sizes = [2usize, 74, 480, 998, 3, 1, 2400];
        let mut offset = 0;
        let mut i = 0;
        while offset < input.len() {
            // sizes are in bytes and always even
            let step = (sizes[i % sizes.len()] & !1).max(2);
            let end = (offset + step).min(input.len());
            actual.extend_from_slice(&chunked.push(&input.slice(offset..end), 24000, 16000));
            offset = end;
            i += 1;
        }

        assert_eq!(whole.pending_samples(), chunked.pending_samples());
        assert_eq!(expected.len(), actual.len());
        for (a, b) in expected.chunks_exact(2).zip(actual.chunks_exact(2)) {
            let a = i16::from_le_bytes([a[0], a[1]]);
            let b = i16::from_le_bytes([b[0], b[1]]);
            assert!((a as i32 - b as i32).abs() <= 1);
        }
    }

    #[test]
    fn test_rate_change_resets_pending() {
        let mut resampler = StreamResampler::new();
        resampler.push(&sine(100, 24000, 440.0), 24000, 16000);
        assert_eq!(resampler.pending_samples(), 100);

        resampler.push(&sine(50, 48000, 440.0), 48000, 16000);
        assert_eq!(resampler.pending_samples(), 50);
    }

    #[test]
    fn test_pcm_conversion() {
        let bytes = f32_to_pcm16(&[0.0, 0.5, -1.0, 2.0]);
        let back = pcm16_to_f32(&bytes);
        assert_eq!(back[0], 0.0);
        assert!((back[1] - 0.5).abs() < 1e-4);
        assert_eq!(back[2], -1.0);
        assert!((back[3] - (i16::MAX as f32 / 32768.0)).abs() < 1e-6);
    }
}
