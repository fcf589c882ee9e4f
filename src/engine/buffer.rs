//! Sample Buffer Management
//!
//! Provides the core sample buffer type shared by every stage of the
//! treatment pipeline. Audio is stored non-interleaved as 32-bit floats;
//! the pipeline itself always works on two channels.

use std::ops::Range;

use crate::error::{LadderError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Channel count the treatment pipeline works on
pub const STEREO: usize = 2;

/// Maximum channel count accepted from the audio collaborator
pub const MAX_INPUT_CHANNELS: usize = 2;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Calculate the RMS level of a sample slice in dB
///
/// Returns -f32::INFINITY for empty or silent input.
pub fn calculate_rms_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return f32::NEG_INFINITY;
    }

    let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum_squares / samples.len() as f64).sqrt() as f32;
    linear_to_db(rms)
}

// ============================================================================
// Sample Buffer
// ============================================================================

/// Multi-channel sample matrix (`channels × frames`) at a known sample rate
///
/// # Example
/// ```
/// use notchladder::engine::SampleBuffer;
///
/// let mono = SampleBuffer::from_channels(vec![vec![0.1, 0.2, 0.3]], 1000).unwrap();
/// let stereo = mono.upmix_to_stereo();
/// assert_eq!(stereo.channels(), 2);
/// assert_eq!(stereo.channel(1), &[0.1, 0.2, 0.3]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    /// Sample data: outer Vec is channels, inner Vec is frames
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl SampleBuffer {
    /// Create a zero-filled buffer
    pub fn new(channels: usize, frames: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; frames]; channels],
            sample_rate,
        }
    }

    /// Create a zero-filled stereo buffer
    pub fn stereo(frames: usize, sample_rate: u32) -> Self {
        Self::new(STEREO, frames, sample_rate)
    }

    /// Build a buffer from per-channel sample vectors
    ///
    /// Accepts one or two channels of equal length.
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if channels.is_empty() || channels.len() > MAX_INPUT_CHANNELS {
            return Err(LadderError::UnsupportedFormat {
                format: format!(
                    "{}-channel audio (only mono/stereo supported)",
                    channels.len()
                ),
            });
        }

        let frames = channels[0].len();
        if channels.iter().any(|ch| ch.len() != frames) {
            return Err(LadderError::InvalidAudio {
                reason: "channels have different lengths".to_string(),
                source: None,
            });
        }

        if sample_rate == 0 {
            return Err(LadderError::InvalidAudio {
                reason: "sample rate must be positive".to_string(),
                source: None,
            });
        }

        Ok(Self {
            samples: channels,
            sample_rate,
        })
    }

    /// Create a buffer from interleaved sample data (L, R, L, R, ...)
    pub fn from_interleaved(
        interleaved: &[f32],
        channels: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        if channels == 0 || channels > MAX_INPUT_CHANNELS {
            return Err(LadderError::UnsupportedFormat {
                format: format!("{}-channel audio (only mono/stereo supported)", channels),
            });
        }

        if interleaved.len() % channels != 0 {
            return Err(LadderError::InvalidAudio {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    channels
                ),
                source: None,
            });
        }

        let frames = interleaved.len() / channels;
        let mut samples = vec![Vec::with_capacity(frames); channels];
        for frame in interleaved.chunks_exact(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Self::from_channels(samples, sample_rate)
    }

    /// Convert the buffer to interleaved format
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut interleaved = Vec::with_capacity(self.channels() * self.frames());
        for frame in 0..self.frames() {
            for channel in &self.samples {
                interleaved.push(channel[frame]);
            }
        }
        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of frames (samples per channel)
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer holds no frames
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Get the duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Get a read-only view of one channel
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Get a mutable view of one channel
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Duplicate a mono channel into stereo; stereo buffers pass through
    pub fn upmix_to_stereo(mut self) -> Self {
        if self.channels() == 1 {
            let mono = self.samples[0].clone();
            self.samples.push(mono);
        }
        self
    }

    /// Largest absolute sample value across all channels
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|s| s.abs())
            .fold(0.0_f32, f32::max)
    }

    /// Check that every sample is finite
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .all(|s| s.is_finite())
    }

    /// Check that every sample is exactly zero
    pub fn is_silent(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .all(|&s| s == 0.0)
    }

    /// Copy a frame range from another buffer of the same shape
    pub fn copy_range_from(&mut self, other: &SampleBuffer, range: Range<usize>) {
        self.assert_same_shape(other);
        for (dst, src) in self.samples.iter_mut().zip(&other.samples) {
            dst[range.clone()].copy_from_slice(&src[range.clone()]);
        }
    }

    /// Assert that two buffers can take part in the same run
    ///
    /// # Panics
    /// Mismatched channel count, frame count or sample rate is a
    /// programming error and panics.
    pub fn assert_same_shape(&self, other: &SampleBuffer) {
        assert_eq!(self.channels(), other.channels(), "channel count mismatch");
        assert_eq!(self.frames(), other.frames(), "frame count mismatch");
        assert_eq!(self.sample_rate, other.sample_rate, "sample rate mismatch");
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::stereo(0, 44100)
    }
}

// ============================================================================
// Tests
// ============================================================================
