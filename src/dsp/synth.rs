//! Tone/Beep Synthesizer
//!
//! Fixed-duration mono tones (pure, AM, FM) and band-limited Gaussian noise
//! bursts, plus placement into the stereo field.

use std::f64::consts::PI;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::filter::{butterworth, clamp_band, filtfilt, ButterKind};
use crate::engine::SampleBuffer;
use crate::error::{LadderError, Result};

/// Butterworth order of the noise band-pass
pub const NOISE_FILTER_ORDER: usize = 4;

/// Waveform of a synthesized tone
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToneKind {
    /// Plain sine
    #[default]
    Pure,
    /// Sine carrier times a `[0, 1]` sine modulator
    AmplitudeModulated { mod_freq: f64 },
    /// Sine with phase `2π f t + index · sin(2π f_mod t)`
    FrequencyModulated { mod_freq: f64, index: f64 },
    /// Seeded Gaussian noise band-passed around the tone frequency
    BandNoise { bandwidth: f64, seed: u64 },
}

/// Stereo placement of a beep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Left,
    Right,
    Both,
}

impl Channel {
    /// Channel indices in a `SampleBuffer` that carry the beep
    pub fn indices(self) -> &'static [usize] {
        match self {
            Channel::Left => &[0],
            Channel::Right => &[1],
            Channel::Both => &[0, 1],
        }
    }

    /// The opposite side (`Both` stays `Both`)
    pub fn other(self) -> Self {
        match self {
            Channel::Left => Channel::Right,
            Channel::Right => Channel::Left,
            Channel::Both => Channel::Both,
        }
    }
}

/// Synthesize a mono tone of `floor(duration * sample_rate)` samples
///
/// Samples are spread evenly over `[0, duration)`.
///
/// # Example
/// ```
/// use notchladder::dsp::{tone, ToneKind};
///
/// let beep = tone(1000.0, 0.01, 44100, &ToneKind::Pure).unwrap();
/// assert_eq!(beep.len(), 441);
/// assert_eq!(beep[0], 0.0);
/// ```
pub fn tone(frequency: f64, duration: f64, sample_rate: u32, kind: &ToneKind) -> Result<Vec<f32>> {
    tone_prefix(frequency, duration, usize::MAX, sample_rate, kind)
}

/// The first `max_frames` samples of [`tone`]
///
/// Sample spacing follows the full `duration`, but only the prefix is
/// synthesized, so a beep cut short by its window costs no more than the
/// window.
pub fn tone_prefix(
    frequency: f64,
    duration: f64,
    max_frames: usize,
    sample_rate: u32,
    kind: &ToneKind,
) -> Result<Vec<f32>> {
    if !(duration >= 0.0 && duration.is_finite()) {
        return Err(LadderError::InvalidParameter {
            name: "duration".to_string(),
            value: duration.to_string(),
            expected: "a non-negative number of seconds".to_string(),
        });
    }

    let full = (duration * sample_rate as f64).floor();
    if full < 1.0 {
        return Ok(Vec::new());
    }
    let len = (full as usize).min(max_frames);
    synthesize(frequency, len, duration / full, sample_rate, kind)
}

/// Synthesize exactly `frames` samples at the buffer's sample period
///
/// Used for full-length treatments, where the tone must match the input
/// frame count regardless of rounding in `frames / sample_rate`.
pub fn tone_frames(
    frequency: f64,
    frames: usize,
    sample_rate: u32,
    kind: &ToneKind,
) -> Result<Vec<f32>> {
    if frames == 0 {
        return Ok(Vec::new());
    }
    if sample_rate == 0 {
        return Err(LadderError::InvalidParameter {
            name: "sample_rate".to_string(),
            value: "0".to_string(),
            expected: "a positive sample rate".to_string(),
        });
    }
    synthesize(frequency, frames, 1.0 / sample_rate as f64, sample_rate, kind)
}

fn synthesize(
    frequency: f64,
    len: usize,
    dt: f64,
    sample_rate: u32,
    kind: &ToneKind,
) -> Result<Vec<f32>> {
    let phase = |freq: f64, i: usize| 2.0 * PI * freq * i as f64 * dt;

    let samples = match *kind {
        ToneKind::Pure => (0..len).map(|i| phase(frequency, i).sin() as f32).collect(),
        ToneKind::AmplitudeModulated { mod_freq } => (0..len)
            .map(|i| {
                let modulator = 0.5 * (1.0 + phase(mod_freq, i).sin());
                (phase(frequency, i).sin() * modulator) as f32
            })
            .collect(),
        ToneKind::FrequencyModulated { mod_freq, index } => (0..len)
            .map(|i| (phase(frequency, i) + index * phase(mod_freq, i).sin()).sin() as f32)
            .collect(),
        ToneKind::BandNoise { bandwidth, seed } => {
            band_noise(len, frequency, bandwidth, sample_rate, seed)?
        }
    };

    Ok(samples)
}

/// Gaussian white noise band-passed to `center ± bandwidth/2`
///
/// A band clamped at 0 Hz or Nyquist degrades to a low-pass or high-pass.
fn band_noise(
    len: usize,
    center_hz: f64,
    bandwidth: f64,
    sample_rate: u32,
    seed: u64,
) -> Result<Vec<f32>> {
    let fs = sample_rate as f64;
    let kind = match clamp_band(center_hz, bandwidth, fs)? {
        (Some(low), Some(high)) => ButterKind::BandPass(low, high),
        (None, Some(high)) => ButterKind::LowPass(high),
        (Some(low), None) => ButterKind::HighPass(low),
        (None, None) => unreachable!("clamp_band rejects empty bands"),
    };
    let sections = butterworth(NOISE_FILTER_ORDER, kind, fs)?;

    let normal = Normal::new(0.0_f32, 1.0).map_err(|e| LadderError::InvalidParameter {
        name: "noise".to_string(),
        value: e.to_string(),
        expected: "a valid normal distribution".to_string(),
    })?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let white: Vec<f32> = (0..len).map(|_| normal.sample(&mut rng)).collect();

    Ok(filtfilt(&sections, &white))
}

/// Put a mono signal on the given side; an inactive channel stays silent
pub fn place_stereo(mono: &[f32], channel: Channel, sample_rate: u32) -> SampleBuffer {
    let mut stereo = SampleBuffer::stereo(mono.len(), sample_rate);
    for &idx in channel.indices() {
        stereo.channel_mut(idx).copy_from_slice(mono);
    }
    stereo
}

/// Put the same mono signal on both channels
pub fn duplicate_stereo(mono: Vec<f32>, sample_rate: u32) -> SampleBuffer {
    SampleBuffer {
        samples: vec![mono.clone(), mono],
        sample_rate,
    }
}
