//! Output Normalizer
//!
//! Peak normalization to full scale. Samples are divided by the peak so
//! the loudest sample lands on exactly 1.0 and a second pass is a no-op.

use serde::{Deserialize, Serialize};

use crate::engine::SampleBuffer;
use crate::error::{LadderError, Result};

/// Normalization applied to the pipeline output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// One gain for the whole buffer
    #[default]
    Peak,
    /// Each channel scaled to its own peak
    PerChannel,
    /// Leave the mix as is
    Off,
}

impl Normalization {
    /// Apply the selected normalization, returning the largest gain used
    pub fn apply(self, buffer: &mut SampleBuffer) -> Result<f32> {
        match self {
            Normalization::Peak => normalize(buffer),
            Normalization::PerChannel => {
                let gains = normalize_channels(buffer)?;
                Ok(gains.into_iter().fold(0.0_f32, f32::max))
            }
            Normalization::Off => Ok(1.0),
        }
    }
}

fn scale_to_peak(samples: &mut [f32], peak: f32) {
    for s in samples {
        *s /= peak;
    }
}

/// Scale the whole buffer so its peak is 1.0
///
/// # Returns
/// The applied gain, `1 / peak`.
///
/// # Errors
/// `SilentBuffer` for an all-zero buffer (left unchanged) and
/// `NonFiniteSamples` when any sample is NaN or infinite.
pub fn normalize(buffer: &mut SampleBuffer) -> Result<f32> {
    if !buffer.is_finite() {
        return Err(LadderError::NonFiniteSamples);
    }

    let peak = buffer.peak();
    if peak == 0.0 {
        return Err(LadderError::SilentBuffer);
    }

    for channel in &mut buffer.samples {
        scale_to_peak(channel, peak);
    }
    Ok(1.0 / peak)
}

/// Scale each channel to its own peak; silent channels are skipped
///
/// Returns one gain per channel (1.0 for skipped channels).
pub fn normalize_channels(buffer: &mut SampleBuffer) -> Result<Vec<f32>> {
    if !buffer.is_finite() {
        return Err(LadderError::NonFiniteSamples);
    }
    if buffer.is_silent() {
        return Err(LadderError::SilentBuffer);
    }

    Ok(buffer
        .samples
        .iter_mut()
        .map(|channel| {
            let peak = channel.iter().map(|s| s.abs()).fold(0.0_f32, f32::max);
            if peak == 0.0 {
                1.0
            } else {
                scale_to_peak(channel, peak);
                1.0 / peak
            }
        })
        .collect())
}
