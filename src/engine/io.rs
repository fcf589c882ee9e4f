//! WAV file I/O
//!
//! The treatment core never decodes or encodes files itself; this module is
//! the collaborator that turns WAV files into `SampleBuffer`s and back.
//! Mono files are duplicated to stereo on import.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;

use crate::engine::buffer::{SampleBuffer, MAX_INPUT_CHANNELS};
use crate::error::{LadderError, Result};

/// Output sample encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    /// Bit depth: 16, 24 (integer) or 32 (float)
    pub bit_depth: u16,
}

impl Default for WavFormat {
    fn default() -> Self {
        WavFormat { bit_depth: 24 }
    }
}

impl WavFormat {
    /// Create a format with the given bit depth
    pub fn new(bit_depth: u16) -> Self {
        WavFormat { bit_depth }
    }

    /// 16-bit integer, CD style
    pub fn cd_quality() -> Self {
        WavFormat { bit_depth: 16 }
    }

    /// 32-bit float, lossless for the pipeline's output
    pub fn float() -> Self {
        WavFormat { bit_depth: 32 }
    }
}

/// Read a WAV file into a stereo `SampleBuffer`
///
/// # Errors
/// * `FileNotFound` - If the file does not exist
/// * `InvalidAudio` - If the file is not a readable WAV file or is empty
/// * `UnsupportedFormat` - If the file has more than two channels or an
///   unsupported bit depth
pub fn read_wav(path: &Path) -> Result<SampleBuffer> {
    if !path.exists() {
        return Err(LadderError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let reader = WavReader::open(path).map_err(|e| LadderError::InvalidAudio {
        reason: format!("Failed to open WAV file: {}", e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 || channels > MAX_INPUT_CHANNELS {
        return Err(LadderError::UnsupportedFormat {
            format: format!("{}-channel audio (only mono/stereo supported)", channels),
        });
    }

    let samples = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    if samples.is_empty() {
        return Err(LadderError::InvalidAudio {
            reason: "file contains no samples".to_string(),
            source: None,
        });
    }

    debug!(
        "Read {}: {} ch, {} Hz, {}-bit, {} frames",
        path.display(),
        channels,
        spec.sample_rate,
        spec.bits_per_sample,
        samples.len() / channels
    );

    let buffer = SampleBuffer::from_interleaved(&samples, channels, spec.sample_rate)?;
    Ok(buffer.upmix_to_stereo())
}

/// Write a `SampleBuffer` to a WAV file
///
/// Integer formats are clamped to full scale.
pub fn write_wav(buffer: &SampleBuffer, path: &Path, format: WavFormat) -> Result<()> {
    if !matches!(format.bit_depth, 16 | 24 | 32) {
        return Err(LadderError::UnsupportedFormat {
            format: format!("{}-bit audio (only 16, 24, 32 supported)", format.bit_depth),
        });
    }

    let spec = WavSpec {
        channels: buffer.channels() as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: format.bit_depth,
        sample_format: if format.bit_depth == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    };

    let interleaved = buffer.to_interleaved();
    let mut writer = WavWriter::create(path, spec).map_err(hound_to_io)?;

    match format.bit_depth {
        16 => {
            for sample in interleaved {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled).map_err(hound_to_io)?;
            }
        }
        24 => {
            for sample in interleaved {
                // 24-bit stored as i32 in hound
                let scaled = (sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32;
                writer.write_sample(scaled).map_err(hound_to_io)?;
            }
        }
        32 => {
            for sample in interleaved {
                writer.write_sample(sample).map_err(hound_to_io)?;
            }
        }
        _ => unreachable!("bit depth validated above"),
    }

    writer.finalize().map_err(hound_to_io)?;
    debug!("Wrote {} frames to {}", buffer.frames(), path.display());

    Ok(())
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn hound_to_io(e: hound::Error) -> LadderError {
    match e {
        hound::Error::IoError(io) => LadderError::Io(io),
        other => LadderError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            other.to_string(),
        )),
    }
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let scale = match (sample_format, bits_per_sample) {
        (SampleFormat::Float, 32) => {
            return reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| LadderError::InvalidAudio {
                    reason: format!("Failed to read float samples: {}", e),
                    source: Some(Box::new(e)),
                });
        }
        (SampleFormat::Int, 8) => 128.0,
        (SampleFormat::Int, 16) => 32768.0,
        (SampleFormat::Int, 24) => 8388608.0,
        (SampleFormat::Int, 32) => 2147483648.0,
        (format, bits) => {
            return Err(LadderError::UnsupportedFormat {
                format: format!("{}-bit {:?} audio", bits, format),
            });
        }
    };

    // hound widens every integer depth to i32
    reader
        .samples::<i32>()
        .map(|s| s.map(|v| (v as f64 / scale) as f32))
        .collect::<std::result::Result<Vec<f32>, _>>()
        .map_err(|e| LadderError::InvalidAudio {
            reason: format!("Failed to read {}-bit samples: {}", bits_per_sample, e),
            source: Some(Box::new(e)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_missing_file() {
        let result = read_wav(Path::new("/definitely/not/here.wav"));
        assert!(matches!(result, Err(LadderError::FileNotFound { .. })));
    }

    #[test]
    fn test_float_round_trip_is_exact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let buffer =
            SampleBuffer::from_channels(vec![vec![0.25, -0.5, 1.0], vec![0.0, 0.125, -1.0]], 44100)
                .unwrap();

        write_wav(&buffer, &path, WavFormat::float()).unwrap();
        let read = read_wav(&path).unwrap();
        assert_eq!(read, buffer);
    }

    #[test]
    fn test_mono_file_is_upmixed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let mono = SampleBuffer::from_channels(vec![vec![0.5, -0.5, 0.25, 0.0]], 22050).unwrap();

        write_wav(&mono, &path, WavFormat::cd_quality()).unwrap();
        let read = read_wav(&path).unwrap();
        assert_eq!(read.channels(), 2);
        assert_eq!(read.frames(), 4);
        assert_eq!(read.channel(0), read.channel(1));
        assert!((read.channel(0)[0] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_unsupported_bit_depth() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("odd.wav");
        let buffer = SampleBuffer::stereo(4, 8000);
        let result = write_wav(&buffer, &path, WavFormat::new(12));
        assert!(matches!(result, Err(LadderError::UnsupportedFormat { .. })));
    }
}
