//! Audio Engine Module
//!
//! Sample buffers and the WAV collaborator that feeds them:
//! - Sample buffer management
//! - File I/O operations

pub mod buffer;
pub mod io;

pub use buffer::{calculate_rms_db, linear_to_db, SampleBuffer, STEREO};
pub use io::{read_wav, write_wav, WavFormat};
