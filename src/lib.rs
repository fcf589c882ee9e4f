//! Notchladder - Offline Tinnitus Treatment Rendering
//!
//! Renders a stepped-notch treatment over a music file: the timeline is cut
//! into short windows, each window is notch-filtered at a target frequency
//! that climbs a wrapping ladder, and a short beep at that frequency is laid
//! on one stereo channel at the start of the window.
//!
//! # Architecture
//!
//! - `params`: named numeric parameters with defaults, overrides and
//!   localized descriptions
//! - `dsp`: filter, synthesizer, scheduler, mixer and normalizer stages
//! - `pipeline`: the driver that owns one run and sequences the stages
//! - `engine`: sample buffers and WAV I/O at the edges
//! - `cli`: the `notchladder-cli` command surface

pub mod cli;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod params;
pub mod pipeline;

pub use error::{LadderError, Result};
