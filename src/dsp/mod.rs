//! DSP Stages
//!
//! The building blocks of the treatment pipeline: notch filtering, tone
//! synthesis, ladder scheduling, mixing and normalization. Each stage is a
//! set of free functions over sample slices or `SampleBuffer`s; strategy
//! enums select the variant once per run.

pub mod filter;
pub mod mix;
pub mod normalize;
pub mod schedule;
pub mod synth;

pub use filter::{
    butterworth, clamp_band, filtfilt, iir_notch, notch, Biquad, ButterKind, NotchDesign,
    DEFAULT_BAND_STOP_ORDER,
};
pub use mix::{
    blend, blend_segments, overlay, MixLayout, Segment, SegmentPlan, SegmentRecipe, TreatmentSet,
    WeightMode,
};
pub use normalize::{normalize, normalize_channels, Normalization};
pub use schedule::{plan, ChannelSelection, LadderSchedule, Step, StepPlan};
pub use synth::{
    duplicate_stereo, place_stereo, tone, tone_frames, tone_prefix, Channel, ToneKind,
};
