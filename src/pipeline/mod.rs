//! Pipeline Driver
//!
//! Owns the parameter store, the strategy configuration and the buffers of
//! one treatment run, and sequences the DSP stages:
//!
//! ```text
//! Idle --set_input--> Configured --execute--> Processing --> Done
//!                          ^                      |            |
//!                          +------ error ---------+            |
//!                          +------------ set_input ------------+
//! ```

pub mod config;
pub mod treatments;

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::dsp::{blend_segments, normalize_channels, plan, SegmentPlan, StepPlan};
use crate::engine::{SampleBuffer, STEREO};
use crate::error::{LadderError, Result};
use crate::params::ParameterStore;

pub use config::{default_recipes, BeepKind, PipelineConfig, PipelineMode};
pub use treatments::{
    render_ladder, LadderOutput, LadderParams, LadderRun, RenderedTreatments, Treatment,
    TreatmentContext, TreatmentParams,
};

/// Driver states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// No input bound
    #[default]
    Idle,
    /// Input bound, ready to execute
    Configured,
    /// Windows being rendered
    Processing,
    /// Output available
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "Idle"),
            PipelineState::Configured => write!(f, "Configured"),
            PipelineState::Processing => write!(f, "Processing"),
            PipelineState::Done => write!(f, "Done"),
        }
    }
}

/// Summary of one `execute` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Ladder windows rendered
    pub windows: usize,
    /// Windows that kept (part of) the original signal after a failure
    pub degraded_windows: usize,
    /// Segments blended (0 in ladder mode)
    pub segments: usize,
    /// Gain applied by normalization
    pub gain: f32,
    /// Output was silent, normalization skipped
    pub silent: bool,
}

/// Offline stepped-notch treatment of one input buffer
///
/// # Example
/// ```
/// use notchladder::engine::SampleBuffer;
/// use notchladder::params::{keys, ParameterStore};
/// use notchladder::pipeline::{PipelineConfig, PipelineState, TreatmentPipeline};
///
/// let mut store = ParameterStore::builtin();
/// store.set(keys::START_FREQ, 1000.0).unwrap();
/// store.set(keys::END_FREQ, 2000.0).unwrap();
///
/// let mut pipeline = TreatmentPipeline::new(store, PipelineConfig::default());
/// pipeline.set_input(SampleBuffer::new(1, 8000, 8000)).unwrap();
/// let report = pipeline.execute().unwrap();
///
/// assert_eq!(pipeline.state(), PipelineState::Done);
/// assert_eq!(report.windows, 10);
/// assert_eq!(pipeline.output().unwrap().channels(), 2);
/// ```
#[derive(Debug)]
pub struct TreatmentPipeline {
    store: ParameterStore,
    config: PipelineConfig,
    state: PipelineState,
    input: Option<SampleBuffer>,
    output: Option<SampleBuffer>,
    cancel: Option<Arc<AtomicBool>>,
}

impl TreatmentPipeline {
    pub fn new(store: ParameterStore, config: PipelineConfig) -> Self {
        Self {
            store,
            config,
            state: PipelineState::Idle,
            input: None,
            output: None,
            cancel: None,
        }
    }

    /// Share a flag that aborts `execute` between windows once set
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn set_cancel_flag(&mut self, flag: Option<Arc<AtomicBool>>) {
        self.cancel = flag;
    }

    // ========================================================================
    // Input
    // ========================================================================

    /// Bind an input buffer, replacing any previous input and output
    ///
    /// Mono input is duplicated to stereo.
    ///
    /// # Errors
    /// `InvalidAudio` for a zero sample rate or more than two channels,
    /// `NonFiniteSamples` if the input holds NaN or infinities.
    pub fn set_input(&mut self, buffer: SampleBuffer) -> Result<()> {
        if self.state == PipelineState::Processing {
            warn!("Input replaced while processing");
        }
        if buffer.sample_rate == 0 {
            return Err(LadderError::InvalidAudio {
                reason: "sample rate is zero".to_string(),
                source: None,
            });
        }

        let buffer = buffer.upmix_to_stereo();
        if buffer.channels() != STEREO {
            return Err(LadderError::InvalidAudio {
                reason: format!("expected 1 or 2 channels, got {}", buffer.channels()),
                source: None,
            });
        }
        if !buffer.is_finite() {
            return Err(LadderError::NonFiniteSamples);
        }

        debug!(
            "Input bound: {} frames at {} Hz ({:.2} s)",
            buffer.frames(),
            buffer.sample_rate,
            buffer.duration_secs()
        );
        self.input = Some(buffer);
        self.output = None;
        self.state = PipelineState::Configured;
        Ok(())
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Render the treatment for the bound input
    ///
    /// On success the driver is `Done` and the output is available. Any
    /// error returns it to `Configured` with the input still bound.
    ///
    /// # Errors
    /// `PipelineNotConfigured` if no input was bound; parameter errors from
    /// the store or scheduler; `Cancelled` if the cancel flag was raised.
    pub fn execute(&mut self) -> Result<RunReport> {
        if self.input.is_none() {
            return Err(LadderError::PipelineNotConfigured);
        }
        self.state = PipelineState::Processing;

        match self.run() {
            Ok((output, report)) => {
                self.output = Some(output);
                self.state = PipelineState::Done;
                Ok(report)
            }
            Err(e) => {
                self.state = PipelineState::Configured;
                Err(e)
            }
        }
    }

    fn run(&self) -> Result<(SampleBuffer, RunReport)> {
        let input = self.input.as_ref().ok_or(LadderError::PipelineNotConfigured)?;
        let cancel = self.cancel.as_deref();

        info!(
            "Processing {} frames at {} Hz in {} mode",
            input.frames(),
            input.sample_rate,
            self.config.mode.label()
        );

        let (mut output, windows, degraded_windows, segments) = match &self.config.mode {
            PipelineMode::Ladder => {
                let (ladder, steps) = self.plan_ladder(input)?;
                let rendered = render_ladder(input, &steps, &ladder, cancel)?;
                (rendered.buffer, rendered.windows, rendered.degraded_windows, 0)
            }
            PipelineMode::Segments {
                recipes,
                weight_mode,
                normalize_input,
            } => {
                let params = TreatmentParams::resolve(&self.store, &self.config)?;
                let segment_frames = segment_frames(params.segment_duration, input.sample_rate)?;
                let segments = SegmentPlan::build(recipes.clone(), segment_frames, input.frames())?;

                let uses_ladder = recipes.iter().any(|r| {
                    r.weights
                        .iter()
                        .any(|(name, _)| name == Treatment::Ladder.name())
                });
                let ladder = if uses_ladder {
                    let (ladder, mut steps) = self.plan_ladder(input)?;
                    steps.annotate_segments(&segments);
                    log_segments(&steps);
                    Some((ladder, steps))
                } else {
                    None
                };

                let source = if *normalize_input {
                    Cow::Owned(normalized_source(input)?)
                } else {
                    Cow::Borrowed(input)
                };

                let ctx = TreatmentContext {
                    input: &source,
                    params: &params,
                    design: self.config.design,
                    ladder: ladder
                        .as_ref()
                        .map(|(ladder, steps)| LadderRun {
                            params: ladder,
                            plan: steps,
                        }),
                    cancel,
                };
                let names = recipes
                    .iter()
                    .flat_map(|r| r.weights.iter().map(|(name, _)| name.as_str()));
                let rendered = ctx.render_set(names)?;
                let mixed = blend_segments(&rendered.set, &segments, *weight_mode)?;

                (mixed, rendered.windows, rendered.degraded_windows, segments.len())
            }
        };

        let (gain, silent) = self.normalize_output(&mut output)?;
        info!(
            "Done: {} windows ({} degraded), {} segments, gain {:.3}",
            windows, degraded_windows, segments, gain
        );

        Ok((
            output,
            RunReport {
                windows,
                degraded_windows,
                segments,
                gain,
                silent,
            },
        ))
    }

    fn plan_ladder(&self, input: &SampleBuffer) -> Result<(LadderParams, StepPlan)> {
        let ladder = LadderParams::resolve(&self.store, &self.config)?;
        let steps = plan(
            &ladder.schedule,
            input.sample_rate,
            input.frames(),
            self.config.channels,
        )?;
        debug!("Ladder planned: {} windows", steps.len());
        Ok((ladder, steps))
    }

    fn normalize_output(&self, output: &mut SampleBuffer) -> Result<(f32, bool)> {
        match self.config.normalization.apply(output) {
            Ok(gain) => Ok((gain, false)),
            Err(LadderError::SilentBuffer) => {
                warn!("Output is silent, skipping normalization");
                Ok((1.0, true))
            }
            Err(LadderError::NonFiniteSamples) => {
                warn!("Output has non-finite samples, zeroing them before normalization");
                for s in output.samples.iter_mut().flatten() {
                    if !s.is_finite() {
                        *s = 0.0;
                    }
                }
                match self.config.normalization.apply(output) {
                    Err(LadderError::SilentBuffer) => Ok((1.0, true)),
                    other => other.map(|gain| (gain, false)),
                }
            }
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Output of the last successful run
    pub fn output(&self) -> Option<&SampleBuffer> {
        self.output.as_ref()
    }

    /// Move the output out; the driver goes back to `Configured`
    pub fn take_output(&mut self) -> Option<SampleBuffer> {
        let output = self.output.take();
        if output.is_some() {
            self.state = PipelineState::Configured;
        }
        output
    }

    pub fn input(&self) -> Option<&SampleBuffer> {
        self.input.as_ref()
    }

    pub fn store(&self) -> &ParameterStore {
        &self.store
    }

    /// Mutable store access; changes apply to the next `execute`
    pub fn store_mut(&mut self) -> &mut ParameterStore {
        &mut self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: PipelineConfig) {
        self.config = config;
    }
}

fn segment_frames(segment_duration: f64, sample_rate: u32) -> Result<usize> {
    let frames = segment_duration * sample_rate as f64;
    if !(frames >= 1.0 && frames.is_finite()) {
        return Err(LadderError::InvalidParameter {
            name: "segment_duration".to_string(),
            value: segment_duration.to_string(),
            expected: "at least one frame per segment".to_string(),
        });
    }
    Ok(frames.floor() as usize)
}

/// Per-channel unit-peak copy of the input; silence passes through
fn normalized_source(input: &SampleBuffer) -> Result<SampleBuffer> {
    let mut source = input.clone();
    match normalize_channels(&mut source) {
        Ok(gains) => {
            debug!("Input normalized per channel, gains {:?}", gains);
            Ok(source)
        }
        Err(LadderError::SilentBuffer) => {
            debug!("Input is silent, skipping input normalization");
            Ok(source)
        }
        Err(e) => Err(e),
    }
}

fn log_segments(steps: &StepPlan) {
    for step in steps {
        if let Some(id) = &step.treatment_id {
            debug!(
                "Window [{}..{}) in segment '{}'",
                step.window_start, step.window_end, id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{Normalization, SegmentRecipe};
    use crate::params::keys;
    use std::sync::atomic::Ordering;

    fn segments_config(recipes: Vec<SegmentRecipe>, normalize_input: bool) -> PipelineConfig {
        PipelineConfig {
            mode: PipelineMode::Segments {
                recipes,
                weight_mode: Default::default(),
                normalize_input,
            },
            normalization: Normalization::Off,
            ..Default::default()
        }
    }

    fn scaled(buffer: SampleBuffer, gain: f32) -> SampleBuffer {
        SampleBuffer {
            samples: buffer
                .samples
                .into_iter()
                .map(|ch| ch.into_iter().map(|s| s * gain).collect())
                .collect(),
            sample_rate: buffer.sample_rate,
        }
    }

    fn low_ladder_store() -> ParameterStore {
        let mut store = ParameterStore::builtin();
        store.set(keys::START_FREQ, 1000.0).unwrap();
        store.set(keys::END_FREQ, 2000.0).unwrap();
        store.set(keys::TINNITUS_FREQ, 1500.0).unwrap();
        store.set(keys::SEGMENT_DURATION, 0.25).unwrap();
        store
    }

    fn noise_input(frames: usize) -> SampleBuffer {
        let left: Vec<f32> = (0..frames)
            .map(|i| ((i * 7919) % 200) as f32 / 400.0 - 0.25)
            .collect();
        let right: Vec<f32> = left.iter().rev().copied().collect();
        SampleBuffer {
            samples: vec![left, right],
            sample_rate: 8000,
        }
    }

    #[test]
    fn test_execute_without_input() {
        let mut pipeline =
            TreatmentPipeline::new(ParameterStore::builtin(), PipelineConfig::default());
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(matches!(
            pipeline.execute(),
            Err(LadderError::PipelineNotConfigured)
        ));
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[test]
    fn test_state_transitions() {
        let mut pipeline = TreatmentPipeline::new(low_ladder_store(), PipelineConfig::default());
        pipeline.set_input(noise_input(8000)).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Configured);

        pipeline.execute().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Done);
        assert!(pipeline.output().is_some());

        // Re-entrant after Done
        pipeline.set_input(noise_input(4000)).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Configured);
        assert!(pipeline.output().is_none());
        pipeline.execute().unwrap();
        assert_eq!(pipeline.output().unwrap().frames(), 4000);

        let out = pipeline.take_output().unwrap();
        assert_eq!(out.frames(), 4000);
        assert_eq!(pipeline.state(), PipelineState::Configured);
    }

    #[test]
    fn test_invalid_input_rejected() {
        let mut pipeline =
            TreatmentPipeline::new(ParameterStore::builtin(), PipelineConfig::default());
        let result = pipeline.set_input(SampleBuffer::new(1, 10, 0));
        assert!(matches!(result, Err(LadderError::InvalidAudio { .. })));

        let mut buffer = SampleBuffer::stereo(10, 8000);
        buffer.samples[1][3] = f32::INFINITY;
        assert!(matches!(
            pipeline.set_input(buffer),
            Err(LadderError::NonFiniteSamples)
        ));
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[test]
    fn test_bad_parameter_returns_to_configured() {
        let mut store = low_ladder_store();
        store.set(keys::BANDWIDTH, 0.0).unwrap();
        let mut pipeline = TreatmentPipeline::new(store, PipelineConfig::default());
        pipeline.set_input(noise_input(800)).unwrap();

        assert!(matches!(
            pipeline.execute(),
            Err(LadderError::InvalidParameter { .. })
        ));
        assert_eq!(pipeline.state(), PipelineState::Configured);

        pipeline.store_mut().reset(keys::BANDWIDTH).unwrap();
        assert!(pipeline.execute().is_ok());
    }

    #[test]
    fn test_cancellation() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut pipeline = TreatmentPipeline::new(low_ladder_store(), PipelineConfig::default())
            .with_cancel_flag(Arc::clone(&flag));
        pipeline.set_input(noise_input(8000)).unwrap();

        flag.store(true, Ordering::Relaxed);
        assert!(matches!(
            pipeline.execute(),
            Err(LadderError::Cancelled { windows_done: 0 })
        ));
        assert_eq!(pipeline.state(), PipelineState::Configured);

        flag.store(false, Ordering::Relaxed);
        assert_eq!(pipeline.execute().unwrap().windows, 10);
    }

    #[test]
    fn test_silent_input_reported() {
        let mut store = low_ladder_store();
        store.set(keys::BEEP_MIX_RATIO, 0.0).unwrap();
        let mut pipeline = TreatmentPipeline::new(store, PipelineConfig::default());
        pipeline.set_input(SampleBuffer::stereo(1600, 8000)).unwrap();

        let report = pipeline.execute().unwrap();
        assert!(report.silent);
        assert_eq!(report.gain, 1.0);
        assert!(pipeline.output().unwrap().is_silent());
    }

    #[test]
    fn test_segment_mode() {
        let config = PipelineConfig {
            mode: PipelineMode::default_segments(),
            ..Default::default()
        };
        let mut pipeline = TreatmentPipeline::new(low_ladder_store(), config);
        pipeline.set_input(noise_input(8000)).unwrap();

        let report = pipeline.execute().unwrap();
        // 1 s at 0.25 s per segment
        assert_eq!(report.segments, 4);
        assert_eq!(report.windows, 10);

        let out = pipeline.output().unwrap();
        assert_eq!(out.frames(), 8000);
        assert_eq!(out.peak(), 1.0);
    }

    #[test]
    fn test_segment_mode_unknown_treatment() {
        let config = PipelineConfig {
            mode: PipelineMode::Segments {
                recipes: vec![SegmentRecipe::new("x", vec![("reverb", 1.0)])],
                weight_mode: Default::default(),
                normalize_input: true,
            },
            ..Default::default()
        };
        let mut pipeline = TreatmentPipeline::new(low_ladder_store(), config);
        pipeline.set_input(noise_input(800)).unwrap();
        assert!(matches!(
            pipeline.execute(),
            Err(LadderError::UnknownTreatment { .. })
        ));
    }

    #[test]
    fn test_segment_mode_reports_degraded_windows() {
        // Built-in ladder starts above Nyquist at 8 kHz
        let mut store = ParameterStore::builtin();
        store.set(keys::TINNITUS_FREQ, 1500.0).unwrap();
        let config = segments_config(vec![SegmentRecipe::new("l", vec![("ladder", 1.0)])], true);
        let mut pipeline = TreatmentPipeline::new(store, config);
        pipeline.set_input(noise_input(8000)).unwrap();

        let report = pipeline.execute().unwrap();
        assert_eq!(report.windows, 10);
        assert_eq!(report.degraded_windows, 10);
    }

    #[test]
    fn test_segment_mode_without_ladder_skips_planning() {
        let mut store = low_ladder_store();
        store.set(keys::BANDWIDTH, 0.0).unwrap();
        let recipes = vec![SegmentRecipe::new(
            "tone",
            vec![("original", 0.5), ("fm", 0.5)],
        )];
        let mut pipeline = TreatmentPipeline::new(store, segments_config(recipes, true));
        pipeline.set_input(noise_input(4000)).unwrap();

        let report = pipeline.execute().unwrap();
        assert_eq!(report.windows, 0);
        assert_eq!(report.degraded_windows, 0);
        assert_eq!(report.segments, 2);
    }

    #[test]
    fn test_segment_mode_normalizes_quiet_input() {
        // Peak 0.1 on both channels
        let quiet = scaled(noise_input(8000), 0.4);
        let plain = vec![SegmentRecipe::new("plain", vec![("original", 1.0)])];

        let mut pipeline =
            TreatmentPipeline::new(low_ladder_store(), segments_config(plain.clone(), true));
        pipeline.set_input(quiet.clone()).unwrap();
        pipeline.execute().unwrap();
        let out = pipeline.take_output().unwrap();
        for ch in 0..2 {
            let peak = out.channel(ch).iter().fold(0.0f32, |m, s| m.max(s.abs()));
            assert_eq!(peak, 1.0);
        }

        let mut pipeline =
            TreatmentPipeline::new(low_ladder_store(), segments_config(plain, false));
        pipeline.set_input(quiet.clone()).unwrap();
        pipeline.execute().unwrap();
        assert_eq!(pipeline.output().unwrap(), &quiet);
    }

    #[test]
    fn test_default_recipes_keep_quiet_music_audible() {
        let quiet = scaled(noise_input(8000), 0.4);
        let recipes = default_recipes();

        let mut pipeline =
            TreatmentPipeline::new(low_ladder_store(), segments_config(recipes, true));
        pipeline.set_input(quiet).unwrap();
        pipeline.execute().unwrap();
        let out = pipeline.output().unwrap();

        // First segment is 0.7 original + 0.3 notched: mostly the input
        let first = &out.channel(0)[..2000];
        let peak = first.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.5, "original drowned out, peak {}", peak);
    }

    #[test]
    fn test_non_finite_mix_is_sanitized() {
        let mut store = low_ladder_store();
        // Overflows to an infinite f32 ratio in every beep range
        store.set(keys::BEEP_MIX_RATIO, 1e300).unwrap();
        let mut pipeline = TreatmentPipeline::new(store, PipelineConfig::default());
        pipeline.set_input(noise_input(1600)).unwrap();

        let report = pipeline.execute().unwrap();
        assert!(!report.silent);
        let out = pipeline.output().unwrap();
        assert!(out.is_finite());
        assert_eq!(out.peak(), 1.0);
        assert!(out.channel(0)[..80].iter().all(|&s| s == 0.0));
        assert!(out.channel(1)[800..880].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_pipeline_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<TreatmentPipeline>();
    }
}
