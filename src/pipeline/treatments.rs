//! Treatments
//!
//! Full-length renderings of one input that segment mode mixes together,
//! plus the window loop that renders the ladder itself.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::config::{BeepKind, PipelineConfig};
use crate::dsp::{
    blend, duplicate_stereo, notch, overlay, place_stereo, tone_frames, tone_prefix, LadderSchedule,
    MixLayout, NotchDesign, Step, StepPlan, ToneKind, TreatmentSet,
};
use crate::engine::SampleBuffer;
use crate::error::{LadderError, Result};
use crate::params::{keys, ParameterStore};

// ============================================================================
// Resolved parameters
// ============================================================================

/// Ladder settings resolved from the store for one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LadderParams {
    pub schedule: LadderSchedule,
    pub q_factor: f64,
    pub filter_ratio: f64,
    pub beep_ratio: f64,
    pub design: NotchDesign,
    pub layout: MixLayout,
    pub beep: ToneKind,
}

impl LadderParams {
    /// Read every ladder parameter once
    pub fn resolve(store: &ParameterStore, config: &PipelineConfig) -> Result<Self> {
        let beep = match config.beep {
            BeepKind::Pure => ToneKind::Pure,
            BeepKind::AmplitudeModulated => ToneKind::AmplitudeModulated {
                mod_freq: store.get(keys::AM_MOD_FREQ)?,
            },
            BeepKind::FrequencyModulated => ToneKind::FrequencyModulated {
                mod_freq: store.get(keys::FM_MOD_FREQ)?,
                index: store.get(keys::FM_MOD_INDEX)?,
            },
            BeepKind::BandNoise => ToneKind::BandNoise {
                bandwidth: store.get(keys::NOISE_BANDWIDTH)?,
                seed: config.noise_seed,
            },
        };

        Ok(Self {
            schedule: LadderSchedule {
                start_freq: store.get(keys::START_FREQ)?,
                end_freq: store.get(keys::END_FREQ)?,
                bandwidth: store.get(keys::BANDWIDTH)?,
                step_duration: store.get(keys::STEP_DURATION)?,
                beep_duration: store.get(keys::BEEP_DURATION)?,
            },
            q_factor: store.get(keys::Q_FACTOR)?,
            filter_ratio: store.get(keys::FILTER_MIX_RATIO)?,
            beep_ratio: store.get(keys::BEEP_MIX_RATIO)?,
            design: config.design,
            layout: config.layout,
            beep,
        })
    }

    /// Beep waveform for window `index`; noise gets a fresh seed per window
    fn beep_for_window(&self, index: usize) -> ToneKind {
        match self.beep {
            ToneKind::BandNoise { bandwidth, seed } => ToneKind::BandNoise {
                bandwidth,
                seed: seed.wrapping_add(index as u64),
            },
            kind => kind,
        }
    }
}

/// Full-length treatment settings resolved from the store
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreatmentParams {
    pub tinnitus_freq: f64,
    pub notch_q: f64,
    pub fm_mod_freq: f64,
    pub fm_mod_index: f64,
    pub noise_bandwidth: f64,
    pub segment_duration: f64,
    pub noise_seed: u64,
}

impl TreatmentParams {
    pub fn resolve(store: &ParameterStore, config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            tinnitus_freq: store.get(keys::TINNITUS_FREQ)?,
            notch_q: store.get(keys::NOTCH_Q)?,
            fm_mod_freq: store.get(keys::FM_MOD_FREQ)?,
            fm_mod_index: store.get(keys::FM_MOD_INDEX)?,
            noise_bandwidth: store.get(keys::NOISE_BANDWIDTH)?,
            segment_duration: store.get(keys::SEGMENT_DURATION)?,
            noise_seed: config.noise_seed,
        })
    }
}

// ============================================================================
// Ladder rendering
// ============================================================================

/// Result of the window loop
#[derive(Debug, Clone)]
pub struct LadderOutput {
    pub buffer: SampleBuffer,
    pub windows: usize,
    pub degraded_windows: usize,
}

/// Render the stepped notch and beep over every planned window
///
/// Windows are processed in order and each one writes only its own frame
/// range. A window whose filter or beep cannot be built keeps the original
/// samples for that sub-range and counts as degraded.
///
/// # Errors
/// `Cancelled` when `cancel` is set between two windows.
pub fn render_ladder(
    input: &SampleBuffer,
    plan: &StepPlan,
    params: &LadderParams,
    cancel: Option<&AtomicBool>,
) -> Result<LadderOutput> {
    let mut output = input.clone();
    let mut degraded_windows = 0;

    for (index, step) in plan.iter().enumerate() {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(LadderError::Cancelled {
                windows_done: index,
            });
        }

        debug!(
            "Window {} [{}..{}) at {:.1} Hz on {:?}",
            index, step.window_start, step.window_end, step.target_frequency, step.active_channel
        );

        let degraded = match params.layout {
            MixLayout::Split => split_window(input, &mut output, step, index, params),
            MixLayout::Overlay => overlay_window(input, &mut output, step, index, params),
        };
        if degraded {
            degraded_windows += 1;
        }
    }

    Ok(LadderOutput {
        buffer: output,
        windows: plan.len(),
        degraded_windows,
    })
}

fn window_beep(
    step: &Step,
    index: usize,
    params: &LadderParams,
    sample_rate: u32,
) -> Result<SampleBuffer> {
    let len = step.beep_range().len();
    let kind = params.beep_for_window(index);
    let mut mono = tone_prefix(
        step.target_frequency,
        params.schedule.beep_duration,
        len,
        sample_rate,
        &kind,
    )?;
    mono.resize(len, 0.0);
    Ok(place_stereo(&mono, step.active_channel, sample_rate))
}

fn notch_width(params: &LadderParams, center_hz: f64) -> f64 {
    params.design.width_from_q(center_hz, params.q_factor)
}

/// Split layout; returns whether the window degraded
fn split_window(
    input: &SampleBuffer,
    output: &mut SampleBuffer,
    step: &Step,
    index: usize,
    params: &LadderParams,
) -> bool {
    let sr = input.sample_rate;
    let mut degraded = false;

    let beep_range = step.beep_range();
    if !beep_range.is_empty() {
        match window_beep(step, index, params, sr) {
            Ok(beep) => {
                for ch in 0..input.channels() {
                    blend(
                        &mut output.samples[ch][beep_range.clone()],
                        &input.samples[ch][beep_range.clone()],
                        beep.channel(ch),
                        params.beep_ratio,
                    );
                }
            }
            Err(e) => {
                warn!("Window {}: beep skipped, keeping original ({})", index, e);
                degraded = true;
            }
        }
    }

    let filter_range = step.filter_range();
    if !filter_range.is_empty() {
        let width = notch_width(params, step.target_frequency);
        for ch in 0..input.channels() {
            let original = &input.samples[ch][filter_range.clone()];
            match notch(original, step.target_frequency, width, sr, params.design) {
                Ok(filtered) => blend(
                    &mut output.samples[ch][filter_range.clone()],
                    original,
                    &filtered,
                    params.filter_ratio,
                ),
                Err(e) => {
                    warn!("Window {}: filter skipped, keeping original ({})", index, e);
                    degraded = true;
                    break;
                }
            }
        }
        if degraded {
            output.copy_range_from(input, filter_range);
        }
    }

    degraded
}

/// Overlay layout; returns whether the window degraded
fn overlay_window(
    input: &SampleBuffer,
    output: &mut SampleBuffer,
    step: &Step,
    index: usize,
    params: &LadderParams,
) -> bool {
    let sr = input.sample_rate;
    let window = step.window();
    let width = notch_width(params, step.target_frequency);

    let rendered = window_beep(step, index, params, sr).and_then(|beep| {
        let mut filtered = Vec::with_capacity(input.channels());
        for ch in 0..input.channels() {
            filtered.push(notch(
                &input.samples[ch][window.clone()],
                step.target_frequency,
                width,
                sr,
                params.design,
            )?);
        }
        Ok((beep, filtered))
    });

    match rendered {
        Ok((beep, filtered)) => {
            for ch in 0..input.channels() {
                // Beep covers the head of the window, silence after
                let mut beep_track = vec![0.0_f32; window.len()];
                beep_track[..beep.frames()].copy_from_slice(beep.channel(ch));
                overlay(
                    &mut output.samples[ch][window.clone()],
                    &input.samples[ch][window.clone()],
                    &filtered[ch],
                    &beep_track,
                    params.filter_ratio,
                    params.beep_ratio,
                );
            }
            false
        }
        Err(e) => {
            warn!("Window {}: keeping original ({})", index, e);
            output.copy_range_from(input, window);
            true
        }
    }
}

// ============================================================================
// Full-length treatments
// ============================================================================

/// The treatments segment mode can mix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Treatment {
    /// The input as is
    Original,
    /// Whole input notched at the tinnitus frequency
    Notched,
    /// Stepped notch and beep
    Ladder,
    /// FM tone at the tinnitus frequency on both channels
    Fm,
    /// Tinnitus-matched band noise on both channels
    Noise,
}

impl Treatment {
    pub const ALL: [Treatment; 5] = [
        Treatment::Original,
        Treatment::Notched,
        Treatment::Ladder,
        Treatment::Fm,
        Treatment::Noise,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Treatment::Original => "original",
            Treatment::Notched => "notched",
            Treatment::Ladder => "ladder",
            Treatment::Fm => "fm",
            Treatment::Noise => "noise",
        }
    }
}

impl FromStr for Treatment {
    type Err = LadderError;

    fn from_str(s: &str) -> Result<Self> {
        Treatment::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| LadderError::InvalidParameter {
                name: "treatment".to_string(),
                value: s.to_string(),
                expected: "original, notched, ladder, fm or noise".to_string(),
            })
    }
}

/// A planned ladder, needed only when a recipe uses the `ladder` treatment
#[derive(Debug, Clone, Copy)]
pub struct LadderRun<'a> {
    pub params: &'a LadderParams,
    pub plan: &'a StepPlan,
}

/// Everything needed to render the treatments of one input
pub struct TreatmentContext<'a> {
    pub input: &'a SampleBuffer,
    pub params: &'a TreatmentParams,
    pub design: NotchDesign,
    pub ladder: Option<LadderRun<'a>>,
    pub cancel: Option<&'a AtomicBool>,
}

/// Output of [`TreatmentContext::render_set`]
#[derive(Debug, Clone)]
pub struct RenderedTreatments {
    pub set: TreatmentSet,
    /// Ladder windows rendered; zero when no recipe uses the ladder
    pub windows: usize,
    pub degraded_windows: usize,
}

impl TreatmentContext<'_> {
    /// Render one treatment
    ///
    /// Notch or noise designs that fail fall back to the original input.
    pub fn render(&self, treatment: Treatment) -> Result<SampleBuffer> {
        let input = self.input;
        let sr = input.sample_rate;
        let p = self.params;

        match treatment {
            Treatment::Original => Ok(input.clone()),
            Treatment::Notched => {
                let width = self.design.width_from_q(p.tinnitus_freq, p.notch_q);
                let channels: Result<Vec<Vec<f32>>> = input
                    .samples
                    .iter()
                    .map(|ch| notch(ch, p.tinnitus_freq, width, sr, self.design))
                    .collect();
                recover(treatment, input, channels.map(|samples| SampleBuffer {
                    samples,
                    sample_rate: sr,
                }))
            }
            Treatment::Ladder => Ok(self.render_ladder()?.buffer),
            Treatment::Fm => {
                let kind = ToneKind::FrequencyModulated {
                    mod_freq: p.fm_mod_freq,
                    index: p.fm_mod_index,
                };
                let fm = tone_frames(p.tinnitus_freq, input.frames(), sr, &kind)?;
                Ok(duplicate_stereo(fm, sr))
            }
            Treatment::Noise => {
                let kind = ToneKind::BandNoise {
                    bandwidth: p.noise_bandwidth,
                    seed: p.noise_seed,
                };
                let noise = tone_frames(p.tinnitus_freq, input.frames(), sr, &kind)
                    .map(|mono| duplicate_stereo(mono, sr));
                recover(treatment, input, noise)
            }
        }
    }

    /// Render every named treatment that is recognized
    ///
    /// Unrecognized names are left out so segment blending can report
    /// them against the recipe that uses them.
    pub fn render_set<'n>(
        &self,
        names: impl IntoIterator<Item = &'n str>,
    ) -> Result<RenderedTreatments> {
        let mut rendered = RenderedTreatments {
            set: TreatmentSet::new(self.input.frames(), self.input.sample_rate),
            windows: 0,
            degraded_windows: 0,
        };
        for name in names {
            if rendered.set.contains(name) {
                continue;
            }
            let Ok(treatment) = name.parse::<Treatment>() else {
                continue;
            };
            debug!("Rendering treatment '{}'", name);
            let buffer = match treatment {
                Treatment::Ladder => {
                    let ladder = self.render_ladder()?;
                    rendered.windows = ladder.windows;
                    rendered.degraded_windows = ladder.degraded_windows;
                    ladder.buffer
                }
                other => self.render(other)?,
            };
            rendered.set.insert(name, buffer);
        }
        Ok(rendered)
    }

    fn render_ladder(&self) -> Result<LadderOutput> {
        let run = self.ladder.ok_or_else(|| LadderError::InvalidParameter {
            name: "treatment".to_string(),
            value: Treatment::Ladder.name().to_string(),
            expected: "a planned ladder schedule".to_string(),
        })?;
        render_ladder(self.input, run.plan, run.params, self.cancel)
    }
}

fn recover(
    treatment: Treatment,
    input: &SampleBuffer,
    rendered: Result<SampleBuffer>,
) -> Result<SampleBuffer> {
    match rendered {
        Err(e) if e.is_recoverable() => {
            warn!(
                "Treatment '{}' fell back to the original input ({})",
                treatment.name(),
                e
            );
            Ok(input.clone())
        }
        other => other,
    }
}
