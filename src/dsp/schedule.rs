//! Step Scheduler
//!
//! Splits the timeline into fixed-length windows and assigns each one a
//! target frequency from the wrapping ladder plus the channel that
//! carries its beep.

use std::ops::Range;

use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::mix::SegmentPlan;
use super::synth::Channel;
use crate::error::{LadderError, Result};

/// Ladder parameters resolved from the parameter store
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LadderSchedule {
    pub start_freq: f64,
    pub end_freq: f64,
    /// Frequency increment between successive windows
    pub bandwidth: f64,
    /// Window length in seconds
    pub step_duration: f64,
    /// Beep length at the head of each window, in seconds
    pub beep_duration: f64,
}

/// How the beep channel is chosen per window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelSelection {
    /// Left, right, left, ...
    #[default]
    Alternating,
    /// Seeded coin flip per window
    Random { seed: u64 },
    /// Every beep on both channels
    Both,
}

/// One scheduled window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub window_start: usize,
    pub window_end: usize,
    /// End of the beep sub-range, start of the filter sub-range
    pub beep_end: usize,
    pub target_frequency: f64,
    pub active_channel: Channel,
    /// Owning segment recipe, filled in segment mode
    pub treatment_id: Option<String>,
}

impl Step {
    /// Full window range
    pub fn window(&self) -> Range<usize> {
        self.window_start..self.window_end
    }

    /// Frames reserved for the beep
    pub fn beep_range(&self) -> Range<usize> {
        self.window_start..self.beep_end
    }

    /// Frames left for filtering (possibly empty)
    pub fn filter_range(&self) -> Range<usize> {
        self.beep_end..self.window_end
    }

    pub fn len(&self) -> usize {
        self.window_end - self.window_start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered windows covering `[0, total_frames)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepPlan {
    pub steps: Vec<Step>,
    pub step_frames: usize,
    pub beep_frames: usize,
    pub total_frames: usize,
}

impl StepPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Step> {
        self.steps.iter()
    }

    /// Target frequency of every window, in order
    pub fn frequencies(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.target_frequency).collect()
    }

    /// Tag each window with the recipe of the segment it starts in
    pub fn annotate_segments(&mut self, segments: &SegmentPlan) {
        for step in &mut self.steps {
            step.treatment_id = segments
                .segment_at(step.window_start)
                .map(|segment| segments.recipe_of(segment).name.clone());
        }
    }
}

impl<'a> IntoIterator for &'a StepPlan {
    type Item = &'a Step;
    type IntoIter = std::slice::Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

fn invalid(name: &str, value: impl ToString, expected: &str) -> LadderError {
    LadderError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

fn validate(schedule: &LadderSchedule, sample_rate: u32) -> Result<()> {
    if sample_rate == 0 {
        return Err(invalid("sample_rate", sample_rate, "a positive sample rate"));
    }
    if !schedule.start_freq.is_finite() {
        return Err(invalid("start_freq", schedule.start_freq, "a finite frequency"));
    }
    if !schedule.end_freq.is_finite() || schedule.end_freq < schedule.start_freq {
        return Err(invalid(
            "end_freq",
            schedule.end_freq,
            "a finite frequency not below start_freq",
        ));
    }
    if !(schedule.bandwidth > 0.0 && schedule.bandwidth.is_finite()) {
        return Err(invalid("bandwidth", schedule.bandwidth, "a positive frequency step"));
    }
    if !(schedule.step_duration > 0.0 && schedule.step_duration.is_finite()) {
        return Err(invalid(
            "step_duration",
            schedule.step_duration,
            "a positive number of seconds",
        ));
    }
    if !(schedule.beep_duration >= 0.0 && schedule.beep_duration.is_finite()) {
        return Err(invalid(
            "beep_duration",
            schedule.beep_duration,
            "a non-negative number of seconds",
        ));
    }
    Ok(())
}

/// Plan the ladder windows for a buffer of `total_frames` frames
///
/// # Arguments
/// * `schedule` - Frequency range, increment and window timing
/// * `sample_rate` - Sample rate of the buffer being treated
/// * `total_frames` - Frames to cover
/// * `channels` - Beep channel strategy
///
/// # Errors
/// `InvalidParameter` for a zero sample rate, a non-positive increment,
/// non-finite values, or a step shorter than one frame.
///
/// # Example
/// ```
/// use notchladder::dsp::{plan, ChannelSelection, LadderSchedule};
///
/// let schedule = LadderSchedule {
///     start_freq: 9000.0,
///     end_freq: 10000.0,
///     bandwidth: 500.0,
///     step_duration: 0.1,
///     beep_duration: 0.01,
/// };
/// let steps = plan(&schedule, 1000, 200, ChannelSelection::Alternating).unwrap();
/// assert_eq!(steps.frequencies(), vec![9000.0, 9500.0]);
/// ```
pub fn plan(
    schedule: &LadderSchedule,
    sample_rate: u32,
    total_frames: usize,
    channels: ChannelSelection,
) -> Result<StepPlan> {
    validate(schedule, sample_rate)?;

    let fs = sample_rate as f64;
    let step_frames = (schedule.step_duration * fs).floor() as usize;
    if step_frames == 0 {
        return Err(invalid(
            "step_duration",
            schedule.step_duration,
            "at least one frame per step",
        ));
    }
    // A beep never outlasts its window
    let beep_frames = ((schedule.beep_duration * fs).floor() as usize).min(step_frames);

    let mut rng = match channels {
        ChannelSelection::Random { seed } => Some(ChaCha8Rng::seed_from_u64(seed)),
        _ => None,
    };

    let mut steps = Vec::with_capacity(total_frames.div_ceil(step_frames));
    let mut frequency = schedule.start_freq;
    let mut channel = Channel::Left;

    for window_start in (0..total_frames).step_by(step_frames) {
        let window_end = window_start.saturating_add(step_frames).min(total_frames);
        let beep_end = (window_start + beep_frames).min(window_end);

        let active_channel = match (channels, rng.as_mut()) {
            (ChannelSelection::Both, _) => Channel::Both,
            (ChannelSelection::Random { .. }, Some(rng)) => {
                if rng.random_bool(0.5) {
                    Channel::Left
                } else {
                    Channel::Right
                }
            }
            _ => {
                let current = channel;
                channel = channel.other();
                current
            }
        };

        steps.push(Step {
            window_start,
            window_end,
            beep_end,
            target_frequency: frequency,
            active_channel,
            treatment_id: None,
        });

        frequency += schedule.bandwidth;
        if frequency > schedule.end_freq {
            frequency = schedule.start_freq;
        }
    }

    debug!(
        "Planned {} windows of {} frames ({} beep frames) over {} frames",
        steps.len(),
        step_frames,
        beep_frames,
        total_frames
    );

    Ok(StepPlan {
        steps,
        step_frames,
        beep_frames,
        total_frames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::mix::SegmentRecipe;

    fn ladder(start: f64, end: f64, bw: f64) -> LadderSchedule {
        LadderSchedule {
            start_freq: start,
            end_freq: end,
            bandwidth: bw,
            step_duration: 0.1,
            beep_duration: 0.01,
        }
    }

    #[test]
    fn test_two_windows_at_1khz() {
        let plan = plan(&ladder(9000.0, 10000.0, 500.0), 1000, 200, Default::default()).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.step_frames, 100);
        assert_eq!(plan.steps[0].window(), 0..100);
        assert_eq!(plan.steps[1].window(), 100..200);
        assert_eq!(plan.frequencies(), vec![9000.0, 9500.0]);
        assert_eq!(plan.steps[0].beep_range(), 0..10);
        assert_eq!(plan.steps[0].filter_range(), 10..100);
    }

    #[test]
    fn test_frequency_wraps_to_start() {
        let plan = plan(&ladder(9000.0, 10000.0, 500.0), 1000, 1000, Default::default()).unwrap();
        assert_eq!(
            plan.frequencies(),
            vec![9000.0, 9500.0, 10000.0, 9000.0, 9500.0, 10000.0, 9000.0, 9500.0, 10000.0, 9000.0]
        );
    }

    #[test]
    fn test_frequencies_non_decreasing_until_wrap() {
        for (start, end, bw) in [(100.0, 1000.0, 70.0), (8996.0, 11000.0, 500.0), (50.0, 51.0, 3.0)]
        {
            let plan = plan(&ladder(start, end, bw), 1000, 5000, Default::default()).unwrap();
            let freqs = plan.frequencies();
            assert_eq!(freqs[0], start);
            for pair in freqs.windows(2) {
                assert!(pair[1] >= pair[0] || pair[1] == start);
                assert!(pair[1] <= end.max(start));
            }
        }
    }

    #[test]
    fn test_windows_cover_exactly() {
        for total in [0, 1, 99, 100, 101, 257, 1000] {
            let plan = plan(&ladder(100.0, 200.0, 10.0), 1000, total, Default::default()).unwrap();
            let mut expected_start = 0;
            for step in &plan {
                assert_eq!(step.window_start, expected_start);
                assert!(step.len() <= plan.step_frames);
                assert!(step.beep_end >= step.window_start && step.beep_end <= step.window_end);
                expected_start = step.window_end;
            }
            assert_eq!(expected_start, total);
        }
    }

    #[test]
    fn test_beep_longer_than_step() {
        let schedule = LadderSchedule {
            beep_duration: 0.2,
            ..ladder(9000.0, 10000.0, 500.0)
        };
        let plan = plan(&schedule, 1000, 250, Default::default()).unwrap();
        assert!(plan.iter().all(|s| s.filter_range().is_empty()));
        assert_eq!(plan.steps[2].beep_range(), 200..250);
        assert_eq!(plan.beep_frames, plan.step_frames);
    }

    #[test]
    fn test_huge_beep_duration_is_clamped() {
        let schedule = LadderSchedule {
            beep_duration: 1e17,
            ..ladder(9000.0, 10000.0, 500.0)
        };
        let plan = plan(&schedule, 8000, 1600, Default::default()).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.beep_frames, 800);
        assert_eq!(plan.steps[1].beep_range(), 800..1600);
        assert!(plan.iter().all(|s| s.filter_range().is_empty()));
    }

    #[test]
    fn test_alternating_channels() {
        let plan = plan(&ladder(100.0, 200.0, 10.0), 1000, 400, Default::default()).unwrap();
        let channels: Vec<Channel> = plan.iter().map(|s| s.active_channel).collect();
        assert_eq!(
            channels,
            vec![Channel::Left, Channel::Right, Channel::Left, Channel::Right]
        );
    }

    #[test]
    fn test_random_channels_reproducible() {
        let schedule = ladder(100.0, 200.0, 10.0);
        let a = plan(&schedule, 1000, 5000, ChannelSelection::Random { seed: 42 }).unwrap();
        let b = plan(&schedule, 1000, 5000, ChannelSelection::Random { seed: 42 }).unwrap();
        assert_eq!(a, b);

        let channels: Vec<Channel> = a.iter().map(|s| s.active_channel).collect();
        assert!(channels.contains(&Channel::Left));
        assert!(channels.contains(&Channel::Right));
    }

    #[test]
    fn test_both_channels() {
        let plan = plan(&ladder(100.0, 200.0, 10.0), 1000, 300, ChannelSelection::Both).unwrap();
        assert!(plan.iter().all(|s| s.active_channel == Channel::Both));
    }

    #[test]
    fn test_invalid_inputs() {
        let base = ladder(100.0, 200.0, 10.0);
        let cases = [
            (LadderSchedule { bandwidth: 0.0, ..base }, 1000),
            (LadderSchedule { bandwidth: -5.0, ..base }, 1000),
            (LadderSchedule { start_freq: f64::NAN, ..base }, 1000),
            (LadderSchedule { end_freq: 50.0, ..base }, 1000),
            (LadderSchedule { step_duration: 0.0001, ..base }, 1000),
            (base, 0),
        ];
        for (schedule, sr) in cases {
            let result = plan(&schedule, sr, 100, Default::default());
            assert!(
                matches!(result, Err(LadderError::InvalidParameter { .. })),
                "{:?} at {} Hz",
                schedule,
                sr
            );
        }
    }

    #[test]
    fn test_annotate_segments() {
        let recipes = vec![
            SegmentRecipe::new("a", vec![("original", 1.0)]),
            SegmentRecipe::new("b", vec![("original", 1.0)]),
        ];
        let segments = SegmentPlan::build(recipes, 150, 400).unwrap();
        let mut plan = plan(&ladder(100.0, 200.0, 10.0), 1000, 400, Default::default()).unwrap();
        plan.annotate_segments(&segments);

        let ids: Vec<Option<&str>> = plan.iter().map(|s| s.treatment_id.as_deref()).collect();
        assert_eq!(ids, vec![Some("a"), Some("a"), Some("b"), Some("a")]);
    }
}
