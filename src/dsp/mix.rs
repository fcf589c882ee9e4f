//! Mixing Engine
//!
//! Intra-window blends (beep and filter sub-ranges) and the segment-level
//! weighted sum of whole treatments. Every write targets a disjoint frame
//! range, so each output sample is computed exactly once.

use std::collections::BTreeMap;
use std::ops::Range;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::engine::{SampleBuffer, STEREO};
use crate::error::{LadderError, Result};

/// Tolerance for strict weight sums
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

// ============================================================================
// Intra-window blending
// ============================================================================

/// `out = (1 - ratio) * original + ratio * other`
///
/// `ratio` is used as given; values outside `[0, 1]` are allowed.
///
/// # Panics
/// All three slices must have the same length.
pub fn blend(out: &mut [f32], original: &[f32], other: &[f32], ratio: f64) {
    assert_eq!(out.len(), original.len(), "blend length mismatch");
    assert_eq!(out.len(), other.len(), "blend length mismatch");

    let r = ratio as f32;
    let keep = 1.0 - r;
    for ((o, &x), &y) in out.iter_mut().zip(original).zip(other) {
        *o = keep * x + r * y;
    }
}

/// `out = (1 - f - b) * original + f * filtered + b * beep`
///
/// # Panics
/// All slices must have the same length.
pub fn overlay(
    out: &mut [f32],
    original: &[f32],
    filtered: &[f32],
    beep: &[f32],
    filter_ratio: f64,
    beep_ratio: f64,
) {
    assert_eq!(out.len(), original.len(), "overlay length mismatch");
    assert_eq!(out.len(), filtered.len(), "overlay length mismatch");
    assert_eq!(out.len(), beep.len(), "overlay length mismatch");

    let f = filter_ratio as f32;
    let b = beep_ratio as f32;
    let keep = 1.0 - f - b;
    for (((o, &x), &y), &z) in out.iter_mut().zip(original).zip(filtered).zip(beep) {
        *o = keep * x + f * y + b * z;
    }
}

/// How the beep and the filtered signal share a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MixLayout {
    /// Beep sub-range blended with the tone, the rest with the filtered slice
    #[default]
    Split,
    /// Whole window filtered, beep laid over its head, one three-way blend
    Overlay,
}

// ============================================================================
// Segments
// ============================================================================

/// A named mix of treatments applied to one segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecipe {
    pub name: String,
    /// Ordered `(treatment, weight)` pairs
    pub weights: Vec<(String, f64)>,
}

impl SegmentRecipe {
    pub fn new(name: impl Into<String>, weights: Vec<(&str, f64)>) -> Self {
        Self {
            name: name.into(),
            weights: weights
                .into_iter()
                .map(|(treatment, weight)| (treatment.to_string(), weight))
                .collect(),
        }
    }

    /// Sum of all weights
    pub fn total_weight(&self) -> f64 {
        self.weights.iter().map(|(_, w)| w).sum()
    }
}

/// How segment weights are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeightMode {
    /// Weights are used as written
    #[default]
    Literal,
    /// Weights must sum to 1
    Strict,
}

/// One segment: a frame range owned by a recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    /// Index into [`SegmentPlan::recipes`]
    pub recipe: usize,
}

impl Segment {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Segments covering the timeline, cycling through the recipes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentPlan {
    pub recipes: Vec<SegmentRecipe>,
    pub segments: Vec<Segment>,
    pub total_frames: usize,
}

impl SegmentPlan {
    /// Cut `[0, total_frames)` into segments of `segment_frames`
    ///
    /// Segment `i` uses recipe `i % recipes.len()`.
    pub fn build(
        recipes: Vec<SegmentRecipe>,
        segment_frames: usize,
        total_frames: usize,
    ) -> Result<Self> {
        if recipes.is_empty() {
            return Err(LadderError::InvalidParameter {
                name: "segments".to_string(),
                value: "[]".to_string(),
                expected: "at least one segment recipe".to_string(),
            });
        }
        if segment_frames == 0 {
            return Err(LadderError::InvalidParameter {
                name: "segment_duration".to_string(),
                value: segment_frames.to_string(),
                expected: "at least one frame per segment".to_string(),
            });
        }

        let segments = (0..total_frames)
            .step_by(segment_frames)
            .enumerate()
            .map(|(i, start)| Segment {
                start,
                end: (start + segment_frames).min(total_frames),
                recipe: i % recipes.len(),
            })
            .collect();

        Ok(Self {
            recipes,
            segments,
            total_frames,
        })
    }

    /// Segment containing `frame`
    pub fn segment_at(&self, frame: usize) -> Option<&Segment> {
        self.segments
            .iter()
            .find(|s| s.start <= frame && frame < s.end)
    }

    pub fn recipe_of(&self, segment: &Segment) -> &SegmentRecipe {
        &self.recipes[segment.recipe]
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Named full-length renderings of one input, all of the same shape
#[derive(Debug, Clone)]
pub struct TreatmentSet {
    frames: usize,
    sample_rate: u32,
    buffers: BTreeMap<String, SampleBuffer>,
}

impl TreatmentSet {
    pub fn new(frames: usize, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate,
            buffers: BTreeMap::new(),
        }
    }

    /// Add or replace a treatment
    ///
    /// # Panics
    /// The buffer must be stereo with the set's frame count and sample rate.
    pub fn insert(&mut self, name: impl Into<String>, buffer: SampleBuffer) {
        assert_eq!(buffer.channels(), STEREO, "channel count mismatch");
        assert_eq!(buffer.frames(), self.frames, "frame count mismatch");
        assert_eq!(buffer.sample_rate, self.sample_rate, "sample rate mismatch");
        self.buffers.insert(name.into(), buffer);
    }

    pub fn get(&self, name: &str) -> Option<&SampleBuffer> {
        self.buffers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.buffers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

fn check_recipe(recipe: &SegmentRecipe, treatments: &TreatmentSet, mode: WeightMode) -> Result<()> {
    if let Some((missing, _)) = recipe.weights.iter().find(|(t, _)| !treatments.contains(t)) {
        return Err(LadderError::UnknownTreatment {
            name: missing.clone(),
            segment: recipe.name.clone(),
        });
    }

    if mode == WeightMode::Strict {
        let sum = recipe.total_weight();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(LadderError::UnnormalizedWeights {
                segment: recipe.name.clone(),
                sum,
            });
        }
    }
    Ok(())
}

/// Weighted sum of treatments, each segment using its own recipe
///
/// Every recipe is checked before any output is produced.
///
/// # Errors
/// `UnknownTreatment` if a recipe names a treatment missing from the set,
/// `UnnormalizedWeights` in strict mode when a recipe does not sum to 1.
///
/// # Panics
/// The plan must cover exactly the treatment length.
pub fn blend_segments(
    treatments: &TreatmentSet,
    plan: &SegmentPlan,
    mode: WeightMode,
) -> Result<SampleBuffer> {
    assert_eq!(plan.total_frames, treatments.frames(), "frame count mismatch");

    for recipe in &plan.recipes {
        check_recipe(recipe, treatments, mode)?;
    }

    let mut output = SampleBuffer::stereo(treatments.frames(), treatments.sample_rate());
    for segment in &plan.segments {
        let recipe = plan.recipe_of(segment);
        debug!(
            "Segment {}..{} uses '{}' ({} treatments)",
            segment.start,
            segment.end,
            recipe.name,
            recipe.weights.len()
        );

        for (name, weight) in &recipe.weights {
            // Checked above
            let Some(source) = treatments.get(name) else {
                continue;
            };
            let w = *weight as f32;
            for (dst, src) in output.samples.iter_mut().zip(&source.samples) {
                for (o, &s) in dst[segment.range()].iter_mut().zip(&src[segment.range()]) {
                    *o += w * s;
                }
            }
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn constant(value: f32, frames: usize) -> SampleBuffer {
        SampleBuffer {
            samples: vec![vec![value; frames]; 2],
            sample_rate: 1000,
        }
    }

    fn set() -> TreatmentSet {
        let mut treatments = TreatmentSet::new(10, 1000);
        treatments.insert("one", constant(1.0, 10));
        treatments.insert("two", constant(2.0, 10));
        treatments
    }

    #[test]
    fn test_blend_endpoints() {
        let original = [0.5, -0.25, 0.125];
        let other = [1.0, 1.0, 1.0];
        let mut out = [0.0; 3];

        blend(&mut out, &original, &other, 0.0);
        assert_eq!(out, original);

        blend(&mut out, &original, &other, 1.0);
        assert_eq!(out, other);

        blend(&mut out, &original, &other, 0.5);
        assert_relative_eq!(out[0], 0.75);
    }

    #[test]
    fn test_blend_ratio_not_clamped() {
        let mut out = [0.0; 1];
        blend(&mut out, &[1.0], &[0.0], 1.5);
        assert_relative_eq!(out[0], -0.5);
    }

    #[test]
    fn test_overlay() {
        let mut out = [0.0; 2];
        overlay(&mut out, &[1.0, 1.0], &[0.0, 0.0], &[2.0, 0.0], 0.0, 0.0);
        assert_eq!(out, [1.0, 1.0]);

        overlay(&mut out, &[1.0, 1.0], &[0.5, 0.5], &[2.0, 0.0], 0.25, 0.25);
        assert_relative_eq!(out[0], 0.5 + 0.125 + 0.5);
        assert_relative_eq!(out[1], 0.5 + 0.125);
    }

    #[test]
    #[should_panic(expected = "blend length mismatch")]
    fn test_blend_length_mismatch_panics() {
        let mut out = [0.0; 2];
        blend(&mut out, &[1.0], &[1.0, 2.0], 0.5);
    }

    #[test]
    fn test_segment_plan_cycles() {
        let recipes = vec![
            SegmentRecipe::new("a", vec![("one", 1.0)]),
            SegmentRecipe::new("b", vec![("two", 1.0)]),
            SegmentRecipe::new("c", vec![("one", 0.5)]),
        ];
        let plan = SegmentPlan::build(recipes, 4, 18).unwrap();
        let names: Vec<&str> = plan
            .segments
            .iter()
            .map(|s| plan.recipe_of(s).name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "a", "b"]);
        assert_eq!(plan.segments.last().unwrap().range(), 16..18);
        assert_eq!(plan.segment_at(5).unwrap().recipe, 1);
        assert!(plan.segment_at(18).is_none());
    }

    #[test]
    fn test_empty_recipes_rejected() {
        let result = SegmentPlan::build(Vec::new(), 4, 10);
        assert!(matches!(result, Err(LadderError::InvalidParameter { .. })));
    }

    #[test]
    fn test_blend_segments_literal() {
        let recipes = vec![
            SegmentRecipe::new("mix", vec![("one", 0.7), ("two", 0.7)]),
            SegmentRecipe::new("solo", vec![("two", 1.0)]),
        ];
        let plan = SegmentPlan::build(recipes, 5, 10).unwrap();
        let out = blend_segments(&set(), &plan, WeightMode::Literal).unwrap();

        // 0.7 * 1 + 0.7 * 2, no renormalization
        assert_relative_eq!(out.samples[0][0], 2.1, epsilon = 1e-6);
        assert_relative_eq!(out.samples[1][4], 2.1, epsilon = 1e-6);
        assert_relative_eq!(out.samples[0][5], 2.0);
        assert_relative_eq!(out.samples[1][9], 2.0);
    }

    #[test]
    fn test_strict_weights() {
        let recipes = vec![SegmentRecipe::new("off", vec![("one", 0.7), ("two", 0.7)])];
        let plan = SegmentPlan::build(recipes, 5, 10).unwrap();
        let result = blend_segments(&set(), &plan, WeightMode::Strict);
        assert!(matches!(
            result,
            Err(LadderError::UnnormalizedWeights { ref segment, .. }) if segment == "off"
        ));

        let recipes = vec![SegmentRecipe::new("ok", vec![("one", 0.7), ("two", 0.3)])];
        let plan = SegmentPlan::build(recipes, 5, 10).unwrap();
        let out = blend_segments(&set(), &plan, WeightMode::Strict).unwrap();
        assert_relative_eq!(out.samples[0][3], 1.3, epsilon = 1e-6);
    }

    #[test]
    fn test_unknown_treatment() {
        let recipes = vec![SegmentRecipe::new("bad", vec![("three", 1.0)])];
        let plan = SegmentPlan::build(recipes, 5, 10).unwrap();
        let result = blend_segments(&set(), &plan, WeightMode::Literal);
        assert!(matches!(
            result,
            Err(LadderError::UnknownTreatment { ref name, .. }) if name == "three"
        ));
    }
}
