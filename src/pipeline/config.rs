//! Pipeline configuration
//!
//! Selects the strategies of a run. Numeric values live in the parameter
//! store; this only says *how* they are used. Every field has a default,
//! so `{}` is a valid configuration file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dsp::{
    ChannelSelection, MixLayout, NotchDesign, Normalization, SegmentRecipe, WeightMode,
};
use crate::error::{LadderError, Result};

/// Waveform of the per-window beep
///
/// Modulation settings come from the parameter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BeepKind {
    #[default]
    Pure,
    AmplitudeModulated,
    FrequencyModulated,
    BandNoise,
}

/// What a run produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineMode {
    /// Stepped notch plus beep over the whole input
    #[default]
    Ladder,
    /// Segment-wise weighted mix of full-length treatments
    Segments {
        #[serde(default = "default_recipes")]
        recipes: Vec<SegmentRecipe>,
        #[serde(default)]
        weight_mode: WeightMode,
        /// Peak-normalize each input channel before rendering, so recipe
        /// weights balance unit-peak audio against unit-amplitude tones
        #[serde(default = "default_normalize_input")]
        normalize_input: bool,
    },
}

fn default_normalize_input() -> bool {
    true
}

impl PipelineMode {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineMode::Ladder => "ladder",
            PipelineMode::Segments { .. } => "segments",
        }
    }

    /// Segment mode with the stock recipe rotation
    pub fn default_segments() -> Self {
        PipelineMode::Segments {
            recipes: default_recipes(),
            weight_mode: WeightMode::Literal,
            normalize_input: true,
        }
    }
}

/// Five-segment rotation: each treatment under the original, then all
/// of them together
pub fn default_recipes() -> Vec<SegmentRecipe> {
    vec![
        SegmentRecipe::new("original_notched", vec![("original", 0.7), ("notched", 0.3)]),
        SegmentRecipe::new("original_ladder", vec![("original", 0.7), ("ladder", 0.3)]),
        SegmentRecipe::new("original_fm", vec![("original", 0.7), ("fm", 0.3)]),
        SegmentRecipe::new("original_noise", vec![("original", 0.7), ("noise", 0.3)]),
        SegmentRecipe::new(
            "all_combined",
            vec![
                ("original", 0.4),
                ("notched", 0.15),
                ("ladder", 0.15),
                ("fm", 0.15),
                ("noise", 0.15),
            ],
        ),
    ]
}

/// Strategy selection for one pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub design: NotchDesign,
    pub channels: ChannelSelection,
    pub beep: BeepKind,
    pub layout: MixLayout,
    pub normalization: Normalization,
    pub mode: PipelineMode,
    /// Seed for band-noise synthesis
    pub noise_seed: u64,
}

impl PipelineConfig {
    /// Load a configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LadderError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
