//! Built-in parameter definitions with English and Dutch descriptions.

use std::collections::BTreeMap;

use super::{keys, ParameterDef, ParameterDefinitions};

/// Languages the built-in descriptions are written in
pub const BUILTIN_LANGUAGES: [&str; 2] = ["en", "nl"];

fn def(default: f64, unit: &str, en: &str, nl: &str) -> ParameterDef {
    let mut description = BTreeMap::new();
    description.insert("en".to_string(), en.to_string());
    description.insert("nl".to_string(), nl.to_string());
    ParameterDef {
        default,
        unit: Some(unit.to_string()),
        description,
    }
}

/// The default parameter set used when no definitions file is given
pub fn builtin_definitions() -> ParameterDefinitions {
    let entries = [
        (
            keys::START_FREQ,
            def(
                8996.0,
                "Hz",
                "Starting frequency of the ladder filter",
                "Start frequentie van de ladder functie",
            ),
        ),
        (
            keys::END_FREQ,
            def(
                11000.0,
                "Hz",
                "Ending frequency of the ladder filter",
                "Eind frequentie van de ladder functie",
            ),
        ),
        (
            keys::BANDWIDTH,
            def(
                500.0,
                "Hz",
                "Frequency step between successive ladder windows",
                "Frequentiestap tussen opeenvolgende ladder vensters",
            ),
        ),
        (
            keys::STEP_DURATION,
            def(
                0.1,
                "s",
                "Duration of each frequency step",
                "Duur van elke frequentiestap",
            ),
        ),
        (
            keys::BEEP_DURATION,
            def(
                0.01,
                "s",
                "Duration of the stereo beep",
                "Duur van de stereo pieptoon",
            ),
        ),
        (
            keys::Q_FACTOR,
            def(
                30.0,
                "",
                "Q-factor of the notch filters",
                "Q-factor van de notch filters",
            ),
        ),
        (
            keys::FILTER_MIX_RATIO,
            def(
                0.1,
                "ratio",
                "Ratio of filtered to original audio",
                "Verhouding gefilterde tot originele audio",
            ),
        ),
        (
            keys::BEEP_MIX_RATIO,
            def(
                0.4,
                "ratio",
                "Ratio of beep to original audio",
                "Verhouding pieptoon tot originele audio",
            ),
        ),
        (
            keys::TINNITUS_FREQ,
            def(
                9996.0,
                "Hz",
                "Matched tinnitus frequency",
                "Gevonden tinnitus frequentie",
            ),
        ),
        (
            keys::NOTCH_Q,
            def(
                30.0,
                "",
                "Q-factor of the full-length notch treatment",
                "Q-factor van de doorlopende notch behandeling",
            ),
        ),
        (
            keys::FM_MOD_FREQ,
            def(
                5.0,
                "Hz",
                "Modulation frequency of the FM tone",
                "Modulatiefrequentie van de FM toon",
            ),
        ),
        (
            keys::FM_MOD_INDEX,
            def(
                10.0,
                "",
                "Modulation index of the FM tone",
                "Modulatie-index van de FM toon",
            ),
        ),
        (
            keys::AM_MOD_FREQ,
            def(
                5.0,
                "Hz",
                "Modulation frequency of the AM beep",
                "Modulatiefrequentie van de AM pieptoon",
            ),
        ),
        (
            keys::NOISE_BANDWIDTH,
            def(
                1000.0,
                "Hz",
                "Bandwidth of the tinnitus-matched noise",
                "Bandbreedte van de op tinnitus afgestemde ruis",
            ),
        ),
        (
            keys::SEGMENT_DURATION,
            def(
                4.0,
                "s",
                "Duration of each treatment segment",
                "Duur van elk behandelsegment",
            ),
        ),
    ];

    ParameterDefinitions {
        supported_languages: BUILTIN_LANGUAGES.iter().map(|s| s.to_string()).collect(),
        parameters: entries
            .into_iter()
            .map(|(name, def)| (name.to_string(), def))
            .collect(),
    }
}
