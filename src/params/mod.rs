//! Parameter Store
//!
//! Named numeric parameters with defaults, user overrides and localized
//! descriptions. The store is a plain value owned by the pipeline; it never
//! reads or writes files itself (see [`persist`] for that).

mod defaults;
pub mod persist;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{LadderError, Result};

pub use defaults::{builtin_definitions, BUILTIN_LANGUAGES};

/// Recognized parameter names
pub mod keys {
    pub const START_FREQ: &str = "start_freq";
    pub const END_FREQ: &str = "end_freq";
    pub const BANDWIDTH: &str = "bandwidth";
    pub const STEP_DURATION: &str = "step_duration";
    pub const BEEP_DURATION: &str = "beep_duration";
    pub const Q_FACTOR: &str = "q_factor";
    pub const FILTER_MIX_RATIO: &str = "filter_mix_ratio";
    pub const BEEP_MIX_RATIO: &str = "beep_mix_ratio";

    // Multi-treatment mode
    pub const TINNITUS_FREQ: &str = "tinnitus_freq";
    pub const NOTCH_Q: &str = "notch_q";
    pub const FM_MOD_FREQ: &str = "fm_mod_freq";
    pub const FM_MOD_INDEX: &str = "fm_mod_index";
    pub const AM_MOD_FREQ: &str = "am_mod_freq";
    pub const NOISE_BANDWIDTH: &str = "noise_bandwidth";
    pub const SEGMENT_DURATION: &str = "segment_duration";
}

/// Definition of one parameter: its default and its descriptions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Default value, used when no override is set
    pub default: f64,
    /// Display unit ("Hz", "s", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Description per language code
    #[serde(default)]
    pub description: BTreeMap<String, String>,
}

/// A full definitions document: languages plus parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinitions {
    /// Language codes descriptions may be requested in
    pub supported_languages: Vec<String>,
    /// Parameter definitions keyed by name
    pub parameters: BTreeMap<String, ParameterDef>,
}

/// One row of the parameter listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterInfo {
    pub name: String,
    pub value: f64,
    pub default: f64,
    pub overridden: bool,
    pub unit: Option<String>,
    pub description: String,
}

/// Parameter store with defaults, overrides and translations
///
/// # Example
/// ```
/// use notchladder::params::{keys, ParameterStore};
///
/// let mut store = ParameterStore::builtin();
/// assert_eq!(store.get(keys::BANDWIDTH).unwrap(), 500.0);
///
/// store.set(keys::BANDWIDTH, 250.0).unwrap();
/// assert_eq!(store.get(keys::BANDWIDTH).unwrap(), 250.0);
/// assert!(store.get("speed").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ParameterStore {
    definitions: BTreeMap<String, ParameterDef>,
    overrides: BTreeMap<String, f64>,
    languages: Vec<String>,
    language: String,
}

impl ParameterStore {
    /// Create a store from a definitions document
    ///
    /// The first supported language becomes the active one.
    pub fn new(definitions: ParameterDefinitions) -> Self {
        let language = definitions
            .supported_languages
            .first()
            .cloned()
            .unwrap_or_else(|| "en".to_string());

        Self {
            definitions: definitions.parameters,
            overrides: BTreeMap::new(),
            languages: definitions.supported_languages,
            language,
        }
    }

    /// Create a store holding the built-in defaults
    pub fn builtin() -> Self {
        Self::new(builtin_definitions())
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// Resolved value: the override if present, else the default
    pub fn get(&self, name: &str) -> Result<f64> {
        let def = self.definition(name)?;
        Ok(self.overrides.get(name).copied().unwrap_or(def.default))
    }

    /// Record an override without touching the default
    pub fn set(&mut self, name: &str, value: f64) -> Result<()> {
        self.definition(name)?;
        if !value.is_finite() {
            return Err(LadderError::InvalidParameter {
                name: name.to_string(),
                value: value.to_string(),
                expected: "a finite number".to_string(),
            });
        }
        self.overrides.insert(name.to_string(), value);
        Ok(())
    }

    /// Drop the override for `name`, returning the previous override
    pub fn reset(&mut self, name: &str) -> Result<Option<f64>> {
        self.definition(name)?;
        Ok(self.overrides.remove(name))
    }

    /// Apply a whole override set; stops at the first unknown name
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, f64>) -> Result<()> {
        for (name, &value) in overrides {
            self.set(name, value)?;
        }
        Ok(())
    }

    /// Current overrides, for explicit export
    pub fn overrides(&self) -> &BTreeMap<String, f64> {
        &self.overrides
    }

    /// Make the current overrides the new defaults and clear them
    pub fn promote_overrides(&mut self) {
        for (name, value) in std::mem::take(&mut self.overrides) {
            if let Some(def) = self.definitions.get_mut(&name) {
                def.default = value;
            }
        }
    }

    /// Check whether `name` is a known parameter
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Known parameter names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    // ========================================================================
    // Translations
    // ========================================================================

    /// Localized description of a parameter
    ///
    /// Falls back to the parameter name when the language is supported but
    /// has no text for this parameter.
    pub fn describe(&self, name: &str, language: &str) -> Result<String> {
        self.check_language(language)?;
        let def = self.definition(name)?;
        Ok(def
            .description
            .get(language)
            .cloned()
            .unwrap_or_else(|| name.to_string()))
    }

    /// Switch the language used by [`info`](Self::info)
    pub fn set_language(&mut self, language: &str) -> Result<()> {
        self.check_language(language)?;
        self.language = language.to_string();
        Ok(())
    }

    /// Active language code
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Registered language codes
    pub fn supported_languages(&self) -> &[String] {
        &self.languages
    }

    /// Every parameter with its resolved value, in the active language
    pub fn info(&self) -> Vec<ParameterInfo> {
        self.definitions
            .iter()
            .map(|(name, def)| ParameterInfo {
                name: name.clone(),
                value: self.overrides.get(name).copied().unwrap_or(def.default),
                default: def.default,
                overridden: self.overrides.contains_key(name),
                unit: def.unit.clone(),
                description: def
                    .description
                    .get(&self.language)
                    .cloned()
                    .unwrap_or_else(|| name.clone()),
            })
            .collect()
    }

    /// Snapshot of the definitions (defaults only) for saving
    pub fn definitions(&self) -> ParameterDefinitions {
        ParameterDefinitions {
            supported_languages: self.languages.clone(),
            parameters: self.definitions.clone(),
        }
    }

    fn definition(&self, name: &str) -> Result<&ParameterDef> {
        self.definitions
            .get(name)
            .ok_or_else(|| LadderError::UnknownParameter {
                name: name.to_string(),
            })
    }

    fn check_language(&self, language: &str) -> Result<()> {
        if self.languages.iter().any(|l| l == language) {
            Ok(())
        } else {
            Err(LadderError::UnsupportedLanguage {
                code: language.to_string(),
            })
        }
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::builtin()
    }
}
