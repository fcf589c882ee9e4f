//! JSON persistence for parameter definitions and overrides.
//!
//! Definitions hold defaults and translations; overrides are a flat
//! `name -> value` map. Nothing here is called implicitly by the store.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, warn};

use super::ParameterDefinitions;
use crate::error::{LadderError, Result};

/// Load a definitions document
pub fn load_definitions(path: &Path) -> Result<ParameterDefinitions> {
    if !path.exists() {
        return Err(LadderError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let content = fs::read_to_string(path)?;
    let definitions: ParameterDefinitions = serde_json::from_str(&content)?;
    debug!(
        "Loaded {} parameter definitions from {}",
        definitions.parameters.len(),
        path.display()
    );
    Ok(definitions)
}

/// Save a definitions document as pretty JSON
pub fn save_definitions(definitions: &ParameterDefinitions, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(definitions)?;
    fs::write(path, content)?;
    Ok(())
}

/// Load an override map; a missing file yields no overrides
pub fn load_overrides(path: &Path) -> Result<BTreeMap<String, f64>> {
    if !path.exists() {
        warn!("Overrides file {} not found, using defaults", path.display());
        return Ok(BTreeMap::new());
    }

    let content = fs::read_to_string(path)?;
    let overrides: BTreeMap<String, f64> = serde_json::from_str(&content)?;
    Ok(overrides)
}

/// Save an override map as pretty JSON
pub fn save_overrides(overrides: &BTreeMap<String, f64>, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(overrides)?;
    fs::write(path, content)?;
    debug!("Saved {} overrides to {}", overrides.len(), path.display());
    Ok(())
}
