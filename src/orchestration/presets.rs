//! Immutable preset registry handed to the task graph builder.

use std::collections::BTreeMap;

use crate::config::PresetTable;
use crate::error::{DockingError, Result};
use crate::models::{RunOptionOverrides, RunOptions};

#[derive(Debug, Clone, PartialEq)]
pub struct PresetRegistry {
    /// Keys are lowercase
    presets: BTreeMap<String, RunOptions>,
}

impl PresetRegistry {
    pub fn new(table: &PresetTable) -> Self {
        Self {
            presets: table
                .0
                .iter()
                .map(|(name, options)| (name.to_ascii_lowercase(), *options))
                .collect(),
        }
    }

    /// Case-insensitive lookup
    pub fn get(&self, name: &str) -> Option<&RunOptions> {
        self.presets.get(&name.trim().to_ascii_lowercase())
    }

    /// Resolve a preset and merge overrides on top, field by field.
    /// Returns the normalised preset name with the options.
    pub fn resolve(
        &self,
        name: &str,
        overrides: &RunOptionOverrides,
    ) -> Result<(String, RunOptions)> {
        let normalized = name.trim().to_ascii_lowercase();
        let base = self
            .presets
            .get(&normalized)
            .ok_or_else(|| DockingError::UnknownPreset(name.to_string()))?;
        Ok((normalized, base.with_overrides(overrides)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }
}

impl Default for PresetRegistry {
    fn default() -> Self {
        Self::new(&PresetTable::default())
    }
}
