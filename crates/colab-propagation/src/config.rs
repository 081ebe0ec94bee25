//! Engine and simulator configuration
//!
//! Both load from the `[engine]` / `[simulator]` tables of a TOML file
//! through [`FileConfig`]; missing keys fall back to the defaults.

use serde::{Deserialize, Serialize};

/// Propagation engine limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deepest hierarchy level a cascade may reach before it is aborted
    pub max_cascade_depth: usize,
    /// Longest accepted category name, in characters
    pub max_category_len: usize,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With cascade depth limit
    #[inline]
    #[must_use]
    pub fn with_max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth;
        self
    }

    /// With category length limit
    #[inline]
    #[must_use]
    pub fn with_max_category_len(mut self, len: usize) -> Self {
        self.max_category_len = len;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: 64,
            max_category_len: 255,
        }
    }
}

/// Randomized simulator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Operations to generate
    pub total_operations: u64,
    /// Cards above this count are no longer created
    pub max_cards: usize,
    pub stop_on_first_violation: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            total_operations: 1000,
            max_cards: 40,
            stop_on_first_violation: true,
        }
    }
}

/// On-disk configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub engine: EngineConfig,
    pub simulator: SimulatorConfig,
}

impl FileConfig {
    /// Parse TOML text
    ///
    /// # Errors
    /// Malformed TOML or mistyped values
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
