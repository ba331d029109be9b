//! Pass configuration from `wavefront.toml`.
//!
//! ```toml
//! [split-vectors]
//! enabled = true
//! eliminate-dead-splits = true
//! validate = false
//! ```
//!
//! Every key is optional. Environment variables override the file:
//! `WAVEFRONT_NO_SPLIT_VECTORS` disables the pass and
//! `WAVEFRONT_KEEP_DEAD_SPLITS` keeps unused splits (both for debugging).

use serde::Deserialize;
use std::path::Path;

/// `[split-vectors]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SplitVectorsConfig {
    /// Run the pass at all
    pub enabled: bool,
    /// Remove splits whose results are never read
    pub eliminate_dead_splits: bool,
    /// Validate the program after the pass
    pub validate: bool,
}

impl Default for SplitVectorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            eliminate_dead_splits: true,
            validate: cfg!(debug_assertions),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    #[serde(default)]
    split_vectors: Option<SplitVectorsConfig>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read wavefront.toml: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse wavefront.toml: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
        }
    }
}

impl SplitVectorsConfig {
    /// Parse the `[split-vectors]` table; a missing table gives the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
        Ok(raw.split_vectors.unwrap_or_default())
    }

    /// Read a config file and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).is_ok());
    }

    /// Apply overrides given a predicate telling whether a variable is set.
    pub fn apply_overrides(&mut self, is_set: impl Fn(&str) -> bool) {
        if is_set("WAVEFRONT_NO_SPLIT_VECTORS") {
            log::debug!("split_vectors disabled by WAVEFRONT_NO_SPLIT_VECTORS");
            self.enabled = false;
        }
        if is_set("WAVEFRONT_KEEP_DEAD_SPLITS") {
            self.eliminate_dead_splits = false;
        }
    }
}
