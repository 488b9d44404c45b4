//! Configuration loading from files.

use super::types::{ConfigSource, RuntimeConfig};
use super::validator::ConfigValidator;
use std::path::Path;

/// Configuration loader.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a JSON file, validating before returning it.
    pub fn load_json(path: &Path) -> Result<RuntimeConfig, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file: {e}"))?;

        let mut config: RuntimeConfig =
            serde_json::from_str(&content).map_err(|e| format!("failed to parse JSON: {e}"))?;
        config.source = ConfigSource::File;

        ConfigValidator::validate_all(&config)?;
        Ok(config)
    }
}
