//! Configuration loading and management.
//!
//! The CLI loads its settings from a TOML file or falls back to the
//! embedded default baked into the binary.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::PathBuf;

// this file will be baked into the binary as default if no --config option is used
const DEFAULT_CONFIG_STR: &str = include_str!("default_config.toml");

/// Engine/CLI configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct EngineConfig {
    /// General session defaults
    pub general: Option<GeneralConfig>,
    /// Startup SQL
    pub init: Option<InitConfig>,
}

/// Session defaults.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct GeneralConfig {
    /// Autocommit default for new sessions
    pub autocommit: Option<bool>,
    /// Start with the statement recorder on
    pub recording: Option<bool>,
}

/// SQL executed when the engine starts.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct InitConfig {
    /// Files run in order before the first prompt
    pub files: Option<Vec<PathBuf>>,
}

impl EngineConfig {
    /// Whether new sessions start with autocommit on (default true).
    #[must_use]
    pub fn autocommit(&self) -> bool {
        self.general
            .as_ref()
            .and_then(|g| g.autocommit)
            .unwrap_or(true)
    }

    /// Whether the recorder starts active (default false).
    #[must_use]
    pub fn recording(&self) -> bool {
        self.general
            .as_ref()
            .and_then(|g| g.recording)
            .unwrap_or(false)
    }

    /// Startup SQL files, in order.
    #[must_use]
    pub fn init_files(&self) -> Vec<PathBuf> {
        self.init
            .as_ref()
            .and_then(|i| i.files.clone())
            .unwrap_or_default()
    }
}

/// Loads configuration from a file or uses the embedded default.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML content is
/// invalid.
pub fn load_config(user_path: Option<PathBuf>) -> Result<EngineConfig, Box<dyn Error>> {
    let config_content = match user_path {
        Some(path) => std::fs::read_to_string(path)?,
        None => DEFAULT_CONFIG_STR.to_string(),
    };

    let config: EngineConfig = toml::from_str(&config_content)?;
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn embedded_default_parses() {
        let config: EngineConfig = toml::from_str(DEFAULT_CONFIG_STR).unwrap();
        assert!(config.autocommit());
        assert!(!config.recording());
        assert!(config.init_files().is_empty());
    }

    #[test]
    fn overrides_win() {
        let config: EngineConfig =
            toml::from_str("[general]\nautocommit = false\nrecording = true\n").unwrap();
        assert!(!config.autocommit());
        assert!(config.recording());
    }
}
