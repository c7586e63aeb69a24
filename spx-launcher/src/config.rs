//! Launcher configuration file (`<config dir>/SPX/config.json`)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::defaults::{DEFAULT_HELP_URL, DEFAULT_SUPPORT_URL};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine the user config directory")]
    NoConfigDir,

    #[error("Failed to read config {0}: {1}")]
    FileRead(PathBuf, std::io::Error),

    #[error("Failed to write config {0}: {1}")]
    FileWrite(PathBuf, std::io::Error),

    #[error("Invalid config JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
}

/// Persisted launcher settings.
///
/// The file is shared with earlier launcher releases, so keys stay camelCase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LauncherConfig {
    /// Path to the `spx-server` binary, or to the folder containing it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spx_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_url: Option<String>,

    /// Maximum number of retained server log lines (0 = unbounded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_capacity: Option<usize>,
}

impl LauncherConfig {
    /// Load from the default location; a missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = crate::paths::config_file().ok_or(ConfigError::NoConfigDir)?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::FileWrite(parent.to_path_buf(), e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| ConfigError::FileWrite(path.to_path_buf(), e))
    }

    /// `helpUrl`, or the built-in help page
    pub fn help_url(&self) -> &str {
        self.help_url.as_deref().unwrap_or(DEFAULT_HELP_URL)
    }

    /// `supportUrl`, or the built-in support page
    pub fn support_url(&self) -> &str {
        self.support_url.as_deref().unwrap_or(DEFAULT_SUPPORT_URL)
    }
}
