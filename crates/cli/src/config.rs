//! Configuration management for the CLI

use anyhow::{Context, Result};
use scaler_lib::PolicyConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI defaults, stored as JSON
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// AWS region
    pub region: Option<String>,
    /// Named AWS profile
    pub profile: Option<String>,
    /// Default output format
    pub default_format: Option<String>,
    /// Policy overrides; defaults apply when absent
    pub policy: Option<PolicyConfig>,
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("scalectl").join("config.json"))
    }
}
