//! Scaler configuration

use anyhow::{Context, Result};
use scaler_lib::{reconcile::Mode, PolicyConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "/etc/ecs-scaler/scaler.toml";

/// Scaler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScalerConfig {
    /// AWS region of the managed environments
    #[serde(default = "default_region")]
    pub region: String,

    /// Named AWS profile; the default credential chain when unset
    #[serde(default)]
    pub profile: Option<String>,

    #[serde(default)]
    pub mode: Mode,

    /// Compute and log changes without writing them
    #[serde(default)]
    pub dry_run: bool,

    /// Slack incoming webhook for run notifications
    #[serde(default)]
    pub slack_webhook: Option<String>,

    /// Name shown in front of notifications
    #[serde(default = "default_source_name")]
    pub source_name: String,

    /// node_exporter textfile written at the end of a run
    #[serde(default)]
    pub metrics_textfile: Option<PathBuf>,

    #[serde(default)]
    pub policy: PolicyConfig,
}

fn default_region() -> String {
    "us-east-2".to_string()
}

fn default_source_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "ecs-scaler".to_string())
}

impl ScalerConfig {
    /// Load configuration from the config file and `SCALER_*` environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var("SCALER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        Self::from_sources(&path, environment())
    }

    fn from_sources(path: &Path, env: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(env)
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let config: ScalerConfig = config
            .try_deserialize()
            .context("Invalid scaler configuration")?;
        config.policy.validate()?;
        Ok(config)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("SCALER")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
