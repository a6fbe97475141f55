//! Stored CLI defaults

use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::Path;
use tabled::Tabled;

use crate::config::Config;
use crate::output::{print_success, print_table, OutputFormat};

#[derive(Tabled)]
struct SettingRow {
    #[tabled(rename = "Setting")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn rows(config: &Config) -> Vec<SettingRow> {
    let shown = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    vec![
        SettingRow {
            key: "region".to_string(),
            value: shown(&config.region),
        },
        SettingRow {
            key: "profile".to_string(),
            value: shown(&config.profile),
        },
        SettingRow {
            key: "format".to_string(),
            value: shown(&config.default_format),
        },
        SettingRow {
            key: "policy".to_string(),
            value: if config.policy.is_some() { "custom" } else { "default" }.to_string(),
        },
    ]
}

/// Print the stored defaults
pub fn show(config: &Config, format: OutputFormat) -> Result<()> {
    print_table(&rows(config), config, format);
    Ok(())
}

/// Merge the given values into `config`
fn merge(
    config: &mut Config,
    region: Option<String>,
    profile: Option<String>,
    format: Option<OutputFormat>,
) -> Result<()> {
    if region.is_none() && profile.is_none() && format.is_none() {
        bail!("nothing to set; pass --region, --profile or --format");
    }
    if region.is_some() {
        config.region = region;
    }
    if profile.is_some() {
        config.profile = profile;
    }
    if let Some(format) = format {
        config.default_format = format
            .to_possible_value()
            .map(|v| v.get_name().to_string());
    }
    Ok(())
}

/// Update the stored defaults and write them back to `path`
pub fn set(
    mut config: Config,
    path: &Path,
    region: Option<String>,
    profile: Option<String>,
    format: Option<OutputFormat>,
) -> Result<()> {
    merge(&mut config, region, profile, format)?;
    config.save_to(path)?;
    print_success(&format!("Saved {}", path.display()));
    Ok(())
}
