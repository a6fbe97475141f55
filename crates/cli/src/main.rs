//! ECS scaler CLI
//!
//! A command-line tool for inspecting environments, previewing the
//! day/night plan and running a reconciliation on demand.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use commands::{discover, period, reconcile, settings};
use scaler_lib::{reconcile::Mode, AwsPlatform, Reconciler, TimePeriod};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_REGION: &str = "us-east-2";

/// ECS day/night scaler CLI
#[derive(Parser)]
#[command(name = "scalectl")]
#[command(author, version, about = "CLI for the ECS day/night capacity scaler", long_about = None)]
pub struct Cli {
    /// AWS region (falls back to the config file, then us-east-2)
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Named AWS profile
    #[arg(long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show whether an hour counts as day or night
    Period {
        /// Hour to classify (defaults to the local clock)
        #[arg(long)]
        hour: Option<u32>,
    },

    /// List environments that follow the stack naming convention
    Discover {
        /// Only show this environment code
        #[arg(long)]
        env: Option<String>,
    },

    /// Preview the changes a run would make
    Plan {
        /// Only plan this environment code
        #[arg(long)]
        env: Option<String>,

        /// Variants to plan (pool, services, all)
        #[arg(long, default_value = "all")]
        mode: Mode,

        /// Plan for this hour instead of the local clock
        #[arg(long)]
        hour: Option<u32>,
    },

    /// Reconcile environments for the current period
    Apply {
        /// Only apply to this environment code
        #[arg(long)]
        env: Option<String>,

        /// Variants to apply (pool, services, all)
        #[arg(long, default_value = "all")]
        mode: Mode,
    },

    /// Show or change stored defaults
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the stored defaults
    Show,

    /// Store new defaults
    Set {
        /// Default AWS region
        #[arg(long)]
        region: Option<String>,

        /// Default AWS profile
        #[arg(long)]
        profile: Option<String>,

        /// Default output format
        #[arg(long)]
        format: Option<output::OutputFormat>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let config = config::Config::load()?;
    let format = match cli.format {
        Some(format) => format,
        None => config
            .default_format
            .as_deref()
            .and_then(|f| output::OutputFormat::from_str(f, true).ok())
            .unwrap_or_default(),
    };

    // Execute command
    match cli.command {
        Commands::Period { hour } => {
            period::show_period(hour, format)?;
        }
        Commands::Discover { env } => {
            let reconciler = connect(&cli.region, &cli.profile, &config, env).await?;
            discover::list_environments(&reconciler, format).await?;
        }
        Commands::Plan { env, mode, hour } => {
            let hour = period::resolve_hour(hour)?;
            let reconciler = connect(&cli.region, &cli.profile, &config, env).await?;
            reconcile::plan(reconciler, mode, TimePeriod::from_hour(hour), format).await?;
        }
        Commands::Apply { env, mode } => {
            let reconciler = connect(&cli.region, &cli.profile, &config, env).await?;
            reconcile::apply(reconciler, mode, format).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => settings::show(&config, format)?,
            ConfigAction::Set {
                region,
                profile,
                format,
            } => settings::set(config, &config::Config::path()?, region, profile, format)?,
        },
    }

    Ok(())
}

/// Build a reconciler against AWS using flags, then the config file, then defaults
async fn connect(
    region: &Option<String>,
    profile: &Option<String>,
    config: &config::Config,
    env: Option<String>,
) -> Result<Reconciler> {
    let region = region
        .clone()
        .or_else(|| config.region.clone())
        .unwrap_or_else(|| DEFAULT_REGION.to_string());
    let profile = profile.clone().or_else(|| config.profile.clone());

    let platform = AwsPlatform::connect(&region, profile.as_deref()).await;
    let policy = config.policy.clone().unwrap_or_default();

    let mut reconciler = Reconciler::new(Arc::new(platform), policy)
        .context("Invalid scaling policy in config file")?
        .with_logger(scaler_lib::StructuredLogger::new("scalectl"));
    if let Some(env) = env {
        reconciler = reconciler.with_env_filter(env);
    }
    Ok(reconciler)
}
