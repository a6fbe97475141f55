//! ECS scaler - day/night capacity reconciliation
//!
//! This binary is started by cron. Each run classifies the current hour,
//! discovers environments and reconciles them once, then exits.

use anyhow::{Context, Result};
use scaler_lib::{
    notify::SlackNotifier,
    observability::{RunMetrics, StructuredLogger},
    AwsPlatform, Reconciler, TimePeriod,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting ecs-scaler");

    let config = config::ScalerConfig::load()?;
    info!(
        region = %config.region,
        mode = %config.mode,
        dry_run = config.dry_run,
        "Scaler configured"
    );

    let platform = AwsPlatform::connect(&config.region, config.profile.as_deref()).await;
    let metrics = RunMetrics::new().context("Failed to register run metrics")?;

    let mut reconciler = Reconciler::new(Arc::new(platform), config.policy.clone())?
        .with_logger(StructuredLogger::new(&config.source_name))
        .with_metrics(metrics.clone())
        .with_dry_run(config.dry_run);

    if let Some(webhook) = &config.slack_webhook {
        let notifier = SlackNotifier::new(webhook, &config.source_name)?;
        reconciler = reconciler.with_notifier(Arc::new(notifier));
    }

    let report = reconciler
        .run(config.mode, TimePeriod::now())
        .await
        .context("Environment discovery failed")?;

    if let Some(path) = &config.metrics_textfile {
        if let Err(e) = metrics.write_textfile(path) {
            warn!(path = %path.display(), error = %e, "Failed to write metrics textfile");
        }
    }

    if report.failed() > 0 {
        warn!(
            failed = report.failed(),
            "Some environments could not be reconciled"
        );
    }

    Ok(())
}
