//! Observability for scaling runs
//!
//! Provides:
//! - Prometheus metrics for a single run, written in text exposition format
//!   for the node_exporter textfile collector
//! - Structured JSON logging with tracing

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::path::Path;
use tracing::{info, warn};

use crate::error::ScalingError;
use crate::models::{CapacitySnapshot, CapacityUpdate, EnvironmentKey};
use crate::reconcile::PoolBranch;
use crate::schedule::TimePeriod;

/// Counters and gauges describing one run
///
/// Each instance owns its registry, so several runs in one process do not
/// collide on metric registration.
#[derive(Clone)]
pub struct RunMetrics {
    registry: Registry,
    environments_discovered: IntGauge,
    environments_reconciled: IntCounter,
    environments_skipped: IntCounter,
    environments_failed: IntCounter,
    mutations_applied: IntCounter,
    last_run_timestamp: IntGauge,
}

impl RunMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let environments_discovered = IntGauge::new(
            "scaler_environments_discovered",
            "Environments matched by the naming convention in the last run",
        )?;
        let environments_reconciled = IntCounter::new(
            "scaler_environments_reconciled_total",
            "Environment reconciliations that completed",
        )?;
        let environments_skipped = IntCounter::new(
            "scaler_environments_skipped_total",
            "Environments skipped because a resource was not found",
        )?;
        let environments_failed = IntCounter::new(
            "scaler_environments_failed_total",
            "Environment reconciliations aborted by an error",
        )?;
        let mutations_applied = IntCounter::new(
            "scaler_mutations_applied_total",
            "Control-plane write calls issued",
        )?;
        let last_run_timestamp = IntGauge::new(
            "scaler_last_run_timestamp_seconds",
            "Unix time at which the last run finished",
        )?;

        registry.register(Box::new(environments_discovered.clone()))?;
        registry.register(Box::new(environments_reconciled.clone()))?;
        registry.register(Box::new(environments_skipped.clone()))?;
        registry.register(Box::new(environments_failed.clone()))?;
        registry.register(Box::new(mutations_applied.clone()))?;
        registry.register(Box::new(last_run_timestamp.clone()))?;

        Ok(Self {
            registry,
            environments_discovered,
            environments_reconciled,
            environments_skipped,
            environments_failed,
            mutations_applied,
            last_run_timestamp,
        })
    }

    pub fn set_environments_discovered(&self, count: usize) {
        self.environments_discovered.set(count as i64);
    }

    pub fn inc_reconciled(&self) {
        self.environments_reconciled.inc();
    }

    pub fn inc_skipped(&self) {
        self.environments_skipped.inc();
    }

    pub fn inc_failed(&self) {
        self.environments_failed.inc();
    }

    pub fn add_mutations(&self, count: usize) {
        self.mutations_applied.inc_by(count as u64);
    }

    pub fn mark_finished(&self) {
        self.last_run_timestamp.set(chrono::Utc::now().timestamp());
    }

    /// Text exposition of every metric
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Write the exposition atomically (temp file then rename)
    pub fn write_textfile(&self, path: &Path) -> std::io::Result<()> {
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, self.render())?;
        std::fs::rename(&tmp, path)
    }
}

/// Structured logger for scaling events
///
/// Every event carries `event` and `source` fields so log pipelines can
/// filter a run without parsing messages.
#[derive(Clone)]
pub struct StructuredLogger {
    source: String,
}

impl StructuredLogger {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn log_run_started(&self, mode: &str, period: TimePeriod, dry_run: bool) {
        info!(
            event = "run_started",
            source = %self.source,
            mode = %mode,
            period = %period,
            dry_run = dry_run,
            "Scaling run started"
        );
    }

    pub fn log_environment_discovered(&self, key: &EnvironmentKey, stack_name: &str) {
        info!(
            event = "environment_discovered",
            source = %self.source,
            tenant = %key.tenant,
            env = %key.env,
            stack = %stack_name,
            "Environment discovered"
        );
    }

    pub fn log_pool_scaled(
        &self,
        key: &EnvironmentKey,
        group: &str,
        branch: PoolBranch,
        from: CapacitySnapshot,
        changes: &CapacityUpdate,
        dry_run: bool,
    ) {
        info!(
            event = "pool_scaled",
            source = %self.source,
            tenant = %key.tenant,
            env = %key.env,
            group = %group,
            branch = branch.as_str(),
            from = %from,
            changes = %changes,
            dry_run = dry_run,
            "Auto scaling group rescaled"
        );

        if branch == PoolBranch::NightWidenMax {
            warn!(
                event = "pool_max_widened",
                source = %self.source,
                group = %group,
                previous_max = from.max,
                "Max raised to the night floor; only the day restore branch lowers it again"
            );
        }
    }

    pub fn log_service_scaled(
        &self,
        cluster: &str,
        service: &str,
        from: u32,
        to: u32,
        dry_run: bool,
    ) {
        info!(
            event = "service_scaled",
            source = %self.source,
            cluster = %cluster,
            service = %service,
            from = from,
            to = to,
            dry_run = dry_run,
            "Service desired count changed"
        );
    }

    pub fn log_alarm_retuned(&self, alarm: &str, from: f64, to: f64, dry_run: bool) {
        info!(
            event = "alarm_retuned",
            source = %self.source,
            alarm = %alarm,
            from = from,
            to = to,
            dry_run = dry_run,
            "Alarm threshold updated"
        );
    }

    pub fn log_environment_unchanged(&self, key: &EnvironmentKey, variant: &str) {
        info!(
            event = "environment_unchanged",
            source = %self.source,
            tenant = %key.tenant,
            env = %key.env,
            variant = %variant,
            "Environment already at target"
        );
    }

    pub fn log_environment_skipped(&self, key: &EnvironmentKey, variant: &str, error: &ScalingError) {
        info!(
            event = "environment_skipped",
            source = %self.source,
            tenant = %key.tenant,
            env = %key.env,
            variant = %variant,
            reason = %error,
            "Environment skipped"
        );
    }

    pub fn log_environment_failed(
        &self,
        key: &EnvironmentKey,
        variant: &str,
        error: &ScalingError,
        writes_applied: usize,
    ) {
        warn!(
            event = "environment_failed",
            source = %self.source,
            tenant = %key.tenant,
            env = %key.env,
            variant = %variant,
            category = error.category(),
            error = %error,
            writes_applied = writes_applied,
            "Environment reconciliation aborted"
        );
    }

    pub fn log_run_finished(&self, applied: usize, unchanged: usize, skipped: usize, failed: usize) {
        info!(
            event = "run_finished",
            source = %self.source,
            applied = applied,
            unchanged = unchanged,
            skipped = skipped,
            failed = failed,
            "Scaling run finished"
        );
    }
}
