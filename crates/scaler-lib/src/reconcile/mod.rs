//! Reconciliation of discovered environments against the day/night policy
//!
//! Environments are processed one at a time in discovery order. A failure
//! only ends the environment it happened in; the run moves on to the next
//! one and the outcome lands in the [`RunReport`]. Nothing is retried: the
//! next scheduled run re-evaluates from scratch.
//!
//! There is no guard against two overlapping runs; cron scheduling is
//! expected to prevent them.

mod pool;
mod services;

#[cfg(test)]
mod tests;

pub use pool::{plan_pool, PoolBranch, PoolPlan};
pub use services::{
    alarm_filter, plan_alarms, service_target, AlarmChange, ServiceChange, ServicesPlan,
};

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::discovery::{self, NamingConvention};
use crate::error::{Disposition, Result, ScalingError};
use crate::models::{DiscoveredEnvironment, EnvironmentKey};
use crate::notify::{Notification, Notifier};
use crate::observability::{RunMetrics, StructuredLogger};
use crate::platform::ControlPlane;
use crate::policy::PolicyConfig;
use crate::resolve;
use crate::schedule::TimePeriod;

/// Policy variant applied to an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Auto Scaling Group behind the cluster
    Pool,
    /// ECS services and their memory alarm
    Services,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Pool => "pool",
            Variant::Services => "services",
        }
    }
}

/// Which variants a run applies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Pool,
    Services,
    #[default]
    All,
}

impl Mode {
    pub fn variants(&self) -> &'static [Variant] {
        match self {
            Mode::Pool => &[Variant::Pool],
            Mode::Services => &[Variant::Services],
            Mode::All => &[Variant::Pool, Variant::Services],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Pool => "pool",
            Mode::Services => "services",
            Mode::All => "all",
        }
    }
}

impl FromStr for Mode {
    type Err = ScalingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pool" => Ok(Mode::Pool),
            "services" => Ok(Mode::Services),
            "all" => Ok(Mode::All),
            other => Err(ScalingError::Configuration(format!(
                "unknown mode '{}', expected pool, services or all",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Planned or applied changes of one variant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "variant", rename_all = "lowercase")]
pub enum Changes {
    Pool(PoolPlan),
    Services(ServicesPlan),
}

impl Changes {
    pub fn write_calls(&self) -> usize {
        match self {
            Changes::Pool(plan) => usize::from(!plan.is_noop()),
            Changes::Services(plan) => plan.write_calls(),
        }
    }

    /// One-line human summary used in notifications
    pub fn summary(&self) -> String {
        match self {
            Changes::Pool(plan) => format!(
                "{} ({}): {} -> {}",
                plan.group_name,
                plan.branch.as_str(),
                plan.live,
                plan.target()
            ),
            Changes::Services(plan) => {
                let mut parts: Vec<String> = plan
                    .pending_services()
                    .map(|s| format!("{} {} -> {}", s.service, s.current, s.target))
                    .collect();
                parts.extend(plan.alarms.iter().map(|a| {
                    format!(
                        "{} threshold {} -> {}",
                        a.alarm_name, a.current_threshold, a.target_threshold
                    )
                }));
                format!("{}: {}", plan.cluster, parts.join(", "))
            }
        }
    }
}

/// What happened to one environment under one variant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    /// Changes were written
    Applied { changes: Changes },
    /// Changes were computed but not written (dry run)
    Planned { changes: Changes },
    /// Live state already matches the period's target
    Unchanged { changes: Changes },
    /// A required resource does not exist
    Skipped { reason: String },
    /// Processing aborted, possibly after some writes went through
    Failed {
        error: String,
        category: String,
        writes_applied: usize,
    },
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Applied { .. } => "applied",
            Outcome::Planned { .. } => "planned",
            Outcome::Unchanged { .. } => "unchanged",
            Outcome::Skipped { .. } => "skipped",
            Outcome::Failed { .. } => "failed",
        }
    }

    pub fn changes(&self) -> Option<&Changes> {
        match self {
            Outcome::Applied { changes }
            | Outcome::Planned { changes }
            | Outcome::Unchanged { changes } => Some(changes),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentReport {
    pub key: EnvironmentKey,
    pub variant: Variant,
    pub outcome: Outcome,
}

/// Outcomes of every environment in a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub period: TimePeriod,
    pub mode: Mode,
    pub dry_run: bool,
    pub started_at: i64,
    pub environments: Vec<DiscoveredEnvironment>,
    pub entries: Vec<EnvironmentReport>,
}

impl RunReport {
    fn count(&self, status: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome.as_str() == status)
            .count()
    }

    pub fn applied(&self) -> usize {
        self.count("applied")
    }

    pub fn planned(&self) -> usize {
        self.count("planned")
    }

    pub fn unchanged(&self) -> usize {
        self.count("unchanged")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    /// Control-plane writes issued by the run
    pub fn write_calls(&self) -> usize {
        self.entries
            .iter()
            .filter_map(|e| match &e.outcome {
                Outcome::Applied { changes } => Some(changes.write_calls()),
                Outcome::Failed { writes_applied, .. } => Some(*writes_applied),
                _ => None,
            })
            .sum()
    }
}

/// Applies the policy to every discovered environment
pub struct Reconciler {
    platform: Arc<dyn ControlPlane>,
    policy: PolicyConfig,
    convention: NamingConvention,
    logger: StructuredLogger,
    notifier: Option<Arc<dyn Notifier>>,
    metrics: Option<RunMetrics>,
    env_filter: Option<String>,
    dry_run: bool,
}

impl Reconciler {
    pub fn new(platform: Arc<dyn ControlPlane>, policy: PolicyConfig) -> Result<Self> {
        policy.validate()?;
        let convention = NamingConvention::new(&policy.stack_prefix)?;
        Ok(Self {
            platform,
            policy,
            convention,
            logger: StructuredLogger::new("ecs-scaler"),
            notifier: None,
            metrics: None,
            env_filter: None,
            dry_run: false,
        })
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_metrics(mut self, metrics: RunMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Only reconcile environments with this code
    pub fn with_env_filter(mut self, env: impl Into<String>) -> Self {
        self.env_filter = Some(env.into());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// Discover environments, honoring the environment filter
    pub async fn discover(&self) -> Result<Vec<DiscoveredEnvironment>> {
        let mut found = discovery::discover(self.platform.as_ref(), &self.convention).await?;
        if let Some(env) = &self.env_filter {
            found.retain(|d| d.key.env.eq_ignore_ascii_case(env));
        }
        Ok(found)
    }

    /// Run every variant of `mode` over every environment for `period`
    ///
    /// Fails only when discovery itself fails.
    pub async fn run(&self, mode: Mode, period: TimePeriod) -> Result<RunReport> {
        self.logger
            .log_run_started(mode.as_str(), period, self.dry_run);
        let started_at = chrono::Utc::now().timestamp();

        let environments = self.discover().await?;
        if let Some(metrics) = &self.metrics {
            metrics.set_environments_discovered(environments.len());
        }

        let mut entries = Vec::with_capacity(environments.len() * mode.variants().len());
        for env in &environments {
            self.logger
                .log_environment_discovered(&env.key, &env.stack_name);

            for &variant in mode.variants() {
                let outcome = self.reconcile(&env.key, variant, period).await;
                self.record(&env.key, variant, &outcome).await;
                entries.push(EnvironmentReport {
                    key: env.key.clone(),
                    variant,
                    outcome,
                });
            }
        }

        let report = RunReport {
            period,
            mode,
            dry_run: self.dry_run,
            started_at,
            environments,
            entries,
        };

        self.logger.log_run_finished(
            report.applied() + report.planned(),
            report.unchanged(),
            report.skipped(),
            report.failed(),
        );
        if let Some(metrics) = &self.metrics {
            metrics.mark_finished();
        }

        Ok(report)
    }

    /// Reconcile one environment under one variant, folding errors into the outcome
    pub async fn reconcile(&self, key: &EnvironmentKey, variant: Variant, period: TimePeriod) -> Outcome {
        let mut applied = 0;
        let result = match variant {
            Variant::Pool => self.reconcile_pool(key, period, &mut applied).await,
            Variant::Services => self.reconcile_services(key, period, &mut applied).await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => match e.disposition() {
                // A resource vanishing half-way is still a partial apply.
                Disposition::Skip if applied == 0 => {
                    self.logger
                        .log_environment_skipped(key, variant.as_str(), &e);
                    Outcome::Skipped {
                        reason: e.to_string(),
                    }
                }
                _ => {
                    self.logger
                        .log_environment_failed(key, variant.as_str(), &e, applied);
                    Outcome::Failed {
                        error: e.to_string(),
                        category: e.category().to_string(),
                        writes_applied: applied,
                    }
                }
            },
        }
    }

    async fn reconcile_pool(
        &self,
        key: &EnvironmentKey,
        period: TimePeriod,
        applied: &mut usize,
    ) -> Result<Outcome> {
        let resolved = resolve::resolve_pool(
            self.platform.as_ref(),
            &self.convention,
            key,
            &self.policy,
        )
        .await?;

        if period == TimePeriod::Day {
            resolved
                .declared
                .ensure_restorable(&key.record_name(self.convention.prefix()), &self.policy)?;
        }

        let plan = plan_pool(
            &resolved.group_name,
            period,
            resolved.live,
            resolved.declared,
            self.policy.night_floor,
        );

        if plan.is_noop() {
            self.logger.log_environment_unchanged(key, Variant::Pool.as_str());
            return Ok(Outcome::Unchanged {
                changes: Changes::Pool(plan),
            });
        }

        let changes = plan.changes();
        if !self.dry_run {
            self.platform
                .update_group(&plan.group_name, &changes)
                .await?;
            *applied += 1;
        }
        self.logger.log_pool_scaled(
            key,
            &plan.group_name,
            plan.branch,
            plan.live,
            &changes,
            self.dry_run,
        );

        Ok(self.finish(Changes::Pool(plan)))
    }

    async fn reconcile_services(
        &self,
        key: &EnvironmentKey,
        period: TimePeriod,
        applied: &mut usize,
    ) -> Result<Outcome> {
        let resolved = resolve::resolve_services(
            self.platform.as_ref(),
            &self.convention,
            key,
            &self.policy,
        )
        .await?;

        let mut services = Vec::with_capacity(resolved.targets.len());
        for target in &resolved.targets {
            let current = self
                .platform
                .desired_count(&resolved.cluster, &target.service)
                .await?;
            services.push(ServiceChange {
                service: target.service.clone(),
                current,
                target: service_target(period, target),
            });
        }

        let alarms = match self.policy.alarm_service() {
            Some(service) => {
                let filter = alarm_filter(&resolved.cluster, service, &self.policy.alarm);
                let names = self.platform.list_alarm_names(&filter).await?;
                if names.is_empty() {
                    Vec::new()
                } else {
                    let definitions = self.platform.describe_alarms(&names).await?;
                    plan_alarms(period, &definitions, &self.policy.alarm)
                }
            }
            None => Vec::new(),
        };

        let plan = ServicesPlan {
            cluster: resolved.cluster,
            period,
            services,
            alarms,
        };

        if plan.is_noop() {
            self.logger
                .log_environment_unchanged(key, Variant::Services.as_str());
            return Ok(Outcome::Unchanged {
                changes: Changes::Services(plan),
            });
        }

        for change in plan.pending_services() {
            if !self.dry_run {
                self.platform
                    .set_desired_count(&plan.cluster, &change.service, change.target)
                    .await?;
                *applied += 1;
            }
            self.logger.log_service_scaled(
                &plan.cluster,
                &change.service,
                change.current,
                change.target,
                self.dry_run,
            );
        }

        for change in &plan.alarms {
            if !self.dry_run {
                self.platform.put_alarm(&change.updated_definition()).await?;
                *applied += 1;
            }
            self.logger.log_alarm_retuned(
                &change.alarm_name,
                change.current_threshold,
                change.target_threshold,
                self.dry_run,
            );
        }

        Ok(self.finish(Changes::Services(plan)))
    }

    fn finish(&self, changes: Changes) -> Outcome {
        if self.dry_run {
            Outcome::Planned { changes }
        } else {
            Outcome::Applied { changes }
        }
    }

    async fn record(&self, key: &EnvironmentKey, variant: Variant, outcome: &Outcome) {
        if let Some(metrics) = &self.metrics {
            match outcome {
                Outcome::Applied { changes } => {
                    metrics.inc_reconciled();
                    metrics.add_mutations(changes.write_calls());
                }
                Outcome::Planned { .. } | Outcome::Unchanged { .. } => metrics.inc_reconciled(),
                Outcome::Skipped { .. } => metrics.inc_skipped(),
                Outcome::Failed { writes_applied, .. } => {
                    metrics.inc_failed();
                    metrics.add_mutations(*writes_applied);
                }
            }
        }

        let Some(notifier) = &self.notifier else {
            return;
        };
        let notification = match outcome {
            Outcome::Applied { changes } => Notification::info(format!(
                "{} {} scaled for {}: {}",
                key,
                variant.as_str(),
                changes_period(changes),
                changes.summary()
            )),
            Outcome::Failed {
                error,
                writes_applied,
                ..
            } => {
                let mut text = format!("{} {} scaling failed: {}", key, variant.as_str(), error);
                if *writes_applied > 0 {
                    text.push_str(&format!(" ({} write(s) already applied)", writes_applied));
                }
                Notification::alert(text)
            }
            _ => return,
        };
        notifier.notify(&notification).await;
    }
}

fn changes_period(changes: &Changes) -> TimePeriod {
    match changes {
        Changes::Pool(plan) => plan.period,
        Changes::Services(plan) => plan.period,
    }
}
