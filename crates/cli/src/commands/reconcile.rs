//! Plan and apply commands

use anyhow::{Context, Result};
use scaler_lib::{
    reconcile::{Mode, Outcome, RunReport},
    Reconciler, TimePeriod,
};
use tabled::Tabled;

use crate::output::{
    color_status, print_info, print_success, print_table, print_warning, OutputFormat,
};

/// Row for outcome table
#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Tenant")]
    tenant: String,
    #[tabled(rename = "Env")]
    env: String,
    #[tabled(rename = "Variant")]
    variant: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Details")]
    details: String,
}

fn details(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Skipped { reason } => reason.clone(),
        Outcome::Failed {
            error,
            writes_applied: 0,
            ..
        } => error.clone(),
        Outcome::Failed {
            error,
            writes_applied,
            ..
        } => format!("{} ({} write(s) already applied)", error, writes_applied),
        Outcome::Unchanged { .. } => "-".to_string(),
        Outcome::Applied { changes } | Outcome::Planned { changes } => changes.summary(),
    }
}

fn rows(report: &RunReport) -> Vec<OutcomeRow> {
    report
        .entries
        .iter()
        .map(|entry| OutcomeRow {
            tenant: entry.key.tenant.clone(),
            env: entry.key.env.clone(),
            variant: entry.variant.as_str().to_string(),
            status: color_status(entry.outcome.as_str()),
            details: details(&entry.outcome),
        })
        .collect()
}

/// Compute the changes a run would make, without writing anything
pub async fn plan(
    reconciler: Reconciler,
    mode: Mode,
    period: TimePeriod,
    format: OutputFormat,
) -> Result<()> {
    let report = reconciler
        .with_dry_run(true)
        .run(mode, period)
        .await
        .context("Failed to discover environments")?;

    print_table(&rows(&report), &report, format);

    if format == OutputFormat::Table {
        print_info(&format!(
            "{} period: {} change(s) planned, {} unchanged, {} skipped, {} failed",
            period,
            report.planned(),
            report.unchanged(),
            report.skipped(),
            report.failed()
        ));
    }
    Ok(())
}

/// Reconcile environments for the current period
pub async fn apply(reconciler: Reconciler, mode: Mode, format: OutputFormat) -> Result<()> {
    let period = TimePeriod::now();
    let report = reconciler
        .with_dry_run(false)
        .run(mode, period)
        .await
        .context("Failed to discover environments")?;

    print_table(&rows(&report), &report, format);

    if format == OutputFormat::Table {
        if report.failed() > 0 {
            print_warning(&format!(
                "{} environment(s) failed; see details above",
                report.failed()
            ));
        } else {
            print_success(&format!(
                "{} period applied: {} write call(s) issued",
                period,
                report.write_calls()
            ));
        }
    }
    Ok(())
}
