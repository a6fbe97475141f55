//! Environment discovery command

use anyhow::{Context, Result};
use scaler_lib::Reconciler;
use tabled::Tabled;

use crate::output::{print_table, OutputFormat};

/// Row for environments table
#[derive(Tabled)]
struct EnvironmentRow {
    #[tabled(rename = "Tenant")]
    tenant: String,
    #[tabled(rename = "Env")]
    env: String,
    #[tabled(rename = "Stack")]
    stack: String,
    #[tabled(rename = "Cluster")]
    cluster: String,
}

/// List environments that follow the stack naming convention
pub async fn list_environments(reconciler: &Reconciler, format: OutputFormat) -> Result<()> {
    let environments = reconciler
        .discover()
        .await
        .context("Failed to list stacks")?;

    let rows: Vec<EnvironmentRow> = environments
        .iter()
        .map(|e| EnvironmentRow {
            tenant: e.key.tenant.clone(),
            env: e.key.env.clone(),
            stack: e.stack_name.clone(),
            cluster: e.key.cluster_name(),
        })
        .collect();

    print_table(&rows, &environments, format);
    Ok(())
}
