//! Desired-state resolution
//!
//! Turns a discovered environment into the typed inputs of reconciliation:
//! declared sizes from the configuration record, the scaling group behind
//! the cluster, and per-service day targets.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

use crate::discovery::NamingConvention;
use crate::error::{Result, ScalingError};
use crate::models::{CapacitySnapshot, EnvironmentKey};
use crate::platform::{ScalingGroups, StackCatalog};
use crate::policy::PolicyConfig;

/// Declared parameters and outputs of an environment stack
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub name: String,
    pub parameters: HashMap<String, String>,
    pub outputs: HashMap<String, String>,
}

impl ConfigRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    /// Typed parameter lookup
    pub fn parameter<T: FromStr>(&self, key: &str) -> Result<T> {
        let raw = self
            .parameters
            .get(key)
            .ok_or_else(|| ScalingError::MissingParameter {
                record: self.name.clone(),
                key: key.to_string(),
            })?;

        raw.trim()
            .parse()
            .map_err(|_| ScalingError::InvalidParameter {
                record: self.name.clone(),
                key: key.to_string(),
                value: raw.clone(),
            })
    }

    pub fn output(&self, key: &str) -> Result<&str> {
        self.outputs
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ScalingError::not_found(format!("output {} of stack {}", key, self.name)))
    }
}

/// Day sizes declared for a scaling group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredCapacity {
    pub desired: u32,
    pub max: u32,
}

impl DeclaredCapacity {
    /// Day rows write these sizes back, which needs `desired <= max`
    pub fn ensure_restorable(&self, record: &str, policy: &PolicyConfig) -> Result<()> {
        if self.max < self.desired {
            return Err(ScalingError::Configuration(format!(
                "{}: {}={} exceeds {}={}",
                record, policy.desired_parameter, self.desired, policy.max_parameter, self.max
            )));
        }
        Ok(())
    }
}

/// Resolution output of the capacity pool variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPool {
    pub key: EnvironmentKey,
    pub group_name: String,
    pub declared: DeclaredCapacity,
    pub live: CapacitySnapshot,
}

/// Day target of one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTarget {
    pub service: String,
    pub day_count: u32,
    pub night_count: u32,
}

/// Resolution output of the multi-service variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedServices {
    pub key: EnvironmentKey,
    pub cluster: String,
    pub targets: Vec<ServiceTarget>,
}

/// Read the declared day sizes of a scaling group
pub fn declared_capacity(record: &ConfigRecord, policy: &PolicyConfig) -> Result<DeclaredCapacity> {
    Ok(DeclaredCapacity {
        desired: record.parameter(&policy.desired_parameter)?,
        max: record.parameter(&policy.max_parameter)?,
    })
}

/// Find the scaling group behind an environment via its nested cluster stack
pub async fn scaling_group_name<C>(
    catalog: &C,
    convention: &NamingConvention,
    key: &EnvironmentKey,
    policy: &PolicyConfig,
) -> Result<String>
where
    C: StackCatalog + ?Sized,
{
    let names = catalog.list_stack_names().await?;
    let nested = names
        .iter()
        .find(|name| convention.is_nested_stack(name, key, &policy.cluster_stack_marker))
        .ok_or_else(|| {
            ScalingError::not_found(format!(
                "{} stack for {}",
                policy.cluster_stack_marker, key
            ))
        })?;

    debug!(environment = %key, stack = %nested, "Found cluster stack");
    let record = catalog.describe_stack(nested).await?;
    Ok(record.output(&policy.scaling_group_output)?.to_string())
}

/// Resolve everything the capacity pool variant needs
pub async fn resolve_pool<P>(
    platform: &P,
    convention: &NamingConvention,
    key: &EnvironmentKey,
    policy: &PolicyConfig,
) -> Result<ResolvedPool>
where
    P: StackCatalog + ScalingGroups + ?Sized,
{
    let record = platform
        .describe_stack(&key.record_name(convention.prefix()))
        .await?;
    let declared = declared_capacity(&record, policy)?;
    let group_name = scaling_group_name(platform, convention, key, policy).await?;
    let live = platform.describe_group(&group_name).await?;

    Ok(ResolvedPool {
        key: key.clone(),
        group_name,
        declared,
        live,
    })
}

/// Resolve the per-service targets of the multi-service variant
pub async fn resolve_services<C>(
    catalog: &C,
    convention: &NamingConvention,
    key: &EnvironmentKey,
    policy: &PolicyConfig,
) -> Result<ResolvedServices>
where
    C: StackCatalog + ?Sized,
{
    let record = catalog
        .describe_stack(&key.record_name(convention.prefix()))
        .await?;

    let targets = policy
        .services
        .iter()
        .map(|service| {
            Ok(ServiceTarget {
                service: service.name.clone(),
                day_count: record.parameter(&service.day_parameter)?,
                night_count: policy.night_count_for(service),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ResolvedServices {
        key: key.clone(),
        cluster: key.cluster_name(),
        targets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::InMemoryPlatform;

    fn record() -> ConfigRecord {
        ConfigRecord::new("ecs-arlitx-env1")
            .with_parameter("ClusterSize", "4")
            .with_parameter("ClusterSizeMax", " 6 ")
            .with_parameter("TomcatBatchServiceMaxCapacity", "3")
            .with_parameter("FilebeatServiceMinCapacity", "1")
    }

    fn platform() -> InMemoryPlatform {
        InMemoryPlatform::new()
            .with_stack(record())
            .with_stack(
                ConfigRecord::new("ecs-arlitx-env1-ECSClusterStack-1AB2CD")
                    .with_output("ECSAutoScalingGroupName", "arlitx-env1-asg"),
            )
            .with_group("arlitx-env1-asg", CapacitySnapshot::new(1, 6, 1))
    }

    #[test]
    fn test_parameter_lookup() {
        let record = record();
        assert_eq!(record.parameter::<u32>("ClusterSize").unwrap(), 4);
        assert_eq!(record.parameter::<u32>("ClusterSizeMax").unwrap(), 6);
        assert!(matches!(
            record.parameter::<u32>("Nope"),
            Err(ScalingError::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_invalid_parameter() {
        let record = ConfigRecord::new("ecs-arlitx-env1").with_parameter("ClusterSize", "four");
        match record.parameter::<u32>("ClusterSize") {
            Err(ScalingError::InvalidParameter { value, .. }) => assert_eq!(value, "four"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_declared_max_below_desired_is_not_restorable() {
        let policy = PolicyConfig::default();
        let record = ConfigRecord::new("ecs-arlitx-env1")
            .with_parameter("ClusterSize", "5")
            .with_parameter("ClusterSizeMax", "3");

        let declared = declared_capacity(&record, &policy).unwrap();
        assert_eq!(declared, DeclaredCapacity { desired: 5, max: 3 });
        assert!(matches!(
            declared.ensure_restorable(&record.name, &policy),
            Err(ScalingError::Configuration(_))
        ));
        assert!(DeclaredCapacity { desired: 3, max: 3 }
            .ensure_restorable(&record.name, &policy)
            .is_ok());
    }

    #[tokio::test]
    async fn test_resolve_pool() {
        let platform = platform();
        let convention = NamingConvention::new("ecs").unwrap();
        let key = EnvironmentKey::new("arlitx", "env1");

        let pool = resolve_pool(&platform, &convention, &key, &PolicyConfig::default())
            .await
            .unwrap();

        assert_eq!(pool.group_name, "arlitx-env1-asg");
        assert_eq!(pool.declared, DeclaredCapacity { desired: 4, max: 6 });
        assert_eq!(pool.live, CapacitySnapshot::new(1, 6, 1));
    }

    #[tokio::test]
    async fn test_missing_cluster_stack_is_not_found() {
        let platform = InMemoryPlatform::new().with_stack(record());
        let convention = NamingConvention::new("ecs").unwrap();
        let key = EnvironmentKey::new("arlitx", "env1");

        let err = resolve_pool(&platform, &convention, &key, &PolicyConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScalingError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_cluster_stack_of_other_tenant_is_ignored() {
        let platform = InMemoryPlatform::new()
            .with_stack(record())
            .with_stack(
                ConfigRecord::new("ecs-bbbbbb-env1-ECSClusterStack-9ZZ")
                    .with_output("ECSAutoScalingGroupName", "bbbbbb-env1-asg"),
            );
        let convention = NamingConvention::new("ecs").unwrap();
        let key = EnvironmentKey::new("arlitx", "env1");

        let err = scaling_group_name(&platform, &convention, &key, &PolicyConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScalingError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_resolve_services() {
        let platform = platform();
        let convention = NamingConvention::new("ecs").unwrap();
        let key = EnvironmentKey::new("arlitx", "env1");

        let services = resolve_services(&platform, &convention, &key, &PolicyConfig::default())
            .await
            .unwrap();

        assert_eq!(services.cluster, "arlitx-env1-ecs");
        assert_eq!(services.targets.len(), 2);
        assert_eq!(services.targets[0].service, "tomcat-batch-service");
        assert_eq!(services.targets[0].day_count, 3);
        assert_eq!(services.targets[1].day_count, 1);
        assert!(services.targets.iter().all(|t| t.night_count == 0));
    }

    #[tokio::test]
    async fn test_missing_service_parameter() {
        let platform = InMemoryPlatform::new().with_stack(
            ConfigRecord::new("ecs-arlitx-env1").with_parameter("TomcatBatchServiceMaxCapacity", "3"),
        );
        let convention = NamingConvention::new("ecs").unwrap();
        let key = EnvironmentKey::new("arlitx", "env1");

        let err = resolve_services(&platform, &convention, &key, &PolicyConfig::default())
            .await
            .unwrap_err();
        match err {
            ScalingError::MissingParameter { key, .. } => {
                assert_eq!(key, "FilebeatServiceMinCapacity")
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
