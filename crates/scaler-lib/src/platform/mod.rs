//! Control-plane seams
//!
//! The reconciler talks to the cloud through these traits:
//! - stack catalog (environment configuration records)
//! - scaling groups (compute pool size)
//! - container services (desired task counts)
//! - metric alarms (threshold retuning)

mod aws;
mod memory;

pub use aws::AwsPlatform;
pub use memory::{InMemoryPlatform, Mutation};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{AlarmDefinition, CapacitySnapshot, CapacityUpdate};
use crate::resolve::ConfigRecord;

/// Source of environment configuration records
#[async_trait]
pub trait StackCatalog: Send + Sync {
    /// Names of all live stacks, in listing order
    async fn list_stack_names(&self) -> Result<Vec<String>>;

    /// Declared parameters and outputs of a named stack
    async fn describe_stack(&self, name: &str) -> Result<ConfigRecord>;
}

/// Compute pools with min/max/desired semantics
#[async_trait]
pub trait ScalingGroups: Send + Sync {
    async fn describe_group(&self, name: &str) -> Result<CapacitySnapshot>;

    /// Write the fields present in `update`
    async fn update_group(&self, name: &str, update: &CapacityUpdate) -> Result<()>;
}

/// Desired task counts of services inside a cluster
#[async_trait]
pub trait ContainerServices: Send + Sync {
    async fn desired_count(&self, cluster: &str, service: &str) -> Result<u32>;

    async fn set_desired_count(&self, cluster: &str, service: &str, count: u32) -> Result<()>;
}

/// Metric alarms; the put call always carries the full definition
#[async_trait]
pub trait AlarmControl: Send + Sync {
    /// Names of alarms whose name contains `filter`
    ///
    /// Target-tracking alarms are named `TargetTracking-service/<cluster>/...`,
    /// so the cluster segment is never a name prefix and CloudWatch's
    /// `AlarmNamePrefix` cannot narrow the listing.
    async fn list_alarm_names(&self, filter: &str) -> Result<Vec<String>>;

    async fn describe_alarms(&self, names: &[String]) -> Result<Vec<AlarmDefinition>>;

    async fn put_alarm(&self, alarm: &AlarmDefinition) -> Result<()>;
}

/// Everything the reconciler needs from the cloud
pub trait ControlPlane: StackCatalog + ScalingGroups + ContainerServices + AlarmControl {}

impl<T> ControlPlane for T where T: StackCatalog + ScalingGroups + ContainerServices + AlarmControl {}
