//! In-process control plane
//!
//! Holds stacks, scaling groups, services and alarms in memory. Scaling
//! group updates are applied one field at a time and rejected when an
//! intermediate state breaks `min <= desired <= max`, which is stricter
//! than the real API. Every write is recorded as a [`Mutation`].

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;

use super::{AlarmControl, ContainerServices, ScalingGroups, StackCatalog};
use crate::error::{Result, ScalingError};
use crate::models::{AlarmDefinition, CapacityField, CapacitySnapshot, CapacityUpdate};
use crate::resolve::ConfigRecord;

/// A write performed against the in-memory control plane
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    GroupField {
        group: String,
        field: CapacityField,
        value: u32,
    },
    ServiceCount {
        cluster: String,
        service: String,
        count: u32,
    },
    AlarmThreshold {
        alarm: String,
        threshold: f64,
    },
}

#[derive(Default)]
struct State {
    stacks: Vec<ConfigRecord>,
    groups: HashMap<String, CapacitySnapshot>,
    services: HashMap<(String, String), u32>,
    alarms: BTreeMap<String, AlarmDefinition>,
    failing: HashSet<String>,
    mutations: Vec<Mutation>,
}

impl State {
    fn check(&self, operation: &str, target: &str) -> Result<()> {
        if self.failing.contains(target) {
            return Err(ScalingError::platform(
                operation,
                format!("injected failure for {}", target),
            ));
        }
        Ok(())
    }
}

/// In-memory implementation of every control-plane trait
#[derive(Default)]
pub struct InMemoryPlatform {
    state: Mutex<State>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stack(mut self, record: ConfigRecord) -> Self {
        self.state.get_mut().stacks.push(record);
        self
    }

    pub fn with_group(mut self, name: impl Into<String>, capacity: CapacitySnapshot) -> Self {
        self.state.get_mut().groups.insert(name.into(), capacity);
        self
    }

    pub fn with_service(
        mut self,
        cluster: impl Into<String>,
        service: impl Into<String>,
        count: u32,
    ) -> Self {
        self.state
            .get_mut()
            .services
            .insert((cluster.into(), service.into()), count);
        self
    }

    pub fn with_alarm(mut self, alarm: AlarmDefinition) -> Self {
        self.state
            .get_mut()
            .alarms
            .insert(alarm.alarm_name.clone(), alarm);
        self
    }

    /// Make every call that targets `target` (stack, group, cluster or alarm name) fail
    pub fn failing_on(mut self, target: impl Into<String>) -> Self {
        self.state.get_mut().failing.insert(target.into());
        self
    }

    pub async fn group(&self, name: &str) -> Option<CapacitySnapshot> {
        self.state.lock().await.groups.get(name).copied()
    }

    pub async fn service_count(&self, cluster: &str, service: &str) -> Option<u32> {
        self.state
            .lock()
            .await
            .services
            .get(&(cluster.to_string(), service.to_string()))
            .copied()
    }

    pub async fn alarm(&self, name: &str) -> Option<AlarmDefinition> {
        self.state.lock().await.alarms.get(name).cloned()
    }

    pub async fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().await.mutations.clone()
    }

    pub async fn clear_mutations(&self) {
        self.state.lock().await.mutations.clear();
    }
}

#[async_trait]
impl StackCatalog for InMemoryPlatform {
    async fn list_stack_names(&self) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state.stacks.iter().map(|s| s.name.clone()).collect())
    }

    async fn describe_stack(&self, name: &str) -> Result<ConfigRecord> {
        let state = self.state.lock().await;
        state.check("DescribeStacks", name)?;
        state
            .stacks
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| ScalingError::not_found(format!("stack {}", name)))
    }
}

#[async_trait]
impl ScalingGroups for InMemoryPlatform {
    async fn describe_group(&self, name: &str) -> Result<CapacitySnapshot> {
        let state = self.state.lock().await;
        state.check("DescribeAutoScalingGroups", name)?;
        state
            .groups
            .get(name)
            .copied()
            .ok_or_else(|| ScalingError::not_found(format!("auto scaling group {}", name)))
    }

    async fn update_group(&self, name: &str, update: &CapacityUpdate) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check("UpdateAutoScalingGroup", name)?;

        let start = *state
            .groups
            .get(name)
            .ok_or_else(|| ScalingError::not_found(format!("auto scaling group {}", name)))?;

        let mut current = start;
        let mut applied = Vec::new();
        for (field, value) in update.ordered_steps(start) {
            match field {
                CapacityField::Min => current.min = value,
                CapacityField::Max => current.max = value,
                CapacityField::Desired => current.desired = value,
            }
            if !current.is_consistent() {
                return Err(ScalingError::platform(
                    "UpdateAutoScalingGroup",
                    format!("{} would leave {} inconsistent", update, name),
                ));
            }
            applied.push(Mutation::GroupField {
                group: name.to_string(),
                field,
                value,
            });
        }

        state.groups.insert(name.to_string(), current);
        state.mutations.extend(applied);
        Ok(())
    }
}

#[async_trait]
impl ContainerServices for InMemoryPlatform {
    async fn desired_count(&self, cluster: &str, service: &str) -> Result<u32> {
        let state = self.state.lock().await;
        state.check("DescribeServices", cluster)?;
        state
            .services
            .get(&(cluster.to_string(), service.to_string()))
            .copied()
            .ok_or_else(|| ScalingError::not_found(format!("service {} in {}", service, cluster)))
    }

    async fn set_desired_count(&self, cluster: &str, service: &str, count: u32) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check("UpdateService", cluster)?;
        let key = (cluster.to_string(), service.to_string());
        if !state.services.contains_key(&key) {
            return Err(ScalingError::not_found(format!(
                "service {} in {}",
                service, cluster
            )));
        }
        state.services.insert(key, count);
        state.mutations.push(Mutation::ServiceCount {
            cluster: cluster.to_string(),
            service: service.to_string(),
            count,
        });
        Ok(())
    }
}

#[async_trait]
impl AlarmControl for InMemoryPlatform {
    async fn list_alarm_names(&self, filter: &str) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .alarms
            .keys()
            .filter(|name| name.contains(filter))
            .cloned()
            .collect())
    }

    async fn describe_alarms(&self, names: &[String]) -> Result<Vec<AlarmDefinition>> {
        let state = self.state.lock().await;
        Ok(names
            .iter()
            .filter_map(|name| state.alarms.get(name).cloned())
            .collect())
    }

    async fn put_alarm(&self, alarm: &AlarmDefinition) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check("PutMetricAlarm", &alarm.alarm_name)?;
        state
            .alarms
            .insert(alarm.alarm_name.clone(), alarm.clone());
        state.mutations.push(Mutation::AlarmThreshold {
            alarm: alarm.alarm_name.clone(),
            threshold: alarm.threshold,
        });
        Ok(())
    }
}
