//! Multi-service planning: desired counts plus the memory alarm threshold

use serde::{Deserialize, Serialize};

use crate::models::AlarmDefinition;
use crate::policy::AlarmPolicy;
use crate::resolve::ServiceTarget;
use crate::schedule::TimePeriod;

/// Desired count transition of one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceChange {
    pub service: String,
    pub current: u32,
    pub target: u32,
}

impl ServiceChange {
    pub fn is_noop(&self) -> bool {
        self.current == self.target
    }
}

/// Threshold transition of one alarm, carrying the definition to write back
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmChange {
    pub alarm_name: String,
    pub current_threshold: f64,
    pub target_threshold: f64,
    /// Live definition; reports show the threshold transition only
    #[serde(skip_serializing)]
    pub definition: AlarmDefinition,
}

impl AlarmChange {
    /// Definition to put: the live one with only the threshold replaced
    pub fn updated_definition(&self) -> AlarmDefinition {
        self.definition.with_threshold(self.target_threshold)
    }
}

/// Planned changes for one cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServicesPlan {
    pub cluster: String,
    pub period: TimePeriod,
    pub services: Vec<ServiceChange>,
    pub alarms: Vec<AlarmChange>,
}

impl ServicesPlan {
    pub fn pending_services(&self) -> impl Iterator<Item = &ServiceChange> {
        self.services.iter().filter(|s| !s.is_noop())
    }

    pub fn is_noop(&self) -> bool {
        self.pending_services().next().is_none() && self.alarms.is_empty()
    }

    /// Number of control-plane writes needed
    pub fn write_calls(&self) -> usize {
        self.pending_services().count() + self.alarms.len()
    }
}

/// Desired count of a service for the period
pub fn service_target(period: TimePeriod, target: &ServiceTarget) -> u32 {
    match period {
        TimePeriod::Day => target.day_count,
        TimePeriod::Night => target.night_count,
    }
}

/// Substring that identifies the alarms of a service in a cluster
pub fn alarm_filter(cluster: &str, service: &str, policy: &AlarmPolicy) -> String {
    format!("{}/{}{}", cluster, service, policy.name_suffix)
}

/// Alarms on the policy metric whose threshold differs from the period's value
pub fn plan_alarms(
    period: TimePeriod,
    alarms: &[AlarmDefinition],
    policy: &AlarmPolicy,
) -> Vec<AlarmChange> {
    let threshold = policy.threshold_for(period);

    alarms
        .iter()
        .filter(|a| a.metric_name == policy.metric_name)
        .filter(|a| a.threshold != threshold)
        .map(|a| AlarmChange {
            alarm_name: a.alarm_name.clone(),
            current_threshold: a.threshold,
            target_threshold: threshold,
            definition: a.clone(),
        })
        .collect()
}
