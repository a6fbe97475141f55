//! Policy configuration passed into discovery, resolution and reconciliation

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScalingError};
use crate::schedule::TimePeriod;

/// Tunables of the day/night policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Prefix of environment stack names (`<prefix>-<tenant>-<env>`)
    pub stack_prefix: String,

    /// Scaling group size enforced at night
    pub night_floor: u32,

    /// Record parameter holding the declared day desired size
    pub desired_parameter: String,

    /// Record parameter holding the declared day maximum size
    pub max_parameter: String,

    /// Infix of the nested stack that owns the scaling group
    pub cluster_stack_marker: String,

    /// Output of the nested stack naming the scaling group
    pub scaling_group_output: String,

    /// Services rescaled by the multi-service variant
    pub services: Vec<ServicePolicy>,

    /// Night desired count shared by services without their own override
    pub night_container_count: u32,

    pub alarm: AlarmPolicy,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            stack_prefix: "ecs".to_string(),
            night_floor: 0,
            desired_parameter: "ClusterSize".to_string(),
            max_parameter: "ClusterSizeMax".to_string(),
            cluster_stack_marker: "ECSClusterStack".to_string(),
            scaling_group_output: "ECSAutoScalingGroupName".to_string(),
            services: vec![
                ServicePolicy::new("tomcat-batch-service", "TomcatBatchServiceMaxCapacity"),
                ServicePolicy::new("filebeat-service", "FilebeatServiceMinCapacity"),
            ],
            night_container_count: 0,
            alarm: AlarmPolicy::default(),
        }
    }
}

/// One ECS service and where its day target comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePolicy {
    pub name: String,
    /// Record parameter holding the day desired count
    pub day_parameter: String,
    /// Night desired count; falls back to `night_container_count`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub night_count: Option<u32>,
}

impl ServicePolicy {
    pub fn new(name: impl Into<String>, day_parameter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            day_parameter: day_parameter.into(),
            night_count: None,
        }
    }
}

/// Which alarms are retuned and to what
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmPolicy {
    /// Service whose alarm is retuned; the first configured service if unset
    pub service: Option<String>,
    /// Appended to `<cluster>/<service>` to form the name filter
    pub name_suffix: String,
    /// Only alarms on this metric are touched
    pub metric_name: String,
    pub day_threshold: f64,
    pub night_threshold: f64,
}

impl Default for AlarmPolicy {
    fn default() -> Self {
        Self {
            service: None,
            name_suffix: "-AlarmHigh".to_string(),
            metric_name: "MemoryUtilization".to_string(),
            day_threshold: 100.0,
            night_threshold: 130.0,
        }
    }
}

impl AlarmPolicy {
    pub fn threshold_for(&self, period: TimePeriod) -> f64 {
        match period {
            TimePeriod::Day => self.day_threshold,
            TimePeriod::Night => self.night_threshold,
        }
    }
}

impl PolicyConfig {
    /// Night desired count for a service
    pub fn night_count_for(&self, service: &ServicePolicy) -> u32 {
        service.night_count.unwrap_or(self.night_container_count)
    }

    /// Name of the service whose alarm follows the day/night regime
    pub fn alarm_service(&self) -> Option<&str> {
        self.alarm
            .service
            .as_deref()
            .or_else(|| self.services.first().map(|s| s.name.as_str()))
    }

    /// Reject settings the reconciler cannot act on
    pub fn validate(&self) -> Result<()> {
        if self.stack_prefix.is_empty() {
            return Err(ScalingError::Configuration(
                "stack_prefix must not be empty".to_string(),
            ));
        }
        if self.services.iter().any(|s| s.name.is_empty()) {
            return Err(ScalingError::Configuration(
                "service names must not be empty".to_string(),
            ));
        }
        if !self.alarm.day_threshold.is_finite() || !self.alarm.night_threshold.is_finite() {
            return Err(ScalingError::Configuration(
                "alarm thresholds must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = PolicyConfig::default();
        assert_eq!(policy.stack_prefix, "ecs");
        assert_eq!(policy.night_floor, 0);
        assert_eq!(policy.services.len(), 2);
        assert_eq!(policy.alarm_service(), Some("tomcat-batch-service"));
        assert_eq!(policy.alarm.threshold_for(TimePeriod::Night), 130.0);
        assert_eq!(policy.alarm.threshold_for(TimePeriod::Day), 100.0);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let policy: PolicyConfig =
            serde_json::from_str(r#"{"night_floor": 2, "alarm": {"night_threshold": 150.0}}"#)
                .unwrap();
        assert_eq!(policy.night_floor, 2);
        assert_eq!(policy.alarm.night_threshold, 150.0);
        assert_eq!(policy.alarm.day_threshold, 100.0);
        assert_eq!(policy.desired_parameter, "ClusterSize");
    }

    #[test]
    fn test_per_service_night_override() {
        let mut policy = PolicyConfig::default();
        policy.night_container_count = 1;
        policy.services[1].night_count = Some(0);
        assert_eq!(policy.night_count_for(&policy.services[0]), 1);
        assert_eq!(policy.night_count_for(&policy.services[1]), 0);
    }

    #[test]
    fn test_validate_rejects_empty_prefix() {
        let policy = PolicyConfig {
            stack_prefix: String::new(),
            ..PolicyConfig::default()
        };
        assert!(matches!(
            policy.validate(),
            Err(ScalingError::Configuration(_))
        ));
    }
}
