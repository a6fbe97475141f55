//! Core data models for the scaler

use serde::{Deserialize, Serialize};

/// Composite identity of a managed environment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvironmentKey {
    /// Tenant (client) identifier, e.g. `arlitx`
    pub tenant: String,
    /// Four-character environment code, e.g. `env1`
    pub env: String,
}

impl EnvironmentKey {
    pub fn new(tenant: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            env: env.into(),
        }
    }

    /// Name of the ECS cluster backing this environment
    pub fn cluster_name(&self) -> String {
        format!("{}-{}-ecs", self.tenant, self.env)
    }

    /// Name of the configuration record (root stack) for this environment
    pub fn record_name(&self, prefix: &str) -> String {
        format!("{}-{}-{}", prefix, self.tenant, self.env)
    }
}

impl std::fmt::Display for EnvironmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tenant, self.env)
    }
}

/// An environment found by scanning stack names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredEnvironment {
    pub key: EnvironmentKey,
    /// The stack name the key was parsed from
    pub stack_name: String,
}

/// Live size of a scaling group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub min: u32,
    pub max: u32,
    pub desired: u32,
}

impl CapacitySnapshot {
    pub fn new(min: u32, max: u32, desired: u32) -> Self {
        Self { min, max, desired }
    }

    /// `min <= desired <= max`
    pub fn is_consistent(&self) -> bool {
        self.min <= self.desired && self.desired <= self.max
    }
}

impl std::fmt::Display for CapacitySnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "min={} desired={} max={}", self.min, self.desired, self.max)
    }
}

/// One size field of a scaling group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityField {
    Min,
    Max,
    Desired,
}

/// Field-subset update of a scaling group; `None` leaves the field alone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired: Option<u32>,
}

impl CapacityUpdate {
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none() && self.desired.is_none()
    }

    /// The state the group ends up in once every field is written
    pub fn apply_to(&self, current: CapacitySnapshot) -> CapacitySnapshot {
        CapacitySnapshot {
            min: self.min.unwrap_or(current.min),
            max: self.max.unwrap_or(current.max),
            desired: self.desired.unwrap_or(current.desired),
        }
    }

    /// Drop fields that already hold the requested value
    pub fn minimize(&self, current: CapacitySnapshot) -> CapacityUpdate {
        CapacityUpdate {
            min: self.min.filter(|v| *v != current.min),
            max: self.max.filter(|v| *v != current.max),
            desired: self.desired.filter(|v| *v != current.desired),
        }
    }

    /// Single-field writes in an order that keeps `min <= desired <= max`
    /// at every step, for control planes that apply fields one at a time.
    ///
    /// Widening comes first (raise max, lower min), then desired, then
    /// narrowing (raise min, lower max).
    pub fn ordered_steps(&self, current: CapacitySnapshot) -> Vec<(CapacityField, u32)> {
        let mut steps = Vec::with_capacity(3);

        if let Some(max) = self.max.filter(|v| *v > current.max) {
            steps.push((CapacityField::Max, max));
        }
        if let Some(min) = self.min.filter(|v| *v < current.min) {
            steps.push((CapacityField::Min, min));
        }
        if let Some(desired) = self.desired.filter(|v| *v != current.desired) {
            steps.push((CapacityField::Desired, desired));
        }
        if let Some(min) = self.min.filter(|v| *v > current.min) {
            steps.push((CapacityField::Min, min));
        }
        if let Some(max) = self.max.filter(|v| *v < current.max) {
            steps.push((CapacityField::Max, max));
        }

        steps
    }
}

impl std::fmt::Display for CapacityUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(v) = self.min {
            parts.push(format!("min={}", v));
        }
        if let Some(v) = self.desired {
            parts.push(format!("desired={}", v));
        }
        if let Some(v) = self.max {
            parts.push(format!("max={}", v));
        }
        if parts.is_empty() {
            write!(f, "no change")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

/// Metric dimension attached to an alarm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmDimension {
    pub name: String,
    pub value: String,
}

/// Full definition of a metric alarm as required by a put call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmDefinition {
    pub alarm_name: String,
    pub metric_name: String,
    pub namespace: String,
    /// Simple statistic; `None` for percentile alarms
    pub statistic: Option<String>,
    /// Percentile statistic such as `p90`
    pub extended_statistic: Option<String>,
    pub period: Option<i32>,
    pub evaluation_periods: i32,
    pub comparison_operator: String,
    pub threshold: f64,
    #[serde(default)]
    pub dimensions: Vec<AlarmDimension>,
    #[serde(default)]
    pub alarm_actions: Vec<String>,
    #[serde(default)]
    pub ok_actions: Vec<String>,
    #[serde(default)]
    pub insufficient_data_actions: Vec<String>,
    pub description: Option<String>,
    pub datapoints_to_alarm: Option<i32>,
    pub treat_missing_data: Option<String>,
    pub evaluate_low_sample_count_percentile: Option<String>,
    pub actions_enabled: Option<bool>,
    pub unit: Option<String>,
}

impl AlarmDefinition {
    /// Copy of this definition with only the threshold replaced
    pub fn with_threshold(&self, threshold: f64) -> AlarmDefinition {
        AlarmDefinition {
            threshold,
            ..self.clone()
        }
    }
}
