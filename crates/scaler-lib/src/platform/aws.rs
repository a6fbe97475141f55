//! AWS control plane: CloudFormation, Auto Scaling, ECS and CloudWatch
//!
//! Credentials and retries come from the SDK default chain; every SDK
//! failure surfaces as `ScalingError::Platform` except "stack does not
//! exist", which maps to `NotFound`.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_cloudformation::types::StackStatus;
use aws_sdk_cloudwatch::types::{
    ComparisonOperator, Dimension, MetricAlarm, StandardUnit, Statistic,
};
use tracing::{debug, info};

use super::{AlarmControl, ContainerServices, ScalingGroups, StackCatalog};
use crate::error::{Result, ScalingError};
use crate::models::{AlarmDefinition, AlarmDimension, CapacitySnapshot, CapacityUpdate};
use crate::resolve::ConfigRecord;

/// DescribeAlarms accepts at most this many names per call
const MAX_ALARM_NAMES_PER_CALL: usize = 100;

/// SDK clients for one region
#[derive(Clone)]
pub struct AwsPlatform {
    cloudformation: aws_sdk_cloudformation::Client,
    autoscaling: aws_sdk_autoscaling::Client,
    ecs: aws_sdk_ecs::Client,
    cloudwatch: aws_sdk_cloudwatch::Client,
}

impl AwsPlatform {
    /// Load shared configuration for `region` (and optionally a named profile)
    pub async fn connect(region: &str, profile: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()));
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let shared = loader.load().await;
        info!(region = %region, profile = ?profile, "AWS clients configured");
        Self::from_conf(&shared)
    }

    pub fn from_conf(shared: &aws_config::SdkConfig) -> Self {
        Self {
            cloudformation: aws_sdk_cloudformation::Client::new(shared),
            autoscaling: aws_sdk_autoscaling::Client::new(shared),
            ecs: aws_sdk_ecs::Client::new(shared),
            cloudwatch: aws_sdk_cloudwatch::Client::new(shared),
        }
    }
}

/// SDK members are `T` or `Option<T>` depending on whether the service
/// model marks them required; this flattens both to `Option<T>`.
trait SdkMember<T> {
    fn member(self) -> Option<T>;
}

impl<'a> SdkMember<&'a str> for &'a str {
    fn member(self) -> Option<&'a str> {
        Some(self)
    }
}

impl<'a> SdkMember<&'a str> for Option<&'a str> {
    fn member(self) -> Option<&'a str> {
        self
    }
}

impl SdkMember<i32> for i32 {
    fn member(self) -> Option<i32> {
        Some(self)
    }
}

impl SdkMember<i32> for Option<i32> {
    fn member(self) -> Option<i32> {
        self
    }
}

impl<'a> SdkMember<&'a StackStatus> for &'a StackStatus {
    fn member(self) -> Option<&'a StackStatus> {
        Some(self)
    }
}

impl<'a> SdkMember<&'a StackStatus> for Option<&'a StackStatus> {
    fn member(self) -> Option<&'a StackStatus> {
        self
    }
}

/// Same idea for builders whose `build()` may or may not be fallible
trait SdkBuilt<T> {
    fn built(self) -> Result<T>;
}

impl SdkBuilt<Dimension> for Dimension {
    fn built(self) -> Result<Dimension> {
        Ok(self)
    }
}

impl SdkBuilt<Dimension> for std::result::Result<Dimension, aws_sdk_cloudwatch::error::BuildError> {
    fn built(self) -> Result<Dimension> {
        self.map_err(|e| ScalingError::platform("PutMetricAlarm", e))
    }
}

fn count_from_sdk(operation: &str, field: &str, value: Option<i32>) -> Result<u32> {
    let value = value
        .ok_or_else(|| ScalingError::platform(operation, format!("response has no {}", field)))?;
    u32::try_from(value)
        .map_err(|_| ScalingError::platform(operation, format!("negative {}: {}", field, value)))
}

fn count_to_sdk(value: u32) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| ScalingError::Configuration(format!("capacity {} out of range", value)))
}

/// Single-metric alarms only: metric-math alarms, anomaly-band alarms and
/// alarms missing a required PutMetricAlarm field are never rewritten.
fn alarm_from_sdk(alarm: &MetricAlarm) -> Option<AlarmDefinition> {
    if alarm.threshold_metric_id().is_some() {
        debug!(alarm = ?alarm.alarm_name(), "Skipping threshold-band alarm");
        return None;
    }

    let (Some(alarm_name), Some(metric_name), Some(namespace)) =
        (alarm.alarm_name(), alarm.metric_name(), alarm.namespace())
    else {
        return None;
    };
    let (Some(evaluation_periods), Some(comparison_operator), Some(threshold)) = (
        alarm.evaluation_periods(),
        alarm.comparison_operator(),
        alarm.threshold(),
    ) else {
        debug!(alarm = %alarm_name, "Skipping alarm with incomplete definition");
        return None;
    };

    Some(AlarmDefinition {
        alarm_name: alarm_name.to_string(),
        metric_name: metric_name.to_string(),
        namespace: namespace.to_string(),
        statistic: alarm.statistic().map(|s| s.as_str().to_string()),
        extended_statistic: alarm.extended_statistic().map(str::to_string),
        period: alarm.period(),
        evaluation_periods,
        comparison_operator: comparison_operator.as_str().to_string(),
        threshold,
        dimensions: alarm
            .dimensions()
            .iter()
            .filter_map(|d| {
                Some(AlarmDimension {
                    name: d.name().member()?.to_string(),
                    value: d.value().member()?.to_string(),
                })
            })
            .collect(),
        alarm_actions: alarm.alarm_actions().to_vec(),
        ok_actions: alarm.ok_actions().to_vec(),
        insufficient_data_actions: alarm.insufficient_data_actions().to_vec(),
        description: alarm.alarm_description().map(str::to_string),
        datapoints_to_alarm: alarm.datapoints_to_alarm(),
        treat_missing_data: alarm.treat_missing_data().map(str::to_string),
        evaluate_low_sample_count_percentile: alarm
            .evaluate_low_sample_count_percentile()
            .map(str::to_string),
        actions_enabled: alarm.actions_enabled(),
        unit: alarm.unit().map(|u| u.as_str().to_string()),
    })
}

#[async_trait]
impl StackCatalog for AwsPlatform {
    async fn list_stack_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let page = self
                .cloudformation
                .list_stacks()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| ScalingError::platform("ListStacks", DisplayErrorContext(&e)))?;

            for summary in page.stack_summaries() {
                if summary.stack_status().member() == Some(&StackStatus::DeleteComplete) {
                    continue;
                }
                if let Some(name) = summary.stack_name().member() {
                    names.push(name.to_string());
                }
            }

            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!(count = names.len(), "Listed stacks");
        Ok(names)
    }

    async fn describe_stack(&self, name: &str) -> Result<ConfigRecord> {
        let output = match self
            .cloudformation
            .describe_stacks()
            .stack_name(name)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) if e.message().is_some_and(|m| m.contains("does not exist")) => {
                return Err(ScalingError::not_found(format!("stack {}", name)));
            }
            Err(e) => {
                return Err(ScalingError::platform(
                    "DescribeStacks",
                    DisplayErrorContext(&e),
                ))
            }
        };

        let stack = output
            .stacks()
            .first()
            .ok_or_else(|| ScalingError::not_found(format!("stack {}", name)))?;

        let mut record = ConfigRecord::new(name);
        for parameter in stack.parameters() {
            if let (Some(key), Some(value)) = (parameter.parameter_key(), parameter.parameter_value())
            {
                record.parameters.insert(key.to_string(), value.to_string());
            }
        }
        for output in stack.outputs() {
            if let (Some(key), Some(value)) = (output.output_key(), output.output_value()) {
                record.outputs.insert(key.to_string(), value.to_string());
            }
        }

        Ok(record)
    }
}

#[async_trait]
impl ScalingGroups for AwsPlatform {
    async fn describe_group(&self, name: &str) -> Result<CapacitySnapshot> {
        const OP: &str = "DescribeAutoScalingGroups";

        let output = self
            .autoscaling
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(name)
            .send()
            .await
            .map_err(|e| ScalingError::platform(OP, DisplayErrorContext(&e)))?;

        let group = output
            .auto_scaling_groups()
            .first()
            .ok_or_else(|| ScalingError::not_found(format!("auto scaling group {}", name)))?;

        Ok(CapacitySnapshot {
            min: count_from_sdk(OP, "MinSize", group.min_size().member())?,
            max: count_from_sdk(OP, "MaxSize", group.max_size().member())?,
            desired: count_from_sdk(OP, "DesiredCapacity", group.desired_capacity().member())?,
        })
    }

    async fn update_group(&self, name: &str, update: &CapacityUpdate) -> Result<()> {
        // One call carries every field, so the API validates the final state only.
        self.autoscaling
            .update_auto_scaling_group()
            .auto_scaling_group_name(name)
            .set_min_size(update.min.map(count_to_sdk).transpose()?)
            .set_max_size(update.max.map(count_to_sdk).transpose()?)
            .set_desired_capacity(update.desired.map(count_to_sdk).transpose()?)
            .send()
            .await
            .map_err(|e| ScalingError::platform("UpdateAutoScalingGroup", DisplayErrorContext(&e)))?;
        Ok(())
    }
}

#[async_trait]
impl ContainerServices for AwsPlatform {
    async fn desired_count(&self, cluster: &str, service: &str) -> Result<u32> {
        const OP: &str = "DescribeServices";

        let output = self
            .ecs
            .describe_services()
            .cluster(cluster)
            .services(service)
            .send()
            .await
            .map_err(|e| ScalingError::platform(OP, DisplayErrorContext(&e)))?;

        let found = output
            .services()
            .iter()
            .find(|s| s.service_name() == Some(service))
            .ok_or_else(|| ScalingError::not_found(format!("service {} in {}", service, cluster)))?;

        count_from_sdk(OP, "desiredCount", found.desired_count().member())
    }

    async fn set_desired_count(&self, cluster: &str, service: &str, count: u32) -> Result<()> {
        self.ecs
            .update_service()
            .cluster(cluster)
            .service(service)
            .desired_count(count_to_sdk(count)?)
            .send()
            .await
            .map_err(|e| ScalingError::platform("UpdateService", DisplayErrorContext(&e)))?;
        Ok(())
    }
}

#[async_trait]
impl AlarmControl for AwsPlatform {
    async fn list_alarm_names(&self, filter: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let page = self
                .cloudwatch
                .describe_alarms()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| ScalingError::platform("DescribeAlarms", DisplayErrorContext(&e)))?;

            names.extend(
                page.metric_alarms()
                    .iter()
                    .filter_map(|a| a.alarm_name())
                    .filter(|name| name.contains(filter))
                    .map(str::to_string),
            );

            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(names)
    }

    async fn describe_alarms(&self, names: &[String]) -> Result<Vec<AlarmDefinition>> {
        let mut alarms = Vec::new();

        for chunk in names.chunks(MAX_ALARM_NAMES_PER_CALL) {
            let output = self
                .cloudwatch
                .describe_alarms()
                .set_alarm_names(Some(chunk.to_vec()))
                .send()
                .await
                .map_err(|e| ScalingError::platform("DescribeAlarms", DisplayErrorContext(&e)))?;

            alarms.extend(output.metric_alarms().iter().filter_map(alarm_from_sdk));
        }

        Ok(alarms)
    }

    async fn put_alarm(&self, alarm: &AlarmDefinition) -> Result<()> {
        let dimensions = alarm
            .dimensions
            .iter()
            .map(|d| {
                Dimension::builder()
                    .name(&d.name)
                    .value(&d.value)
                    .build()
                    .built()
            })
            .collect::<Result<Vec<_>>>()?;

        self.cloudwatch
            .put_metric_alarm()
            .alarm_name(&alarm.alarm_name)
            .metric_name(&alarm.metric_name)
            .namespace(&alarm.namespace)
            .set_statistic(alarm.statistic.as_deref().map(Statistic::from))
            .set_extended_statistic(alarm.extended_statistic.clone())
            .set_period(alarm.period)
            .evaluation_periods(alarm.evaluation_periods)
            .comparison_operator(ComparisonOperator::from(alarm.comparison_operator.as_str()))
            .threshold(alarm.threshold)
            .set_dimensions(Some(dimensions))
            .set_alarm_actions(Some(alarm.alarm_actions.clone()))
            .set_ok_actions(Some(alarm.ok_actions.clone()))
            .set_insufficient_data_actions(Some(alarm.insufficient_data_actions.clone()))
            .set_alarm_description(alarm.description.clone())
            .set_datapoints_to_alarm(alarm.datapoints_to_alarm)
            .set_treat_missing_data(alarm.treat_missing_data.clone())
            .set_evaluate_low_sample_count_percentile(
                alarm.evaluate_low_sample_count_percentile.clone(),
            )
            .set_actions_enabled(alarm.actions_enabled)
            .set_unit(alarm.unit.as_deref().map(StandardUnit::from))
            .send()
            .await
            .map_err(|e| ScalingError::platform("PutMetricAlarm", DisplayErrorContext(&e)))?;
        Ok(())
    }
}
