//! End-to-end reconciliation runs against the in-memory control plane

use super::*;
use crate::models::{AlarmDefinition, AlarmDimension, CapacitySnapshot};
use crate::notify::Severity;
use crate::platform::{InMemoryPlatform, Mutation};
use crate::resolve::ConfigRecord;
use async_trait::async_trait;

const CLUSTER: &str = "arlitx-env1-ecs";
const GROUP: &str = "arlitx-env1-asg";
const ALARM: &str = "arlitx-env1-ecs/tomcat-batch-service-AlarmHigh-7KQ2";

fn environment_record(tenant: &str, env: &str) -> ConfigRecord {
    ConfigRecord::new(format!("ecs-{}-{}", tenant, env))
        .with_parameter("ClusterSize", "4")
        .with_parameter("ClusterSizeMax", "6")
        .with_parameter("TomcatBatchServiceMaxCapacity", "3")
        .with_parameter("FilebeatServiceMinCapacity", "1")
}

fn cluster_record(tenant: &str, env: &str) -> ConfigRecord {
    ConfigRecord::new(format!("ecs-{}-{}-ECSClusterStack-1XYZ", tenant, env))
        .with_output("ECSAutoScalingGroupName", format!("{}-{}-asg", tenant, env))
}

fn memory_alarm(threshold: f64) -> AlarmDefinition {
    AlarmDefinition {
        alarm_name: ALARM.to_string(),
        metric_name: "MemoryUtilization".to_string(),
        namespace: "AWS/ECS".to_string(),
        statistic: Some("Average".to_string()),
        extended_statistic: None,
        period: Some(60),
        evaluation_periods: 3,
        comparison_operator: "GreaterThanOrEqualToThreshold".to_string(),
        threshold,
        dimensions: vec![
            AlarmDimension {
                name: "ClusterName".to_string(),
                value: CLUSTER.to_string(),
            },
            AlarmDimension {
                name: "ServiceName".to_string(),
                value: "tomcat-batch-service".to_string(),
            },
        ],
        alarm_actions: vec!["arn:aws:autoscaling:us-east-2:123:scalingPolicy:out".to_string()],
        ok_actions: Vec::new(),
        insufficient_data_actions: Vec::new(),
        description: Some("tomcat memory high".to_string()),
        datapoints_to_alarm: Some(2),
        treat_missing_data: Some("missing".to_string()),
        evaluate_low_sample_count_percentile: None,
        actions_enabled: Some(true),
        unit: Some("Percent".to_string()),
    }
}

/// One environment sized for the night: empty pool, services at zero
fn night_state() -> InMemoryPlatform {
    InMemoryPlatform::new()
        .with_stack(environment_record("arlitx", "env1"))
        .with_stack(cluster_record("arlitx", "env1"))
        .with_group(GROUP, CapacitySnapshot::new(0, 0, 0))
        .with_service(CLUSTER, "tomcat-batch-service", 0)
        .with_service(CLUSTER, "filebeat-service", 0)
        .with_alarm(memory_alarm(130.0))
}

/// The same environment sized for the day
fn day_state() -> InMemoryPlatform {
    InMemoryPlatform::new()
        .with_stack(environment_record("arlitx", "env1"))
        .with_stack(cluster_record("arlitx", "env1"))
        .with_group(GROUP, CapacitySnapshot::new(4, 6, 4))
        .with_service(CLUSTER, "tomcat-batch-service", 3)
        .with_service(CLUSTER, "filebeat-service", 1)
        .with_alarm(memory_alarm(100.0))
}

fn reconciler(platform: &Arc<InMemoryPlatform>) -> Reconciler {
    let platform: Arc<dyn ControlPlane> = platform.clone();
    Reconciler::new(platform, PolicyConfig::default()).unwrap()
}

#[derive(Default)]
struct RecordingNotifier {
    sent: std::sync::Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) {
        self.sent.lock().unwrap().push(notification.clone());
    }
}

mod period_tests {
    use super::*;

    #[tokio::test]
    async fn test_day_run_restores_declared_sizes() {
        let platform = Arc::new(night_state());
        let report = reconciler(&platform)
            .run(Mode::All, TimePeriod::Day)
            .await
            .unwrap();

        assert_eq!(report.environments.len(), 1);
        assert_eq!(report.applied(), 2);
        assert_eq!(report.failed(), 0);

        assert_eq!(platform.group(GROUP).await, Some(CapacitySnapshot::new(4, 6, 4)));
        assert_eq!(
            platform.service_count(CLUSTER, "tomcat-batch-service").await,
            Some(3)
        );
        assert_eq!(platform.service_count(CLUSTER, "filebeat-service").await, Some(1));
        assert_eq!(platform.alarm(ALARM).await.unwrap().threshold, 100.0);

        match &report.entries[0].outcome {
            Outcome::Applied {
                changes: Changes::Pool(plan),
            } => assert_eq!(plan.branch, PoolBranch::DayRestoreMax),
            other => panic!("unexpected pool outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_night_run_descales_and_raises_threshold() {
        let platform = Arc::new(day_state());
        let report = reconciler(&platform)
            .run(Mode::All, TimePeriod::Night)
            .await
            .unwrap();

        assert_eq!(report.applied(), 2);
        assert_eq!(platform.group(GROUP).await, Some(CapacitySnapshot::new(0, 6, 0)));
        assert_eq!(
            platform.service_count(CLUSTER, "tomcat-batch-service").await,
            Some(0)
        );
        assert_eq!(platform.service_count(CLUSTER, "filebeat-service").await, Some(0));
        assert_eq!(platform.alarm(ALARM).await.unwrap().threshold, 130.0);
    }

    #[tokio::test]
    async fn test_night_floor_above_max_widens_pool() {
        let platform = Arc::new(night_state());
        let mut policy = PolicyConfig::default();
        policy.night_floor = 1;
        let reconciler = Reconciler::new(platform.clone(), policy).unwrap();

        let report = reconciler.run(Mode::Pool, TimePeriod::Night).await.unwrap();

        assert_eq!(report.entries.len(), 1);
        assert_eq!(platform.group(GROUP).await, Some(CapacitySnapshot::new(1, 1, 1)));
    }

    #[tokio::test]
    async fn test_mode_limits_variants() {
        let platform = Arc::new(day_state());
        let report = reconciler(&platform)
            .run(Mode::Services, TimePeriod::Night)
            .await
            .unwrap();

        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].variant, Variant::Services);
        assert_eq!(platform.group(GROUP).await, Some(CapacitySnapshot::new(4, 6, 4)));
    }
}

mod idempotence_tests {
    use super::*;

    #[tokio::test]
    async fn test_second_run_writes_nothing() {
        for period in [TimePeriod::Day, TimePeriod::Night] {
            let platform = Arc::new(night_state());
            let reconciler = reconciler(&platform);

            reconciler.run(Mode::All, period).await.unwrap();
            platform.clear_mutations().await;

            let report = reconciler.run(Mode::All, period).await.unwrap();
            assert_eq!(report.unchanged(), 2, "{} rerun", period);
            assert_eq!(report.write_calls(), 0);
            assert!(platform.mutations().await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_settled_environment_is_unchanged() {
        let platform = Arc::new(day_state());
        let report = reconciler(&platform)
            .run(Mode::All, TimePeriod::Day)
            .await
            .unwrap();

        assert_eq!(report.unchanged(), 2);
        assert!(platform.mutations().await.is_empty());
    }
}

mod failure_tests {
    use super::*;

    fn two_environments() -> InMemoryPlatform {
        InMemoryPlatform::new()
            .with_stack(environment_record("arlitx", "env1"))
            .with_stack(cluster_record("arlitx", "env1"))
            .with_stack(environment_record("bqwert", "env2"))
            .with_stack(cluster_record("bqwert", "env2"))
            .with_group(GROUP, CapacitySnapshot::new(4, 6, 4))
            .with_group("bqwert-env2-asg", CapacitySnapshot::new(4, 6, 4))
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_other_environments() {
        let platform = Arc::new(two_environments().failing_on(GROUP));
        let report = reconciler(&platform)
            .run(Mode::Pool, TimePeriod::Night)
            .await
            .unwrap();

        assert_eq!(report.entries.len(), 2);
        assert!(matches!(
            report.entries[0].outcome,
            Outcome::Failed { ref category, .. } if category == "platform"
        ));
        assert_eq!(report.applied(), 1);
        assert_eq!(
            platform.group("bqwert-env2-asg").await,
            Some(CapacitySnapshot::new(0, 6, 0))
        );
    }

    #[tokio::test]
    async fn test_missing_parameter_aborts_environment() {
        let platform = Arc::new(
            InMemoryPlatform::new()
                .with_stack(ConfigRecord::new("ecs-arlitx-env1").with_parameter("ClusterSizeMax", "6"))
                .with_stack(cluster_record("arlitx", "env1"))
                .with_group(GROUP, CapacitySnapshot::new(0, 0, 0)),
        );
        let report = reconciler(&platform)
            .run(Mode::Pool, TimePeriod::Day)
            .await
            .unwrap();

        match &report.entries[0].outcome {
            Outcome::Failed { error, category, .. } => {
                assert_eq!(category, "missing_parameter");
                assert!(error.contains("ClusterSize"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(platform.mutations().await.is_empty());
    }

    #[tokio::test]
    async fn test_declared_max_below_desired_only_blocks_day() {
        let platform = Arc::new(
            InMemoryPlatform::new()
                .with_stack(
                    ConfigRecord::new("ecs-arlitx-env1")
                        .with_parameter("ClusterSize", "5")
                        .with_parameter("ClusterSizeMax", "3"),
                )
                .with_stack(cluster_record("arlitx", "env1"))
                .with_group(GROUP, CapacitySnapshot::new(5, 5, 5)),
        );
        let reconciler = reconciler(&platform);

        let night = reconciler.run(Mode::Pool, TimePeriod::Night).await.unwrap();
        assert_eq!(night.applied(), 1);
        assert_eq!(platform.group(GROUP).await, Some(CapacitySnapshot::new(0, 5, 0)));

        platform.clear_mutations().await;
        let day = reconciler.run(Mode::Pool, TimePeriod::Day).await.unwrap();
        assert!(matches!(
            day.entries[0].outcome,
            Outcome::Failed { ref category, writes_applied: 0, .. } if category == "configuration"
        ));
        assert!(platform.mutations().await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_service_writes_are_reported() {
        let platform = Arc::new(day_state().failing_on(ALARM));
        let notifier = Arc::new(RecordingNotifier::default());
        let metrics = RunMetrics::new().unwrap();
        let report = reconciler(&platform)
            .with_notifier(notifier.clone())
            .with_metrics(metrics.clone())
            .run(Mode::Services, TimePeriod::Night)
            .await
            .unwrap();

        assert!(matches!(
            report.entries[0].outcome,
            Outcome::Failed { writes_applied: 2, .. }
        ));
        assert_eq!(report.write_calls(), 2);
        assert_eq!(
            platform.service_count(CLUSTER, "tomcat-batch-service").await,
            Some(0)
        );
        assert_eq!(platform.alarm(ALARM).await.unwrap().threshold, 100.0);

        assert!(metrics.render().contains("scaler_mutations_applied_total 2"));
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].severity, Severity::Alert);
        assert!(sent[0].text.contains("2 write(s) already applied"));
    }

    #[tokio::test]
    async fn test_missing_cluster_stack_skips_environment() {
        let platform = Arc::new(
            InMemoryPlatform::new()
                .with_stack(environment_record("arlitx", "env1"))
                .with_group(GROUP, CapacitySnapshot::new(0, 0, 0)),
        );
        let report = reconciler(&platform)
            .run(Mode::Pool, TimePeriod::Day)
            .await
            .unwrap();

        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 0);
    }

    #[tokio::test]
    async fn test_missing_alarm_is_not_an_error() {
        let platform = Arc::new(
            InMemoryPlatform::new()
                .with_stack(environment_record("arlitx", "env1"))
                .with_service(CLUSTER, "tomcat-batch-service", 3)
                .with_service(CLUSTER, "filebeat-service", 1),
        );
        let report = reconciler(&platform)
            .run(Mode::Services, TimePeriod::Night)
            .await
            .unwrap();

        assert_eq!(report.applied(), 1);
        assert_eq!(platform.mutations().await.len(), 2);
    }
}

mod dry_run_tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_plans_without_writing() {
        let platform = Arc::new(day_state());
        let report = reconciler(&platform)
            .with_dry_run(true)
            .run(Mode::All, TimePeriod::Night)
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.planned(), 2);
        assert_eq!(report.write_calls(), 0);
        assert!(platform.mutations().await.is_empty());
        assert_eq!(platform.group(GROUP).await, Some(CapacitySnapshot::new(4, 6, 4)));
    }
}

mod alarm_tests {
    use super::*;

    #[tokio::test]
    async fn test_alarm_is_written_back_whole() {
        let platform = Arc::new(day_state());
        reconciler(&platform)
            .run(Mode::Services, TimePeriod::Night)
            .await
            .unwrap();

        let written = platform.alarm(ALARM).await.unwrap();
        assert_eq!(written, memory_alarm(130.0));
        assert!(platform.mutations().await.contains(&Mutation::AlarmThreshold {
            alarm: ALARM.to_string(),
            threshold: 130.0,
        }));
    }

    #[tokio::test]
    async fn test_target_tracking_alarm_names_match() {
        let mut tracking = memory_alarm(100.0);
        tracking.alarm_name = format!(
            "TargetTracking-service/{}/tomcat-batch-service-AlarmHigh-5b1e",
            CLUSTER
        );

        let platform = Arc::new(day_state().with_alarm(tracking.clone()));
        reconciler(&platform)
            .run(Mode::Services, TimePeriod::Night)
            .await
            .unwrap();

        let written = platform.alarm(&tracking.alarm_name).await.unwrap();
        assert_eq!(written.threshold, 130.0);
    }

    #[tokio::test]
    async fn test_alarms_on_other_metrics_are_left_alone() {
        let mut cpu = memory_alarm(80.0);
        cpu.alarm_name = format!("{}-cpu", ALARM);
        cpu.metric_name = "CPUUtilization".to_string();

        let platform = Arc::new(day_state().with_alarm(cpu.clone()));
        reconciler(&platform)
            .run(Mode::Services, TimePeriod::Night)
            .await
            .unwrap();

        assert_eq!(platform.alarm(&cpu.alarm_name).await, Some(cpu));
    }
}

mod filter_tests {
    use super::*;

    #[tokio::test]
    async fn test_env_filter_limits_discovery() {
        let platform = Arc::new(
            night_state()
                .with_stack(environment_record("bqwert", "env2"))
                .with_stack(cluster_record("bqwert", "env2")),
        );
        let reconciler = reconciler(&platform).with_env_filter("ENV2");

        let found = reconciler.discover().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, EnvironmentKey::new("bqwert", "env2"));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("pool".parse::<Mode>().unwrap(), Mode::Pool);
        assert_eq!("Services".parse::<Mode>().unwrap(), Mode::Services);
        assert_eq!(Mode::default(), Mode::All);
        assert!(matches!(
            "everything".parse::<Mode>(),
            Err(ScalingError::Configuration(_))
        ));
    }
}

mod notification_tests {
    use super::*;

    #[tokio::test]
    async fn test_applied_and_failed_environments_notify() {
        let platform = Arc::new(
            night_state()
                .with_stack(environment_record("bqwert", "env2"))
                .with_stack(cluster_record("bqwert", "env2"))
                .with_group("bqwert-env2-asg", CapacitySnapshot::new(0, 0, 0))
                .failing_on("bqwert-env2-asg"),
        );
        let notifier = Arc::new(RecordingNotifier::default());
        reconciler(&platform)
            .with_notifier(notifier.clone())
            .run(Mode::Pool, TimePeriod::Day)
            .await
            .unwrap();

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].severity, Severity::Info);
        assert!(sent[0].text.contains("arlitx/env1"));
        assert!(sent[0].text.contains("day_restore_max"));
        assert_eq!(sent[1].severity, Severity::Alert);
        assert!(sent[1].text.contains("bqwert/env2"));
    }

    #[tokio::test]
    async fn test_unchanged_environment_is_silent() {
        let platform = Arc::new(day_state());
        let notifier = Arc::new(RecordingNotifier::default());
        reconciler(&platform)
            .with_notifier(notifier.clone())
            .run(Mode::All, TimePeriod::Day)
            .await
            .unwrap();

        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_follow_outcomes() {
        let platform = Arc::new(night_state());
        let metrics = RunMetrics::new().unwrap();
        reconciler(&platform)
            .with_metrics(metrics.clone())
            .run(Mode::All, TimePeriod::Day)
            .await
            .unwrap();

        let text = metrics.render();
        assert!(text.contains("scaler_environments_discovered 1"));
        assert!(text.contains("scaler_environments_reconciled_total 2"));
        assert!(text.contains("scaler_mutations_applied_total 4"));
    }
}
