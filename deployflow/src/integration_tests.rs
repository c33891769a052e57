//! End-to-end scenarios across steps, reconcilers and the retry client.

#[cfg(test)]
mod tests {
    use crate::config::StepConfig;
    use crate::core::{
        BuildPhase, DeploymentCause, DeploymentConfig, DeploymentDetails, ResourceKind,
        RolloutInstance, RolloutPhase, TypedResource,
    };
    use crate::errors::ClusterError;
    use crate::reconcile::{ProvenanceContext, PROVENANCE_ANNOTATION};
    use crate::steps::{run_step, BuildStep, DeployStep, ScaleStep, Step};
    use crate::testing::{
        assert_log_mentions, assert_step_failed_with, assert_step_succeeded, fixtures,
        FakeCluster, Operation,
    };
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    const NS: &str = fixtures::NAMESPACE;

    fn step_config(target: &str, wait: &str) -> StepConfig {
        StepConfig::new(NS, target)
            .with_wait_text(wait)
            .unwrap()
            .with_verbose(true)
    }

    /// A cluster holding build config `app` that pushes `app:latest` and a
    /// deployment config `app` watching it.
    fn release_cluster(generation: u64) -> Arc<FakeCluster> {
        let cluster = Arc::new(FakeCluster::new().with_auto_rollout(RolloutPhase::Complete));
        cluster.insert(fixtures::build_config("app", "app:latest"));
        cluster.insert(fixtures::watching_deployment("app", "app:latest", 1).with_generation(generation));
        cluster.script_build_phases(NS, "app-1", &[BuildPhase::Pending, BuildPhase::Complete]);
        cluster
    }

    #[tokio::test]
    async fn test_terminal_error_makes_one_attempt() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.always_fail(
            Operation::Get,
            ResourceKind::DeploymentConfig,
            ClusterError::from_status(403, "deploymentconfigs is forbidden"),
        );
        let reconciler = fixtures::reconciler(cluster.clone());

        let outcome = run_step(&DeployStep::new(step_config("app", "1sec")), &reconciler).await;

        assert_step_failed_with(&outcome, "remote");
        assert_eq!(cluster.calls(Operation::Get, ResourceKind::DeploymentConfig), 1);
    }

    #[tokio::test]
    async fn test_transient_error_makes_three_attempts() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.always_fail(
            Operation::Get,
            ResourceKind::DeploymentConfig,
            ClusterError::from_status(503, "etcd leader changed"),
        );
        let reconciler = fixtures::reconciler(cluster.clone());

        let outcome = run_step(&DeployStep::new(step_config("app", "1sec")), &reconciler).await;

        assert_step_failed_with(&outcome, "remote");
        assert_eq!(cluster.calls(Operation::Get, ResourceKind::DeploymentConfig), 3);
        assert_log_mentions(&outcome, "etcd leader changed");
    }

    #[tokio::test]
    async fn test_transient_error_recovers_within_attempts() {
        let cluster = Arc::new(FakeCluster::new().with_auto_rollout(RolloutPhase::Complete));
        cluster.insert(DeploymentConfig::new(NS, "app", 1));
        cluster.fail_next(
            Operation::Get,
            ResourceKind::DeploymentConfig,
            ClusterError::Transport("connection reset".to_string()),
            2,
        );
        let reconciler = fixtures::reconciler(cluster.clone());

        let outcome = run_step(&DeployStep::new(step_config("app", "1sec")), &reconciler).await;

        assert_step_succeeded(&outcome);
    }

    #[tokio::test]
    async fn test_generation_one_build_verified_without_trigger_poll() {
        let cluster = release_cluster(1);
        let reconciler = fixtures::reconciler(cluster.clone());

        let outcome = run_step(&BuildStep::new(step_config("app", "2sec")), &reconciler).await;

        assert_step_succeeded(&outcome);
        assert_log_mentions(&outcome, "generation 1");
        assert_eq!(cluster.calls(Operation::Get, ResourceKind::DeploymentConfig), 0);
    }

    #[tokio::test]
    async fn test_complete_build_fails_when_trigger_never_fires() {
        let cluster = release_cluster(2);
        let reconciler = fixtures::reconciler(cluster.clone());

        let outcome = run_step(&BuildStep::new(step_config("app", "90milli")), &reconciler).await;

        assert_step_failed_with(&outcome, "missing_causal_proof");
        assert_log_mentions(&outcome, "build app-1 completed");
        assert_log_mentions(&outcome, "image trigger for app:latest never fired");
    }

    #[tokio::test]
    async fn test_build_propagates_new_digest() {
        let cluster = release_cluster(0);
        cluster.trigger_image_change(NS, "app", "app:latest", &fixtures::pinned_image("app", "v0"));
        cluster.trigger_image_change(NS, "app", "app:latest", &fixtures::pinned_image("app", "v1"));

        // A manual rollout since then means the trigger has not fired for
        // the latest generation.
        let mut dc = cluster.fetch::<DeploymentConfig>(NS, "app").unwrap();
        dc.status.details = Some(DeploymentDetails {
            causes: vec![DeploymentCause::Manual],
        });
        dc.bump_generation();
        let dc = cluster.insert(dc);
        cluster.seed_rollout(&dc, RolloutPhase::Complete, 1).unwrap();

        let controller = {
            let cluster = cluster.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                cluster.trigger_image_change(NS, "app", "app:latest", &fixtures::pinned_image("app", "v2"))
            })
        };
        let reconciler = fixtures::reconciler(cluster.clone())
            .with_provenance(ProvenanceContext::new("release", "17"));

        let outcome = run_step(&BuildStep::new(step_config("app", "3sec")), &reconciler).await;

        assert_eq!(controller.await.unwrap(), Some(4));
        assert_step_succeeded(&outcome);
        let rollout = cluster.fetch::<RolloutInstance>(NS, "app-4").unwrap();
        assert_eq!(rollout.metadata().annotation(PROVENANCE_ANNOTATION), Some("job/release/17/"));
    }

    #[tokio::test]
    async fn test_retriggered_same_digest_fails() {
        let cluster = release_cluster(0);
        let image = fixtures::pinned_image("app", "v1");
        cluster.trigger_image_change(NS, "app", "app:latest", &image);
        cluster.trigger_image_change(NS, "app", "app:latest", &image);
        let reconciler = fixtures::reconciler(cluster.clone());

        let outcome = run_step(&BuildStep::new(step_config("app", "2sec")), &reconciler).await;

        assert_step_failed_with(&outcome, "missing_causal_proof");
        assert_log_mentions(&outcome, "did not change between generations");
    }

    #[tokio::test]
    async fn test_scale_to_current_count_succeeds_on_first_poll() {
        let cluster = Arc::new(FakeCluster::new());
        let dc = cluster.insert(DeploymentConfig::new(NS, "app", 2).with_generation(1));
        cluster.seed_rollout(&dc, RolloutPhase::Complete, 2).unwrap();
        let reconciler = fixtures::reconciler(cluster.clone());

        let outcome = run_step(&ScaleStep::new(step_config("app", "1sec"), 2), &reconciler).await;

        assert_step_succeeded(&outcome);
        assert_eq!(cluster.calls(Operation::Get, ResourceKind::DeploymentConfig), 1);
        assert_eq!(cluster.calls(Operation::Update, ResourceKind::ReplicationController), 0);
    }

    #[tokio::test]
    async fn test_scale_to_zero_without_rollout() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.insert(DeploymentConfig::new(NS, "app", 2));
        let reconciler = fixtures::reconciler(cluster);

        let outcome = run_step(&ScaleStep::new(step_config("app", "1sec"), 0), &reconciler).await;

        assert_step_succeeded(&outcome);
    }

    #[tokio::test]
    async fn test_scale_stuck_running_reports_rollout_and_target() {
        let cluster = Arc::new(FakeCluster::new());
        let dc = cluster.insert(DeploymentConfig::new(NS, "app", 3).with_generation(1));
        cluster.seed_rollout(&dc, RolloutPhase::Running, 1).unwrap();
        let reconciler = fixtures::reconciler(cluster);

        let outcome = run_step(&ScaleStep::new(step_config("app", "60milli"), 3), &reconciler).await;

        assert_step_failed_with(&outcome, "timeout");
        assert_log_mentions(&outcome, "app-1");
        assert_log_mentions(&outcome, "target=3");
    }

    #[tokio::test]
    async fn test_waiters_respect_deadline() {
        let cluster = Arc::new(FakeCluster::new().with_auto_rollout(RolloutPhase::Running));
        cluster.insert(DeploymentConfig::new(NS, "app", 1));
        cluster.insert(fixtures::build_config("app", "app:latest"));
        cluster.script_build_phases(NS, "app-1", &[BuildPhase::Running]);
        let reconciler = fixtures::reconciler(cluster.clone())
            .with_settings(fixtures::fast_settings().with_status_tick_ms(25));
        let budget = Duration::from_millis(100);
        let tick = reconciler.settings().status_tick();

        let steps: Vec<Box<dyn Step>> = vec![
            Box::new(BuildStep::new(step_config("app", "100milli"))),
            Box::new(DeployStep::new(step_config("app", "100milli"))),
            Box::new(ScaleStep::new(step_config("app", "100milli"), 1)),
        ];
        for step in steps {
            let started = Instant::now();
            let outcome = run_step(step.as_ref(), &reconciler).await;
            let elapsed = started.elapsed();

            assert_step_failed_with(&outcome, "timeout");
            // One tick of slack for the final poll, plus scheduling jitter.
            assert!(elapsed < budget + tick + Duration::from_millis(250), "{} took {elapsed:?}", step.name());
        }
    }

    #[tokio::test]
    async fn test_late_build_completion_stays_within_budget() {
        let cluster = release_cluster(2);
        cluster.script_build_phases(NS, "app-1", &[BuildPhase::Running]);
        let reconciler = fixtures::reconciler(cluster.clone())
            .with_settings(fixtures::fast_settings().with_status_tick_ms(10));
        let budget = Duration::from_millis(900);
        let tick = reconciler.settings().status_tick();

        // The build completes with a third of the budget's trigger window
        // still ahead of it, but only 100ms of the step budget left.
        let controller = {
            let cluster = cluster.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(800)).await;
                cluster.script_build_phases(NS, "app-1", &[BuildPhase::Complete]);
            })
        };

        let started = Instant::now();
        let outcome = run_step(&BuildStep::new(step_config("app", "900milli")), &reconciler).await;
        let elapsed = started.elapsed();
        controller.await.unwrap();

        assert_step_failed_with(&outcome, "missing_causal_proof");
        assert_log_mentions(&outcome, "never fired");
        assert!(elapsed < budget + tick + Duration::from_millis(100), "build took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_outcome_reports_reason_as_json() {
        let cluster = Arc::new(FakeCluster::new());
        let reconciler = fixtures::reconciler(cluster);

        let outcome = run_step(&DeployStep::new(step_config("ghost", "1sec")), &reconciler).await;
        let json = outcome.to_json();

        assert_eq!(json["success"], false);
        assert_eq!(json["reason"], "missing_parent");
        assert_eq!(json["message"], "no such DeploymentConfig 'ghost'");
    }
}
