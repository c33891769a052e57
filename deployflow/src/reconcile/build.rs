//! Build triggering and the build completion waiter.

use super::{cancelled, latest_child, Reconciler};
use crate::cancellation::Deadline;
use crate::core::{Build, BuildConfig, BuildPhase, BuildRequest, FailureReason, ResourceKind, Verdict};
use crate::observability::StepLog;
use tracing::{debug, instrument};

/// The build config a build belongs to: the ownership label, or the name
/// with its `-N` sequence suffix removed.
fn owning_config(build: &Build) -> String {
    build
        .build_config_name()
        .map(str::to_string)
        .or_else(|| build.name().rsplit_once('-').map(|(prefix, _)| prefix.to_string()))
        .unwrap_or_else(|| build.name().to_string())
}

impl Reconciler {
    /// Instantiates a new build from `build_config`.
    pub async fn trigger_build(
        &self,
        build_config: &str,
        request: &BuildRequest,
        log: &StepLog,
    ) -> Result<Build, FailureReason> {
        match self.cluster.find::<BuildConfig>(build_config).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(FailureReason::MissingParent {
                    kind: ResourceKind::BuildConfig,
                    name: build_config.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        }

        let build = self.cluster.instantiate(build_config, request).await?;
        log.info(format!("started build {}", build.name()));
        if let Some(revision) = &request.revision {
            log.verbose(format!("building revision {revision}"));
        }
        Ok(build)
    }

    /// Waits for `build` to reach a terminal phase.
    ///
    /// A `Complete` build still fails the verdict when its output image
    /// cannot be shown to have propagated to the deployments watching it.
    #[instrument(skip(self, deadline, log))]
    pub async fn wait_for_build(&self, build: &str, deadline: &Deadline, log: &StepLog) -> Verdict {
        let mut last: Option<BuildPhase> = None;
        log.verbose(format!("waiting for build {build}"));

        loop {
            if deadline.is_cancelled() {
                return Err(cancelled(deadline));
            }

            match self.cluster.get::<Build>(build).await {
                Ok(current) => {
                    let phase = current.phase();
                    if last != Some(phase) {
                        log.verbose(format!("build {build} is {phase}"));
                    }
                    last = Some(phase);
                    if phase.is_terminal() {
                        return self.finish_build(&current, deadline, log).await;
                    }
                }
                Err(e) if e.is_not_found() => {
                    debug!(%build, "build not visible yet");
                }
                Err(e) => {
                    log.error(format!("could not read build {build}: {e}"));
                    return Err(e.into());
                }
            }

            if deadline.is_expired() {
                break;
            }
            deadline.sleep(self.settings.status_tick()).await;
        }

        if deadline.is_cancelled() {
            return Err(cancelled(deadline));
        }
        let last_observed = last.map_or_else(|| "NotStarted".to_string(), |phase| phase.to_string());
        log.error(format!(
            "build {build} did not finish within {}ms; last status {last_observed}",
            deadline.budget().as_millis()
        ));
        Err(FailureReason::Timeout {
            waited_ms: deadline.elapsed_ms(),
            last_observed,
        })
    }

    async fn finish_build(&self, build: &Build, deadline: &Deadline, log: &StepLog) -> Verdict {
        let phase = build.phase();
        if !phase.is_success() {
            log.error(format!("build {} ended in phase {phase}", build.name()));
            return Err(FailureReason::TerminalState {
                subject: format!("build {}", build.name()),
                phase: phase.to_string(),
            });
        }

        log.info(format!("build {} completed", build.name()));
        if !self.verify_deployments {
            return Ok(());
        }
        self.verify_image_propagation(&owning_config(build), deadline, log)
            .await
    }

    /// Waits for the latest build of `build_config` to finish.
    pub async fn verify_latest_build(
        &self,
        build_config: &str,
        deadline: &Deadline,
        log: &StepLog,
    ) -> Verdict {
        loop {
            if deadline.is_cancelled() {
                return Err(cancelled(deadline));
            }

            let config = match self.cluster.find::<BuildConfig>(build_config).await {
                Ok(Some(config)) => config,
                Ok(None) => {
                    log.error(format!("no such build config '{build_config}'"));
                    return Err(FailureReason::MissingParent {
                        kind: ResourceKind::BuildConfig,
                        name: build_config.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            };

            if let Some(build) = latest_child(&self.cluster, &config).await {
                return self.wait_for_build(build.name(), deadline, log).await;
            }
            if config.status.last_version > 0 {
                // Last build is recorded but not readable yet; poll it by name.
                let name = config.build_name(config.status.last_version);
                return self.wait_for_build(&name, deadline, log).await;
            }

            log.verbose(format!("build config {build_config} has not run a build yet"));
            if deadline.is_expired() {
                break;
            }
            deadline.sleep(self.settings.status_tick()).await;
        }

        if deadline.is_cancelled() {
            return Err(cancelled(deadline));
        }
        log.error(format!("build config {build_config} never started a build"));
        Err(FailureReason::Timeout {
            waited_ms: deadline.elapsed_ms(),
            last_observed: "NotStarted".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::errors::ClusterError;
    use crate::testing::{fixtures, FakeCluster, Operation};
    use std::sync::Arc;
    use std::time::Duration;

    fn setup() -> (Arc<FakeCluster>, Reconciler) {
        let cluster = Arc::new(FakeCluster::new());
        let reconciler = fixtures::reconciler(cluster.clone());
        (cluster, reconciler)
    }

    #[test]
    fn test_owning_config_fallback() {
        let labelled = Build::new("demo", "frontend-7", "frontend");
        assert_eq!(owning_config(&labelled), "frontend");

        let mut unlabelled = Build::new("demo", "my-app-3", "ignored");
        unlabelled.metadata.labels.clear();
        assert_eq!(owning_config(&unlabelled), "my-app");
    }

    #[tokio::test]
    async fn test_trigger_build_instantiates() {
        let (cluster, reconciler) = setup();
        cluster.insert(BuildConfig::new(fixtures::NAMESPACE, "app"));
        let log = StepLog::new("build", true);

        let request = BuildRequest::new().with_revision("abc123");
        let build = reconciler.trigger_build("app", &request, &log).await.unwrap();

        assert_eq!(build.name(), "app-1");
        assert!(log.contains("started build app-1"));
        assert!(log.contains("abc123"));
    }

    #[tokio::test]
    async fn test_trigger_build_missing_config() {
        let (cluster, reconciler) = setup();
        let log = StepLog::new("build", false);

        let err = reconciler
            .trigger_build("ghost", &BuildRequest::new(), &log)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "missing_parent");
        assert_eq!(cluster.calls(Operation::Instantiate, ResourceKind::BuildConfig), 0);
    }

    #[tokio::test]
    async fn test_build_complete_without_watchers() {
        let (cluster, reconciler) = setup();
        cluster.insert(fixtures::build_config("app", "app:latest"));
        cluster.insert(Build::new(fixtures::NAMESPACE, "app-1", "app"));
        cluster.script_build_phases(
            fixtures::NAMESPACE,
            "app-1",
            &[BuildPhase::Pending, BuildPhase::Running, BuildPhase::Complete],
        );
        let log = StepLog::new("build", true);

        let verdict = reconciler
            .wait_for_build("app-1", &Deadline::new(Duration::from_secs(5)), &log)
            .await;

        assert!(verdict.is_ok());
        assert!(log.contains("build app-1 is Running"));
        assert!(log.contains("build app-1 completed"));
    }

    #[tokio::test]
    async fn test_build_failed_is_terminal() {
        let (cluster, reconciler) = setup();
        cluster.insert(Build::new(fixtures::NAMESPACE, "app-1", "app"));
        cluster.set_build_phase(fixtures::NAMESPACE, "app-1", BuildPhase::Failed);
        let log = StepLog::new("build", false);

        let err = reconciler
            .wait_for_build("app-1", &Deadline::new(Duration::from_secs(5)), &log)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            FailureReason::TerminalState {
                subject: "build app-1".to_string(),
                phase: "Failed".to_string(),
            }
        );
        // No propagation check runs for a failed build.
        assert_eq!(cluster.calls(Operation::List, ResourceKind::DeploymentConfig), 0);
    }

    #[tokio::test]
    async fn test_build_never_seen_times_out_not_started() {
        let (_cluster, reconciler) = setup();
        let log = StepLog::new("build", false);

        let err = reconciler
            .wait_for_build("app-9", &Deadline::new(Duration::from_millis(40)), &log)
            .await
            .unwrap_err();

        match err {
            FailureReason::Timeout { last_observed, .. } => assert_eq!(last_observed, "NotStarted"),
            other => panic!("unexpected failure: {other}"),
        }
        assert!(log.contains("NotStarted"));
    }

    #[tokio::test]
    async fn test_build_stuck_running_reports_last_phase() {
        let (cluster, reconciler) = setup();
        cluster.insert(Build::new(fixtures::NAMESPACE, "app-1", "app"));
        cluster.set_build_phase(fixtures::NAMESPACE, "app-1", BuildPhase::Running);
        let log = StepLog::new("build", false);

        let err = reconciler
            .wait_for_build("app-1", &Deadline::new(Duration::from_millis(40)), &log)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Running"));
    }

    #[tokio::test]
    async fn test_build_forbidden_is_remote_failure() {
        let (cluster, reconciler) = setup();
        cluster.always_fail(
            Operation::Get,
            ResourceKind::Build,
            ClusterError::Forbidden("no access".to_string()),
        );
        let log = StepLog::new("build", false);

        let err = reconciler
            .wait_for_build("app-1", &Deadline::new(Duration::from_secs(5)), &log)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "remote");
        assert_eq!(cluster.calls(Operation::Get, ResourceKind::Build), 1);
    }

    #[tokio::test]
    async fn test_build_wait_cancelled() {
        let (cluster, reconciler) = setup();
        cluster.insert(Build::new(fixtures::NAMESPACE, "app-1", "app"));
        let token = Arc::new(CancellationToken::new());
        token.cancel("pipeline aborted");
        let deadline = Deadline::new(Duration::from_secs(60)).with_token(token);
        let log = StepLog::new("build", false);

        let err = reconciler.wait_for_build("app-1", &deadline, &log).await.unwrap_err();
        assert_eq!(err, FailureReason::Cancelled("pipeline aborted".to_string()));
    }

    #[tokio::test]
    async fn test_verify_latest_build() {
        let (cluster, reconciler) = setup();
        let mut config = BuildConfig::new(fixtures::NAMESPACE, "app");
        config.status.last_version = 4;
        cluster.insert(config);
        cluster.insert(Build::new(fixtures::NAMESPACE, "app-4", "app"));
        cluster.set_build_phase(fixtures::NAMESPACE, "app-4", BuildPhase::Complete);
        let log = StepLog::new("verify", true);

        let verdict = reconciler
            .verify_latest_build("app", &Deadline::new(Duration::from_secs(5)), &log)
            .await;
        assert!(verdict.is_ok());
        assert!(log.contains("app-4"));
    }

    #[tokio::test]
    async fn test_verify_latest_build_never_run() {
        let (cluster, reconciler) = setup();
        cluster.insert(BuildConfig::new(fixtures::NAMESPACE, "app"));
        let log = StepLog::new("verify", false);

        let err = reconciler
            .verify_latest_build("app", &Deadline::new(Duration::from_millis(30)), &log)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "timeout");
    }
}
