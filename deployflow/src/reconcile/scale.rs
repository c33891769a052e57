//! Replica scaling and verification.

use super::{cancelled, latest_child, Reconciler};
use crate::cancellation::Deadline;
use crate::core::{
    DeploymentConfig, FailureReason, ResourceKind, RolloutInstance, RolloutPhase, Verdict,
};
use crate::observability::StepLog;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Whether the scaler writes the desired count or only observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaMode {
    /// Set the desired count, then wait for it.
    #[default]
    Scale,
    /// Only wait for the rollout to settle.
    Verify,
}

/// A request to scale or verify the latest rollout of a deployment config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleRequest {
    /// The deployment config.
    pub deployment: String,
    /// Target count; the config's desired count when unset.
    #[serde(default)]
    pub target: Option<u32>,
    /// Require the running count to equal the target, not just a
    /// completed rollout.
    #[serde(default = "default_check_count")]
    pub check_count: bool,
    /// Scale or verify.
    #[serde(default)]
    pub mode: ReplicaMode,
}

fn default_check_count() -> bool {
    true
}

impl ScaleRequest {
    /// Scales `deployment` to its declared desired count.
    #[must_use]
    pub fn new(deployment: impl Into<String>) -> Self {
        Self {
            deployment: deployment.into(),
            target: None,
            check_count: default_check_count(),
            mode: ReplicaMode::Scale,
        }
    }

    /// Sets an explicit target.
    #[must_use]
    pub fn with_target(mut self, target: u32) -> Self {
        self.target = Some(target);
        self
    }

    /// Enables or disables the running-count check.
    #[must_use]
    pub fn with_check_count(mut self, check: bool) -> Self {
        self.check_count = check;
        self
    }

    /// Observes without writing.
    #[must_use]
    pub fn verify_only(mut self) -> Self {
        self.mode = ReplicaMode::Verify;
        self
    }
}

fn scaled_appropriately(rollout: &RolloutInstance, target: u32, check_count: bool) -> bool {
    rollout.phase() == RolloutPhase::Complete
        && (!check_count || rollout.current_replicas() == target)
}

impl Reconciler {
    /// Scales, or verifies, the latest rollout of a deployment config.
    ///
    /// Write failures are logged and polling continues. An explicit target
    /// of zero succeeds when nothing exists to scale down.
    #[instrument(skip(self, request, deadline, log), fields(deployment = %request.deployment))]
    pub async fn scale(&self, request: &ScaleRequest, deadline: &Deadline, log: &StepLog) -> Verdict {
        let deployment = request.deployment.as_str();
        let scale_to_zero = request.target == Some(0);
        let mut last: Option<(String, RolloutPhase, u32, u32)> = None;

        loop {
            if deadline.is_cancelled() {
                return Err(cancelled(deadline));
            }

            let config = match self.cluster.find::<DeploymentConfig>(deployment).await {
                Ok(Some(config)) => config,
                Ok(None) if scale_to_zero => {
                    log.info(format!("{deployment} does not exist; nothing to scale down"));
                    return Ok(());
                }
                Ok(None) => {
                    log.error(format!("no such deployment config '{deployment}'"));
                    return Err(FailureReason::MissingParent {
                        kind: ResourceKind::DeploymentConfig,
                        name: deployment.to_string(),
                    });
                }
                Err(e) => {
                    log.error(format!("could not read deployment config {deployment}: {e}"));
                    return Err(e.into());
                }
            };
            let goal = request.target.unwrap_or_else(|| config.desired_replicas());

            match latest_child(&self.cluster, &config).await {
                None if scale_to_zero => {
                    log.info(format!("{deployment} has no rollout; nothing to scale down"));
                    return Ok(());
                }
                None => log.verbose(format!("waiting for a rollout of {deployment}")),
                Some(mut rollout) => {
                    if request.mode == ReplicaMode::Scale && rollout.desired_replicas() != goal {
                        rollout.set_desired_replicas(goal);
                        match self.cluster.update(&rollout).await {
                            Ok(stored) => {
                                log.info(format!("scaling {} to {goal}", stored.name()));
                                rollout = stored;
                            }
                            Err(e) => log.warn(format!(
                                "could not scale {} to {goal}: {e}; will retry",
                                rollout.name()
                            )),
                        }
                    }

                    if scaled_appropriately(&rollout, goal, request.check_count) {
                        log.info(format!(
                            "rollout {} is running {} of {goal} replicas",
                            rollout.name(),
                            rollout.current_replicas()
                        ));
                        return Ok(());
                    }
                    log.verbose(format!(
                        "rollout {} phase={} replicas={} target={goal}",
                        rollout.name(),
                        rollout.phase(),
                        rollout.current_replicas()
                    ));
                    last = Some((
                        rollout.name().to_string(),
                        rollout.phase(),
                        rollout.current_replicas(),
                        goal,
                    ));
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
        let last_observed = match last {
            Some((name, phase, replicas, goal)) => {
                format!("rollout {name} phase={phase} replicas={replicas} target={goal}")
            }
            None => match request.target {
                Some(goal) => format!("no rollout of {deployment} found; target={goal}"),
                None => format!("no rollout of {deployment} found"),
            },
        };
        log.error(format!("{deployment} was not scaled appropriately: {last_observed}"));
        Err(FailureReason::Timeout {
            waited_ms: deadline.elapsed_ms(),
            last_observed,
        })
    }
}
