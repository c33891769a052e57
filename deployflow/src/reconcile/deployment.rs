//! The deployment completion waiter.

use super::{cancelled, latest_child, Reconciler};
use crate::cancellation::Deadline;
use crate::core::{
    DeploymentConfig, FailureReason, ResourceKind, RolloutInstance, RolloutPhase, Verdict,
};
use crate::observability::StepLog;
use tracing::instrument;

impl Reconciler {
    /// Requests a new rollout of `deployment` and waits for it to finish.
    ///
    /// The generation is bumped once. A failed bump is retried on the next
    /// tick, since a freshly created config may not be writable yet.
    #[instrument(skip(self, deadline, log))]
    pub async fn wait_for_deployment(
        &self,
        deployment: &str,
        deadline: &Deadline,
        log: &StepLog,
    ) -> Verdict {
        let mut bumped = false;
        let mut last: Option<(String, RolloutPhase)> = None;

        loop {
            if deadline.is_cancelled() {
                return Err(cancelled(deadline));
            }

            let mut config = match self.cluster.find::<DeploymentConfig>(deployment).await {
                Ok(Some(config)) => config,
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

            if !bumped {
                if let Some(stored) = self.request_rollout(&config, log).await {
                    config = stored;
                    bumped = true;
                }
            }

            if bumped {
                if let Some(rollout) = latest_child(&self.cluster, &config).await {
                    let phase = rollout.phase();
                    match phase {
                        RolloutPhase::Failed => {
                            log.error(format!("rollout {} failed", rollout.name()));
                            return Err(FailureReason::TerminalState {
                                subject: format!("rollout {}", rollout.name()),
                                phase: phase.to_string(),
                            });
                        }
                        RolloutPhase::Complete => {
                            log.info(format!("rollout {} completed", rollout.name()));
                            self.annotate_provenance::<RolloutInstance>(rollout.name(), deadline, log)
                                .await;
                            return Ok(());
                        }
                        _ => {
                            if last.as_ref().map(|(_, seen)| *seen) != Some(phase) {
                                log.verbose(format!("rollout {} is {phase}", rollout.name()));
                            }
                        }
                    }
                    last = Some((rollout.name().to_string(), phase));
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
            Some((name, phase)) => format!("rollout {name} phase {phase}"),
            None => format!("no rollout of {deployment} observed"),
        };
        log.error(format!(
            "deployment {deployment} did not complete within {}ms; {last_observed}",
            deadline.budget().as_millis()
        ));
        Err(FailureReason::Timeout {
            waited_ms: deadline.elapsed_ms(),
            last_observed,
        })
    }

    async fn request_rollout(&self, config: &DeploymentConfig, log: &StepLog) -> Option<DeploymentConfig> {
        let mut next = config.clone();
        let generation = next.bump_generation();
        match self.cluster.update(&next).await {
            Ok(stored) => {
                log.info(format!("requested rollout {}", stored.rollout_name(generation)));
                Some(stored)
            }
            Err(e) => {
                log.warn(format!(
                    "could not advance {} to generation {generation}: {e}; will retry",
                    config.name()
                ));
                None
            }
        }
    }
}
