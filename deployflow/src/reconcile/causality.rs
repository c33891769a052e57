//! Image-change causality verification.
//!
//! A rollout existing is not proof that a build's image reached it. For each
//! deployment config that watches the build's output image, the verifier
//! checks that its image-change trigger fired and that the digest it now
//! runs differs from the one recorded by the previous generation.
//!
//! Generation 1 is exempt: its cause is ambiguous, since the config-change
//! and image-change triggers can fire together on first creation.

use super::{cancelled, child_at, Reconciler};
use crate::cancellation::Deadline;
use crate::client::ListOptions;
use crate::core::{
    BuildConfig, DeploymentConfig, FailureReason, ProofGap, ResourceKind, RolloutInstance,
    Verdict,
};
use crate::observability::StepLog;
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, Instrument};

/// How failing candidates are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    /// Stop at the first deployment that cannot be verified.
    #[default]
    FailFast,
    /// Check every deployment and log each failure; the verdict is the
    /// first failure.
    ReportAll,
}

impl Reconciler {
    /// Verifies that the output image of `build_config` propagated into
    /// every deployment config watching it.
    pub async fn verify_image_propagation(
        &self,
        build_config: &str,
        deadline: &Deadline,
        log: &StepLog,
    ) -> Verdict {
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
        let Some(output) = config.output_image() else {
            log.verbose(format!("build config {build_config} produces no image"));
            return Ok(());
        };
        let name_tag = output.name_tag();

        let candidates: Vec<DeploymentConfig> = self
            .cluster
            .list::<DeploymentConfig>(&ListOptions::all())
            .await?
            .into_iter()
            .filter(|dc| dc.watches_image(&name_tag))
            .collect();
        if candidates.is_empty() {
            log.verbose(format!("no deployment config watches {name_tag}"));
            return Ok(());
        }

        let mut first_failure = None;
        for candidate in &candidates {
            let span = info_span!("verify_candidate", deployment = %candidate.name(), image = %name_tag);
            match self
                .verify_candidate(candidate, &name_tag, deadline, log)
                .instrument(span)
                .await
            {
                Ok(()) => log.info(format!(
                    "deployment config {} rolled out the new {name_tag}",
                    candidate.name()
                )),
                Err(reason) => {
                    log.error(reason.to_string());
                    if self.mode == VerificationMode::FailFast {
                        return Err(reason);
                    }
                    if first_failure.is_none() {
                        first_failure = Some(reason);
                    }
                }
            }
        }

        match first_failure {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    async fn verify_candidate(
        &self,
        candidate: &DeploymentConfig,
        name_tag: &str,
        deadline: &Deadline,
        log: &StepLog,
    ) -> Verdict {
        let deployment = candidate.name().to_string();
        let unproven = |gap: ProofGap| FailureReason::MissingCausalProof {
            deployment: deployment.clone(),
            gap,
        };

        if candidate.latest_generation() == 1 {
            log.verbose(format!("{deployment} is at generation 1; accepting its rollout"));
            self.annotate_provenance::<RolloutInstance>(&candidate.rollout_name(1), deadline, log)
                .await;
            return Ok(());
        }

        let trigger_deadline = deadline.sub_deadline(self.settings.trigger_budget(deadline.budget()));
        let live = loop {
            let live = self.cluster.get::<DeploymentConfig>(&deployment).await?;
            if live.did_image_trigger(name_tag) {
                break live;
            }
            if trigger_deadline.is_cancelled() {
                return Err(cancelled(&trigger_deadline));
            }
            if trigger_deadline.is_expired() {
                return Err(unproven(ProofGap::TriggerNeverFired {
                    image: name_tag.to_string(),
                }));
            }
            log.verbose(format!("waiting for the {name_tag} trigger on {deployment} to fire"));
            trigger_deadline.sleep(self.settings.trigger_tick()).await;
        };

        let generation = live.latest_generation();
        let current = live
            .image_hex_for(name_tag)
            .ok_or_else(|| unproven(ProofGap::CurrentDigestUnresolved { generation }))?;
        if generation <= 1 {
            self.annotate_provenance::<RolloutInstance>(&live.rollout_name(generation), deadline, log)
                .await;
            return Ok(());
        }

        let previous_name = live.rollout_name(generation - 1);
        let previous = child_at(&self.cluster, &live, generation - 1)
            .await
            .ok_or_else(|| {
                unproven(ProofGap::PreviousRolloutMissing {
                    rollout: previous_name.clone(),
                })
            })?;
        let snapshot = previous.parent_snapshot().map_err(|e| {
            debug!(rollout = %previous_name, error = %e, "unusable parent snapshot");
            unproven(ProofGap::PreviousDigestUnresolved {
                rollout: previous_name.clone(),
            })
        })?;
        let prior = snapshot.image_hex_for(name_tag).ok_or_else(|| {
            unproven(ProofGap::PreviousDigestUnresolved {
                rollout: previous_name.clone(),
            })
        })?;

        if prior == current {
            return Err(unproven(ProofGap::DigestUnchanged { digest: current }));
        }
        log.verbose(format!(
            "{deployment} moved from {} to {} at generation {generation}",
            short(&prior),
            short(&current)
        ));

        self.annotate_provenance::<RolloutInstance>(&live.rollout_name(generation), deadline, log)
            .await;
        Ok(())
    }
}

fn short(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}
