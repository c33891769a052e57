//! Pipeline steps.
//!
//! A [`Step`] is what the pipeline harness invokes: it names a target in a
//! namespace, carries a wait budget and a verbosity flag, and hands back a
//! [`StepOutcome`] with a verdict and the log lines explaining it.

mod build;
mod deploy;
mod service;

pub use build::{BuildStep, BuildVerifyStep};
pub use deploy::{DeployStep, DeploymentVerifyStep, ScaleStep};
pub use service::ServiceVerifyStep;

use crate::cancellation::{CancellationToken, Deadline};
use crate::config::StepConfig;
use crate::core::{FailureReason, StepOutcome, Verdict};
use crate::observability::{SpanTimer, StepLog};
use crate::reconcile::Reconciler;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::info_span;
use tracing::Instrument;

/// A unit of pipeline work against the cluster.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Returns the name of the step.
    fn name(&self) -> &str;

    /// Returns the harness-supplied configuration.
    fn config(&self) -> &StepConfig;

    /// Does the work. `reconciler` is already bound to the configured
    /// namespace.
    async fn execute(&self, reconciler: &Reconciler, deadline: &Deadline, log: &StepLog) -> Verdict;

    /// Runs the step within its wait budget.
    async fn run(&self, reconciler: &Reconciler, log: &StepLog) -> StepOutcome {
        self.run_until(reconciler, log, None).await
    }

    /// Runs the step within its wait budget, stopping early if `token` fires.
    async fn run_until(
        &self,
        reconciler: &Reconciler,
        log: &StepLog,
        token: Option<Arc<CancellationToken>>,
    ) -> StepOutcome {
        let timer = SpanTimer::start(self.name());
        let config = self.config();
        if let Err(e) = config.validate() {
            log.error(format!("{}: {e}", self.name()));
            return StepOutcome::failed(
                FailureReason::InvalidConfig(e.to_string()),
                log.rendered(),
                timer.finish(),
            );
        }

        let mut deadline = Deadline::new(config.wait_time.as_duration());
        let mut reconciler = reconciler.in_namespace(&config.namespace);
        if let Some(token) = token {
            deadline = deadline.with_token(token.clone());
            reconciler = reconciler.with_cancellation(token);
        }
        log.verbose(format!(
            "{} {} in {} (wait time {})",
            self.name(),
            config.target,
            config.namespace,
            config.wait_time
        ));

        let span = info_span!("step", step = %self.name(), target = %config.target, run_id = %log.run_id());
        let verdict = self.execute(&reconciler, &deadline, log).instrument(span).await;
        match &verdict {
            Ok(()) => log.info(format!("{} succeeded", self.name())),
            Err(reason) => log.error(format!("{} failed: {reason}", self.name())),
        }
        StepOutcome::from_verdict(verdict, log.rendered(), timer.finish())
    }
}

/// Runs `step` with a fresh log honoring its verbosity flag.
pub async fn run_step(step: &dyn Step, reconciler: &Reconciler) -> StepOutcome {
    let log = StepLog::new(step.name(), step.config().verbose);
    step.run(reconciler, &log).await
}
