//! Build steps.

use super::Step;
use crate::cancellation::Deadline;
use crate::config::StepConfig;
use crate::core::{BuildRequest, Verdict};
use crate::observability::StepLog;
use crate::reconcile::Reconciler;
use async_trait::async_trait;

/// Starts a build from the target build config and waits for it, including
/// image propagation into watching deployments.
#[derive(Debug, Clone)]
pub struct BuildStep {
    config: StepConfig,
    request: BuildRequest,
}

impl BuildStep {
    /// Creates a build step for the build config named by `config.target`.
    #[must_use]
    pub fn new(config: StepConfig) -> Self {
        Self {
            config,
            request: BuildRequest::new(),
        }
    }

    /// Builds a specific source revision.
    #[must_use]
    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.request = self.request.with_revision(commit);
        self
    }

    /// Adds a build environment override.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request = self.request.with_env(key, value);
        self
    }
}

#[async_trait]
impl Step for BuildStep {
    fn name(&self) -> &str {
        "build"
    }

    fn config(&self) -> &StepConfig {
        &self.config
    }

    async fn execute(&self, reconciler: &Reconciler, deadline: &Deadline, log: &StepLog) -> Verdict {
        let build = reconciler
            .trigger_build(&self.config.target, &self.request, log)
            .await?;
        reconciler.wait_for_build(build.name(), deadline, log).await
    }
}

/// Waits for the latest build of the target build config.
#[derive(Debug, Clone)]
pub struct BuildVerifyStep {
    config: StepConfig,
}

impl BuildVerifyStep {
    /// Creates a verify step for the build config named by `config.target`.
    #[must_use]
    pub fn new(config: StepConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Step for BuildVerifyStep {
    fn name(&self) -> &str {
        "build-verify"
    }

    fn config(&self) -> &StepConfig {
        &self.config
    }

    async fn execute(&self, reconciler: &Reconciler, deadline: &Deadline, log: &StepLog) -> Verdict {
        reconciler
            .verify_latest_build(&self.config.target, deadline, log)
            .await
    }
}
