//! Deployment steps.

use super::Step;
use crate::cancellation::Deadline;
use crate::config::StepConfig;
use crate::core::Verdict;
use crate::observability::StepLog;
use crate::reconcile::{Reconciler, ScaleRequest};
use async_trait::async_trait;

/// Rolls out a new generation of the target deployment config.
#[derive(Debug, Clone)]
pub struct DeployStep {
    config: StepConfig,
}

impl DeployStep {
    /// Creates a deploy step for `config.target`.
    #[must_use]
    pub fn new(config: StepConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Step for DeployStep {
    fn name(&self) -> &str {
        "deploy"
    }

    fn config(&self) -> &StepConfig {
        &self.config
    }

    async fn execute(&self, reconciler: &Reconciler, deadline: &Deadline, log: &StepLog) -> Verdict {
        reconciler
            .wait_for_deployment(&self.config.target, deadline, log)
            .await
    }
}

/// Scales the latest rollout of the target deployment config.
#[derive(Debug, Clone)]
pub struct ScaleStep {
    config: StepConfig,
    replicas: u32,
    verify_count: bool,
}

impl ScaleStep {
    /// Creates a scale step to `replicas`.
    #[must_use]
    pub fn new(config: StepConfig, replicas: u32) -> Self {
        Self {
            config,
            replicas,
            verify_count: true,
        }
    }

    /// Succeed on a completed rollout without checking the running count.
    #[must_use]
    pub fn without_count_check(mut self) -> Self {
        self.verify_count = false;
        self
    }
}

#[async_trait]
impl Step for ScaleStep {
    fn name(&self) -> &str {
        "scale"
    }

    fn config(&self) -> &StepConfig {
        &self.config
    }

    async fn execute(&self, reconciler: &Reconciler, deadline: &Deadline, log: &StepLog) -> Verdict {
        let request = ScaleRequest::new(&self.config.target)
            .with_target(self.replicas)
            .with_check_count(self.verify_count);
        reconciler.scale(&request, deadline, log).await
    }
}

/// Verifies that the latest rollout completed, optionally at a replica count.
#[derive(Debug, Clone)]
pub struct DeploymentVerifyStep {
    config: StepConfig,
    replicas: Option<u32>,
    verify_count: bool,
}

impl DeploymentVerifyStep {
    /// Creates a verify step expecting the declared replica count.
    #[must_use]
    pub fn new(config: StepConfig) -> Self {
        Self {
            config,
            replicas: None,
            verify_count: true,
        }
    }

    /// Expects `replicas` instead of the declared count.
    #[must_use]
    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = Some(replicas);
        self
    }

    /// Only checks that the rollout completed.
    #[must_use]
    pub fn without_count_check(mut self) -> Self {
        self.verify_count = false;
        self
    }
}

#[async_trait]
impl Step for DeploymentVerifyStep {
    fn name(&self) -> &str {
        "deployment-verify"
    }

    fn config(&self) -> &StepConfig {
        &self.config
    }

    async fn execute(&self, reconciler: &Reconciler, deadline: &Deadline, log: &StepLog) -> Verdict {
        let mut request = ScaleRequest::new(&self.config.target)
            .with_check_count(self.verify_count)
            .verify_only();
        request.target = self.replicas;
        reconciler.scale(&request, deadline, log).await
    }
}
