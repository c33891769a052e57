//! Service reachability step.

use super::Step;
use crate::cancellation::Deadline;
use crate::config::StepConfig;
use crate::core::Verdict;
use crate::observability::StepLog;
use crate::reconcile::{verify_reachability, Endpoint, Prober, Reconciler, TcpProber};
use async_trait::async_trait;
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;

/// Waits until every endpoint of a service answers.
#[derive(Clone)]
pub struct ServiceVerifyStep {
    config: StepConfig,
    endpoints: Vec<Endpoint>,
    prober: Arc<dyn Prober>,
}

impl ServiceVerifyStep {
    /// Creates a step probing `endpoints` over TCP.
    #[must_use]
    pub fn new(config: StepConfig, endpoints: Vec<Endpoint>) -> Self {
        Self {
            config,
            endpoints,
            prober: Arc::new(TcpProber::new()),
        }
    }

    /// Replaces the prober.
    #[must_use]
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }
}

impl fmt::Debug for ServiceVerifyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceVerifyStep")
            .field("config", &self.config)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Step for ServiceVerifyStep {
    fn name(&self) -> &str {
        "service-verify"
    }

    fn config(&self) -> &StepConfig {
        &self.config
    }

    async fn execute(&self, reconciler: &Reconciler, deadline: &Deadline, log: &StepLog) -> Verdict {
        if self.endpoints.is_empty() {
            log.warn(format!("service {} lists no endpoints", self.config.target));
            return Ok(());
        }

        let tick = reconciler.settings().probe_tick();
        let verdicts = join_all(
            self.endpoints
                .iter()
                .map(|endpoint| verify_reachability(self.prober.as_ref(), endpoint, deadline, tick, log)),
        )
        .await;
        verdicts.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FailureReason;
    use crate::reconcile::ProbeError;
    use crate::steps::run_step;
    use crate::testing::{fixtures, FakeCluster};

    /// Answers only on the listed ports.
    struct PortProber(Vec<u16>);

    #[async_trait]
    impl Prober for PortProber {
        async fn probe(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
            if self.0.contains(&endpoint.port) {
                Ok(())
            } else {
                Err(ProbeError::Timeout(endpoint.address()))
            }
        }
    }

    fn step(endpoints: Vec<Endpoint>, open: Vec<u16>) -> ServiceVerifyStep {
        let config = StepConfig::new(fixtures::NAMESPACE, "web")
            .with_wait_text("40milli")
            .unwrap();
        ServiceVerifyStep::new(config, endpoints).with_prober(Arc::new(PortProber(open)))
    }

    #[tokio::test]
    async fn test_all_endpoints_reachable() {
        let reconciler = fixtures::reconciler(Arc::new(FakeCluster::new()));
        let endpoints = vec![Endpoint::new("web", 80), Endpoint::new("web", 443)];

        let outcome = run_step(&step(endpoints, vec![80, 443]), &reconciler).await;
        assert!(outcome.is_success());
        assert!(outcome.mentions("web:443 is reachable"));
    }

    #[tokio::test]
    async fn test_one_unreachable_endpoint_fails() {
        let reconciler = fixtures::reconciler(Arc::new(FakeCluster::new()));
        let endpoints = vec![Endpoint::new("web", 80), Endpoint::new("web", 8443)];

        let outcome = run_step(&step(endpoints, vec![80]), &reconciler).await;
        assert!(!outcome.is_success());
        assert!(matches!(outcome.reason, Some(FailureReason::Timeout { .. })));
        assert!(outcome.mentions("web:8443 unreachable"));
    }
}
