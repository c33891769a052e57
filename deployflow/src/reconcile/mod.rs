//! Reconciliation engine.
//!
//! A [`Reconciler`] drives the remote cluster toward a desired state and
//! reports whether it got there:
//! - build completion, followed by image propagation checks
//! - deployment rollouts after a generation bump
//! - replica scaling and verification
//! - best-effort provenance annotation
//!
//! Every remote call goes through the [`ClusterContext`] retry client, and
//! every loop is bounded by a [`Deadline`](crate::cancellation::Deadline).

mod annotate;
mod build;
mod causality;
mod deployment;
pub mod reachability;
mod scale;
mod tracker;

pub use annotate::{ProvenanceContext, PROVENANCE_ANNOTATION};
pub use causality::VerificationMode;
pub use reachability::{verify_reachability, Endpoint, ProbeError, Prober, TcpProber};
#[cfg(feature = "http")]
pub use reachability::HttpProber;
pub use scale::{ReplicaMode, ScaleRequest};
pub use tracker::{child_at, latest_child, Generational};

use crate::cancellation::{CancellationToken, Deadline};
use crate::client::ClusterContext;
use crate::config::PollSettings;
use crate::core::FailureReason;
use std::sync::Arc;

/// Drives builds, rollouts and scaling against one namespace.
#[derive(Debug, Clone)]
pub struct Reconciler {
    cluster: ClusterContext,
    settings: PollSettings,
    provenance: Option<ProvenanceContext>,
    mode: VerificationMode,
    verify_deployments: bool,
}

impl Reconciler {
    /// Creates a reconciler with default poll settings.
    #[must_use]
    pub fn new(cluster: ClusterContext) -> Self {
        Self {
            cluster,
            settings: PollSettings::default(),
            provenance: None,
            mode: VerificationMode::default(),
            verify_deployments: true,
        }
    }

    /// Sets the poll settings.
    #[must_use]
    pub fn with_settings(mut self, settings: PollSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the provenance written onto confirmed resources.
    #[must_use]
    pub fn with_provenance(mut self, provenance: ProvenanceContext) -> Self {
        self.provenance = Some(provenance);
        self
    }

    /// Sets how image propagation failures are reported.
    #[must_use]
    pub fn with_mode(mut self, mode: VerificationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enables or disables image propagation checks after a build completes.
    #[must_use]
    pub fn with_deployment_verification(mut self, enabled: bool) -> Self {
        self.verify_deployments = enabled;
        self
    }

    /// Attaches a cancellation token to every remote call's retry loop.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cluster = self.cluster.with_token(token);
        self
    }

    /// Returns a copy bound to another namespace.
    #[must_use]
    pub fn in_namespace(&self, namespace: &str) -> Self {
        Self {
            cluster: self.cluster.in_namespace(namespace),
            ..self.clone()
        }
    }

    /// The cluster handle.
    #[must_use]
    pub fn cluster(&self) -> &ClusterContext {
        &self.cluster
    }

    /// The poll settings.
    #[must_use]
    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// The configured provenance, if any.
    #[must_use]
    pub fn provenance(&self) -> Option<&ProvenanceContext> {
        self.provenance.as_ref()
    }
}

/// The failure reported when a deadline's token fired.
pub(crate) fn cancelled(deadline: &Deadline) -> FailureReason {
    FailureReason::Cancelled(
        deadline
            .cancel_reason()
            .unwrap_or_else(|| "cancellation requested".to_string()),
    )
}
