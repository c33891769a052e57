//! # Deployflow
//!
//! Release pipeline reconciliation against an eventually-consistent cluster
//! API.
//!
//! Deployflow drives builds and rollouts and decides whether they actually
//! happened:
//!
//! - **Bounded retries**: every remote call is retried on transient errors
//!   and fails fast on terminal ones
//! - **Completion waiters**: builds and rollouts are polled to a terminal
//!   phase under a wall-clock deadline
//! - **Causality verification**: a build's image must be shown to have
//!   changed the digest running in each deployment that watches it
//! - **Scaling**: replica counts are written and observed until they settle
//! - **Cancellation**: every wait honors an external cancellation token
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use deployflow::prelude::*;
//!
//! let api = HttpClusterApi::new(ClientConfig::new("https://api.cluster:6443").with_token(token))?;
//! let reconciler = Reconciler::new(ClusterContext::new(Arc::new(api), "demo"))
//!     .with_provenance(ProvenanceContext::from_env().unwrap_or_else(|| ProvenanceContext::new("local", "0")));
//!
//! let step = BuildStep::new(StepConfig::new("demo", "frontend").with_wait_text("15min")?);
//! let outcome = run_step(&step, &reconciler).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod client;
pub mod config;
pub mod core;
pub mod errors;
pub mod observability;
pub mod reconcile;
pub mod steps;
pub mod testing;
pub mod utils;

#[cfg(test)]
mod integration_tests;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, Deadline};
    #[cfg(feature = "http")]
    pub use crate::client::HttpClusterApi;
    pub use crate::client::{
        ClusterApi, ClusterContext, KindRegistry, ListOptions, RetryClient, RetryPolicy,
    };
    pub use crate::config::{ClientConfig, PollSettings, StepConfig};
    pub use crate::core::{
        Build, BuildConfig, BuildPhase, Capability, DeploymentConfig, FailureReason,
        ImageReference, ProofGap, ResourceKind, RolloutInstance, RolloutPhase, StepOutcome,
        Verdict,
    };
    pub use crate::errors::{ClusterError, DeployflowError};
    pub use crate::observability::{init_tracing, LogFormat, StepLog};
    pub use crate::reconcile::{
        Endpoint, ProvenanceContext, Reconciler, ScaleRequest, VerificationMode,
    };
    pub use crate::steps::{
        run_step, BuildStep, BuildVerifyStep, DeployStep, DeploymentVerifyStep, ScaleStep,
        ServiceVerifyStep, Step,
    };
    pub use crate::utils::WaitBudget;
}
