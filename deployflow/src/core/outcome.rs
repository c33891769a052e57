//! Step outcomes and failure reasons.
//!
//! Every waiter ends in a [`Verdict`]. A negative verdict always carries a
//! [`FailureReason`] specific enough for an operator to act on without
//! re-running the step.

use super::capability::ResourceKind;
use crate::errors::ClusterError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an image change could not be proven to have caused a rollout.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "gap", rename_all = "snake_case")]
pub enum ProofGap {
    /// The image-change trigger did not fire within its sub-budget.
    #[error("image trigger for {image} never fired")]
    TriggerNeverFired {
        /// The watched `name:tag`.
        image: String,
    },

    /// The digest the latest generation is running could not be resolved.
    #[error("cannot resolve the image digest of generation {generation}")]
    CurrentDigestUnresolved {
        /// The latest generation.
        generation: u64,
    },

    /// The previous generation's rollout could not be fetched.
    #[error("previous rollout {rollout} is unavailable")]
    PreviousRolloutMissing {
        /// Name of the previous rollout.
        rollout: String,
    },

    /// The previous rollout carries no usable parent snapshot or digest.
    #[error("cannot resolve the image digest recorded by {rollout}")]
    PreviousDigestUnresolved {
        /// Name of the previous rollout.
        rollout: String,
    },

    /// Both generations run the same image.
    #[error("image digest {digest} did not change between generations")]
    DigestUnchanged {
        /// The shared hex digest.
        digest: String,
    },
}

/// The specific reason a step failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// The wait budget elapsed before the desired state was observed.
    #[error("timed out after {waited_ms}ms; last observed: {last_observed}")]
    Timeout {
        /// Milliseconds spent waiting.
        waited_ms: u64,
        /// Description of the last state seen.
        last_observed: String,
    },

    /// The watched resource reached a terminal phase other than success.
    #[error("{subject} ended in phase {phase}")]
    TerminalState {
        /// The resource that failed.
        subject: String,
        /// Its terminal phase.
        phase: String,
    },

    /// The parent resource does not exist.
    #[error("no such {kind} '{name}'")]
    MissingParent {
        /// Kind of the parent.
        kind: ResourceKind,
        /// Name of the parent.
        name: String,
    },

    /// A downstream deployment could not be proven to pick up the new image.
    #[error("deployment '{deployment}' not verified: {gap}")]
    MissingCausalProof {
        /// The candidate deployment config.
        deployment: String,
        /// What was missing.
        gap: ProofGap,
    },

    /// A remote call failed terminally or exhausted its retries.
    #[error("remote call failed: {0}")]
    Remote(#[from] ClusterError),

    /// The step was cancelled.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The step configuration was rejected before anything ran.
    #[error("invalid step configuration: {0}")]
    InvalidConfig(String),
}

impl FailureReason {
    /// Short machine-friendly label for the reason.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::TerminalState { .. } => "terminal_state",
            Self::MissingParent { .. } => "missing_parent",
            Self::MissingCausalProof { .. } => "missing_causal_proof",
            Self::Remote(_) => "remote",
            Self::Cancelled(_) => "cancelled",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }
}

/// The result of a waiter or verifier.
pub type Verdict = Result<(), FailureReason>;

/// What a step hands back to its harness.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Whether the step succeeded.
    pub success: bool,
    /// Why it failed, when it did.
    pub reason: Option<FailureReason>,
    /// Human-readable log lines.
    pub lines: Vec<String>,
    /// Wall-clock duration of the step.
    pub duration_ms: u64,
}

impl StepOutcome {
    /// Creates an outcome from a verdict.
    #[must_use]
    pub fn from_verdict(verdict: Verdict, lines: Vec<String>, duration_ms: u64) -> Self {
        match verdict {
            Ok(()) => Self::passed(lines, duration_ms),
            Err(reason) => Self::failed(reason, lines, duration_ms),
        }
    }

    /// Creates a successful outcome.
    #[must_use]
    pub fn passed(lines: Vec<String>, duration_ms: u64) -> Self {
        Self {
            success: true,
            reason: None,
            lines,
            duration_ms,
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(reason: FailureReason, lines: Vec<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            reason: Some(reason),
            lines,
            duration_ms,
        }
    }

    /// Returns true if the step succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Returns true if any log line contains `needle`.
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }

    /// Converts to a JSON value for structured reporting.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": self.success,
            "reason": self.reason.as_ref().map(FailureReason::code),
            "message": self.reason.as_ref().map(ToString::to_string),
            "lines": self.lines,
            "duration_ms": self.duration_ms,
        })
    }
}
