//! Error types for deployflow.
//!
//! Remote failures are modeled by [`ClusterError`], which knows whether it is
//! worth retrying. Everything else that can go wrong while configuring or
//! driving a step is folded into [`DeployflowError`].

use crate::core::{ImageReferenceError, ResourceKind};
use crate::utils::WaitBudgetError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Whether a remote failure may succeed if the call is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Repeating the call cannot help.
    Terminal,
    /// The call may succeed on a later attempt.
    Transient,
}

/// An error returned by the remote cluster API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    /// The request was rejected as malformed (400).
    #[error("Malformed request: {0}")]
    BadRequest(String),

    /// The caller is not authenticated (401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller may not perform this operation (403).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The resource does not exist (404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The write was based on a stale resource version (409).
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// The request timed out before the server answered.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Any other non-success status.
    #[error("Server error (status {status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Body or reason returned by the server.
        message: String,
    },

    /// The connection failed or was interrupted.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The API answered with a different kind of resource than requested.
    #[error("Expected a {expected}, received a {actual}")]
    UnexpectedKind {
        /// The kind the caller asked for.
        expected: ResourceKind,
        /// The kind that came back.
        actual: ResourceKind,
    },
}

impl ClusterError {
    /// Builds an error from a non-success HTTP status code.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 => Self::BadRequest(message),
            401 => Self::Unauthorized(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            408 | 504 => Self::Timeout(message),
            _ => Self::Server { status, message },
        }
    }

    /// Creates a not-found error for a named resource.
    #[must_use]
    pub fn not_found(kind: ResourceKind, name: impl AsRef<str>) -> Self {
        Self::NotFound(format!("{kind} '{}'", name.as_ref()))
    }

    /// Creates a conflict error for a named resource.
    #[must_use]
    pub fn conflict(kind: ResourceKind, name: impl AsRef<str>, reason: impl AsRef<str>) -> Self {
        Self::Conflict(format!("{kind} '{}': {}", name.as_ref(), reason.as_ref()))
    }

    /// The HTTP status code this error corresponds to, when there is one.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::BadRequest(_) => Some(400),
            Self::Unauthorized(_) => Some(401),
            Self::Forbidden(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::Conflict(_) => Some(409),
            Self::Server { status, .. } => Some(*status),
            Self::Timeout(_)
            | Self::Transport(_)
            | Self::Decode(_)
            | Self::UnexpectedKind { .. } => None,
        }
    }

    /// Classifies the error for the retry client.
    ///
    /// Malformed requests, auth failures, missing resources, write conflicts
    /// and kind mismatches are terminal. Everything else is transient.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::BadRequest(_)
            | Self::Unauthorized(_)
            | Self::Forbidden(_)
            | Self::NotFound(_)
            | Self::Conflict(_)
            | Self::UnexpectedKind { .. } => ErrorClass::Terminal,
            Self::Server { status, .. } if *status == 409 => ErrorClass::Terminal,
            Self::Timeout(_) | Self::Server { .. } | Self::Transport(_) | Self::Decode(_) => {
                ErrorClass::Transient
            }
        }
    }

    /// Returns true if the error should not be retried.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.class() == ErrorClass::Terminal
    }

    /// Returns true for optimistic-concurrency conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.status_code() == Some(409)
    }

    /// Returns true if the resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Converts to a dictionary representation for structured reporting.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map.insert("class".to_string(), serde_json::json!(self.class()));
        if let Some(status) = self.status_code() {
            map.insert("status".to_string(), serde_json::json!(status));
        }
        map
    }
}

/// Error raised when a rollout's embedded parent snapshot cannot be recovered.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The rollout carries no snapshot at all.
    #[error("rollout '{0}' carries no deployment config snapshot")]
    Missing(String),

    /// The snapshot is present but does not decode.
    #[error("rollout '{rollout}' carries a malformed snapshot: {source}")]
    Malformed {
        /// The rollout name.
        rollout: String,
        /// The decode failure.
        #[source]
        source: serde_json::Error,
    },
}

/// The main error type for deployflow operations.
#[derive(Debug, Error)]
pub enum DeployflowError {
    /// A remote call failed.
    #[error("{0}")]
    Cluster(#[from] ClusterError),

    /// A wait budget could not be parsed.
    #[error("{0}")]
    WaitBudget(#[from] WaitBudgetError),

    /// An image reference could not be parsed.
    #[error("{0}")]
    ImageReference(#[from] ImageReferenceError),

    /// A rollout snapshot could not be recovered.
    #[error("{0}")]
    Snapshot(#[from] SnapshotError),

    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
