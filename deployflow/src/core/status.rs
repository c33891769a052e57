//! Build and rollout phase enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle phase of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BuildPhase {
    /// Build object exists but nothing has been scheduled.
    #[default]
    New,
    /// Build is waiting for resources.
    Pending,
    /// Build is executing.
    Running,
    /// Build finished and produced its output.
    Complete,
    /// Build ran and failed.
    Failed,
    /// Build could not be run at all.
    Error,
    /// Build was cancelled before finishing.
    Cancelled,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "New"),
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Complete => write!(f, "Complete"),
            Self::Failed => write!(f, "Failed"),
            Self::Error => write!(f, "Error"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl BuildPhase {
    /// Returns true if no further transition can happen.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Failed | Self::Error | Self::Cancelled
        )
    }

    /// Returns true if the build produced its output.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// The lifecycle phase of a rollout instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RolloutPhase {
    /// Rollout object exists but the deployer has not started.
    #[default]
    New,
    /// Deployer is waiting to start.
    Pending,
    /// Replicas are being replaced.
    Running,
    /// Rollout finished successfully.
    Complete,
    /// Rollout failed.
    Failed,
}

impl fmt::Display for RolloutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "New"),
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Complete => write!(f, "Complete"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl RolloutPhase {
    /// Parses the phase the deployer records on a rollout instance.
    #[must_use]
    pub fn from_annotation(value: &str) -> Option<Self> {
        match value {
            "New" => Some(Self::New),
            "Pending" => Some(Self::Pending),
            "Running" => Some(Self::Running),
            "Complete" => Some(Self::Complete),
            "Failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true if no further transition can happen.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}
