//! Resource kinds and the optional behaviors each kind supports.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An optional behavior a resource kind may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// New child instances can be requested on demand (builds from a build config).
    Triggerable,
    /// Replica counts can be read and written.
    Scalable,
    /// Carries a monotonic generation number with one child per generation.
    Generational,
    /// Metadata annotations may be written back.
    Annotatable,
}

impl Capability {
    const fn bit(self) -> u8 {
        match self {
            Self::Triggerable => 1,
            Self::Scalable => 1 << 1,
            Self::Generational => 1 << 2,
            Self::Annotatable => 1 << 3,
        }
    }
}

/// A set of [`Capability`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    /// The empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Returns a copy of the set with `capability` added.
    #[must_use]
    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    /// Returns true if the set contains `capability`.
    #[must_use]
    pub const fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }
}

/// The kinds of remote resources deployflow works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A single build run.
    Build,
    /// The template builds are instantiated from.
    BuildConfig,
    /// The parent of a series of rollouts.
    DeploymentConfig,
    /// One rollout instance of a deployment config generation.
    ReplicationController,
}

impl ResourceKind {
    /// Every known kind.
    pub const ALL: [Self; 4] = [
        Self::Build,
        Self::BuildConfig,
        Self::DeploymentConfig,
        Self::ReplicationController,
    ];

    /// The kind name used on the wire.
    #[must_use]
    pub const fn api_kind(self) -> &'static str {
        match self {
            Self::Build => "Build",
            Self::BuildConfig => "BuildConfig",
            Self::DeploymentConfig => "DeploymentConfig",
            Self::ReplicationController => "ReplicationController",
        }
    }

    /// The behaviors this kind supports.
    #[must_use]
    pub const fn capabilities(self) -> CapabilitySet {
        let base = CapabilitySet::empty().with(Capability::Annotatable);
        match self {
            Self::Build => base,
            Self::BuildConfig => base
                .with(Capability::Triggerable)
                .with(Capability::Generational),
            Self::DeploymentConfig => base.with(Capability::Generational),
            Self::ReplicationController => base.with(Capability::Scalable),
        }
    }

    /// Returns true if this kind supports `capability`.
    #[must_use]
    pub const fn supports(self, capability: Capability) -> bool {
        self.capabilities().contains(capability)
    }

    /// Looks a kind up by its wire name.
    #[must_use]
    pub fn from_api_kind(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.api_kind() == name)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_kind())
    }
}
