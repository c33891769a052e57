//! Resolving the child instance of a parent's latest generation.

use crate::client::ClusterContext;
use crate::core::{Build, BuildConfig, DeploymentConfig, RolloutInstance, TypedResource};
use tracing::debug;

/// A parent resource that produces one child per generation.
pub trait Generational: TypedResource {
    /// The per-generation child type.
    type Child: TypedResource;

    /// The latest generation; 0 means no child exists yet.
    fn latest_generation(&self) -> u64;

    /// The child name for a generation.
    fn child_name(&self, generation: u64) -> String;
}

impl Generational for DeploymentConfig {
    type Child = RolloutInstance;

    fn latest_generation(&self) -> u64 {
        self.status.latest_version
    }

    fn child_name(&self, generation: u64) -> String {
        self.rollout_name(generation)
    }
}

impl Generational for BuildConfig {
    type Child = Build;

    fn latest_generation(&self) -> u64 {
        self.status.last_version
    }

    fn child_name(&self, generation: u64) -> String {
        self.build_name(generation)
    }
}

/// Fetches the child for `generation`.
///
/// Any fetch failure, not-found included, yields `None`: the child may not
/// have materialized yet.
pub async fn child_at<P: Generational>(
    cluster: &ClusterContext,
    parent: &P,
    generation: u64,
) -> Option<P::Child> {
    if generation == 0 {
        return None;
    }
    let name = parent.child_name(generation);
    match cluster.get::<P::Child>(&name).await {
        Ok(child) => Some(child),
        Err(e) => {
            debug!(kind = %P::Child::KIND, %name, error = %e, "child not available");
            None
        }
    }
}

/// Fetches the child for the parent's latest generation.
pub async fn latest_child<P: Generational>(cluster: &ClusterContext, parent: &P) -> Option<P::Child> {
    child_at(cluster, parent, parent.latest_generation()).await
}
