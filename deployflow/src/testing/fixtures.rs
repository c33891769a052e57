//! Test fixtures for reconciliation tests.

use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::FakeCluster;
use crate::client::{ClusterContext, RetryPolicy};
use crate::config::PollSettings;
use crate::core::{BuildConfig, DeploymentConfig, ImageReference};
use crate::reconcile::Reconciler;

/// Namespace used by fixtures.
pub const NAMESPACE: &str = "demo";

/// Poll settings with millisecond ticks.
#[must_use]
pub fn fast_settings() -> PollSettings {
    PollSettings::new()
        .with_status_tick_ms(5)
        .with_trigger_tick_ms(10)
        .with_probe_tick_ms(5)
        .with_annotate_backoff_ms(1)
}

/// Retry policy with a 1ms delay.
#[must_use]
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new().with_delay_ms(1)
}

/// A cluster context over `cluster` in [`NAMESPACE`] with fast retries.
#[must_use]
pub fn context(cluster: Arc<FakeCluster>) -> ClusterContext {
    ClusterContext::new(cluster, NAMESPACE).with_retry(fast_retry())
}

/// A reconciler over `cluster` with fast ticks.
#[must_use]
pub fn reconciler(cluster: Arc<FakeCluster>) -> Reconciler {
    Reconciler::new(context(cluster)).with_settings(fast_settings())
}

/// The hex sha256 digest of `content`.
#[must_use]
pub fn digest_of(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// An image reference pinned to the digest of `content`.
#[must_use]
pub fn pinned_image(name: &str, content: &str) -> ImageReference {
    format!("registry.local/{NAMESPACE}/{name}@sha256:{}", digest_of(content))
        .parse()
        .expect("fixture image reference is valid")
}

/// A `name:tag` image reference.
#[must_use]
pub fn image(name_tag: &str) -> ImageReference {
    name_tag.parse().expect("fixture image reference is valid")
}

/// A build config that pushes to `output`.
#[must_use]
pub fn build_config(name: &str, output: &str) -> BuildConfig {
    BuildConfig::new(NAMESPACE, name).with_output(image(output))
}

/// A deployment config with an image-change trigger on `watches`.
#[must_use]
pub fn watching_deployment(name: &str, watches: &str, replicas: u32) -> DeploymentConfig {
    DeploymentConfig::new(NAMESPACE, name, replicas)
        .with_config_trigger()
        .with_image_trigger(image(watches))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable_hex() {
        let digest = digest_of("app v1");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, digest_of("app v1"));
        assert_ne!(digest, digest_of("app v2"));
    }

    #[test]
    fn test_pinned_image() {
        let pinned = pinned_image("app", "v1");
        assert_eq!(pinned.hex_digest(), Some(digest_of("v1").as_str()));
    }
}
