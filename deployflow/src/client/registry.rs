//! Kind to REST path mapping.
//!
//! A [`KindRegistry`] is built once per client session, either from the
//! well-known defaults or from the server's discovery documents, and is
//! read-only afterwards. It is shared by reference with whatever needs it.

use crate::core::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a kind lives in the REST API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindEndpoint {
    /// API group; `None` for the legacy core group.
    pub group: Option<String>,
    /// API version.
    pub version: String,
    /// Lowercase plural resource name used in paths.
    pub plural: String,
}

impl KindEndpoint {
    /// Creates an endpoint.
    #[must_use]
    pub fn new(group: Option<&str>, version: &str, plural: &str) -> Self {
        Self {
            group: group.map(str::to_string),
            version: version.to_string(),
            plural: plural.to_string(),
        }
    }

    /// The `apiVersion` written into request bodies.
    #[must_use]
    pub fn api_version(&self) -> String {
        match &self.group {
            Some(group) => format!("{group}/{}", self.version),
            None => self.version.clone(),
        }
    }

    fn root(&self) -> String {
        match &self.group {
            Some(group) => format!("/apis/{group}/{}", self.version),
            None => format!("/api/{}", self.version),
        }
    }

    /// Path of the namespaced collection.
    #[must_use]
    pub fn collection_path(&self, namespace: &str) -> String {
        format!("{}/namespaces/{namespace}/{}", self.root(), self.plural)
    }

    /// Path of one named resource.
    #[must_use]
    pub fn resource_path(&self, namespace: &str, name: &str) -> String {
        format!("{}/{name}", self.collection_path(namespace))
    }
}

/// One entry in a discovery document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResource {
    /// Plural name, or `plural/subresource`.
    pub name: String,
    /// Kind name.
    pub kind: String,
    /// Whether the resource is namespaced.
    #[serde(default)]
    pub namespaced: bool,
}

/// A discovery document for one group/version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResourceList {
    /// `group/version`, or just `version` for the core group.
    pub group_version: String,
    /// Resources served under it.
    #[serde(default)]
    pub resources: Vec<ApiResource>,
}

/// Immutable mapping from resource kind to REST endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindRegistry {
    endpoints: BTreeMap<ResourceKind, KindEndpoint>,
}

impl Default for KindRegistry {
    fn default() -> Self {
        let endpoints = ResourceKind::ALL
            .into_iter()
            .map(|kind| (kind, default_endpoint(kind)))
            .collect();
        Self { endpoints }
    }
}

fn default_endpoint(kind: ResourceKind) -> KindEndpoint {
    match kind {
        ResourceKind::Build => KindEndpoint::new(Some("build.openshift.io"), "v1", "builds"),
        ResourceKind::BuildConfig => {
            KindEndpoint::new(Some("build.openshift.io"), "v1", "buildconfigs")
        }
        ResourceKind::DeploymentConfig => {
            KindEndpoint::new(Some("apps.openshift.io"), "v1", "deploymentconfigs")
        }
        ResourceKind::ReplicationController => {
            KindEndpoint::new(None, "v1", "replicationcontrollers")
        }
    }
}

impl KindRegistry {
    /// The well-known endpoints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from discovery documents.
    ///
    /// Kinds the server does not advertise keep their default endpoint;
    /// subresources and cluster-scoped resources are ignored.
    #[must_use]
    pub fn discover(lists: &[ApiResourceList]) -> Self {
        let mut endpoints: BTreeMap<ResourceKind, KindEndpoint> = Self::default().endpoints;
        for list in lists {
            let (group, version) = match list.group_version.split_once('/') {
                Some((group, version)) => (Some(group), version),
                None => (None, list.group_version.as_str()),
            };
            for resource in &list.resources {
                if resource.name.contains('/') || !resource.namespaced {
                    continue;
                }
                if let Some(kind) = ResourceKind::from_api_kind(&resource.kind) {
                    tracing::debug!(%kind, group_version = %list.group_version, plural = %resource.name, "discovered kind");
                    endpoints.insert(kind, KindEndpoint::new(group, version, &resource.name));
                }
            }
        }
        Self { endpoints }
    }

    /// The endpoint for `kind`.
    #[must_use]
    pub fn endpoint(&self, kind: ResourceKind) -> &KindEndpoint {
        // Every constructor fills all kinds.
        &self.endpoints[&kind]
    }

    /// Path of a namespaced collection.
    #[must_use]
    pub fn collection_path(&self, kind: ResourceKind, namespace: &str) -> String {
        self.endpoint(kind).collection_path(namespace)
    }

    /// Path of one named resource.
    #[must_use]
    pub fn resource_path(&self, kind: ResourceKind, namespace: &str, name: &str) -> String {
        self.endpoint(kind).resource_path(namespace, name)
    }

    /// Path of the build-config instantiate subresource.
    #[must_use]
    pub fn instantiate_path(&self, namespace: &str, build_config: &str) -> String {
        format!(
            "{}/instantiate",
            self.resource_path(ResourceKind::BuildConfig, namespace, build_config)
        )
    }
}
