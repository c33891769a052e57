//! Access to the remote cluster API.
//!
//! [`ClusterApi`] is the raw, untyped surface a backend implements.
//! [`ClusterContext`] is what the reconcilers hold: it binds an API to a
//! namespace and a [`RetryClient`], and exposes typed accessors that route
//! every call through the retry client.

#[cfg(feature = "http")]
mod http;
mod registry;
mod retry;

#[cfg(feature = "http")]
pub use http::HttpClusterApi;
pub use registry::{ApiResource, ApiResourceList, KindEndpoint, KindRegistry};
pub use retry::{BackoffStrategy, JitterStrategy, RetryClient, RetryDecision, RetryPolicy};

use crate::cancellation::CancellationToken;
use crate::core::{Build, BuildRequest, Resource, ResourceKind, TypedResource};
use crate::errors::ClusterError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Filters for list calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Labels every returned resource must carry.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ListOptions {
    /// Matches every resource.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Adds a required label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Renders the labels as a `k=v,k=v` selector.
    #[must_use]
    pub fn label_selector(&self) -> Option<String> {
        if self.labels.is_empty() {
            return None;
        }
        Some(
            self.labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    /// Returns true if `labels` satisfies every required label.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.labels
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}

/// The remote resource API.
///
/// Implementations return classified [`ClusterError`]s and never retry on
/// their own; retries are applied by [`ClusterContext`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetches one resource by name.
    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Resource, ClusterError>;

    /// Lists resources of a kind in a namespace.
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Vec<Resource>, ClusterError>;

    /// Creates a resource.
    async fn create(&self, resource: Resource) -> Result<Resource, ClusterError>;

    /// Replaces a resource, guarded by its resource version.
    async fn update(&self, resource: Resource) -> Result<Resource, ClusterError>;

    /// Deletes a resource.
    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), ClusterError>;

    /// Instantiates a new build from a build config.
    async fn instantiate(
        &self,
        namespace: &str,
        build_config: &str,
        request: BuildRequest,
    ) -> Result<Build, ClusterError>;
}

/// A namespace-bound, retrying handle on a [`ClusterApi`].
#[derive(Clone)]
pub struct ClusterContext {
    api: Arc<dyn ClusterApi>,
    retry: RetryClient,
    namespace: String,
}

impl ClusterContext {
    /// Binds `api` to `namespace` with the default retry policy.
    pub fn new(api: Arc<dyn ClusterApi>, namespace: impl Into<String>) -> Self {
        Self {
            api,
            retry: RetryClient::default(),
            namespace: namespace.into(),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = self.retry.with_policy(policy);
        self
    }

    /// Attaches a cancellation token that cuts retry delays short.
    #[must_use]
    pub fn with_token(mut self, token: Arc<CancellationToken>) -> Self {
        self.retry = self.retry.with_token(token);
        self
    }

    /// Returns a copy bound to another namespace.
    #[must_use]
    pub fn in_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            api: self.api.clone(),
            retry: self.retry.clone(),
            namespace: namespace.into(),
        }
    }

    /// The bound namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The retry client.
    #[must_use]
    pub fn retry(&self) -> &RetryClient {
        &self.retry
    }

    /// Fetches a typed resource by name.
    pub async fn get<T: TypedResource>(&self, name: &str) -> Result<T, ClusterError> {
        let api = &self.api;
        let namespace = self.namespace.as_str();
        let operation = format!("get {} {name}", T::KIND);
        let resource = self
            .retry
            .execute(&operation, move || api.get(T::KIND, namespace, name))
            .await?;
        T::try_from_resource(resource)
    }

    /// Fetches a typed resource, mapping not-found to `None`.
    pub async fn find<T: TypedResource>(&self, name: &str) -> Result<Option<T>, ClusterError> {
        match self.get::<T>(name).await {
            Ok(resource) => Ok(Some(resource)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Lists typed resources in the bound namespace.
    pub async fn list<T: TypedResource>(&self, options: &ListOptions) -> Result<Vec<T>, ClusterError> {
        let api = &self.api;
        let namespace = self.namespace.as_str();
        let operation = format!("list {}", T::KIND);
        let resources = self
            .retry
            .execute(&operation, move || api.list(T::KIND, namespace, options))
            .await?;
        resources.into_iter().map(T::try_from_resource).collect()
    }

    /// Writes back a typed resource, returning the stored copy.
    pub async fn update<T: TypedResource>(&self, resource: &T) -> Result<T, ClusterError> {
        let api = &self.api;
        let operation = format!("update {} {}", T::KIND, resource.metadata().name);
        let wrapped = resource.clone().into_resource();
        let stored = self
            .retry
            .execute(&operation, move || api.update(wrapped.clone()))
            .await?;
        T::try_from_resource(stored)
    }

    /// Instantiates a build from `build_config`.
    pub async fn instantiate(
        &self,
        build_config: &str,
        request: &BuildRequest,
    ) -> Result<Build, ClusterError> {
        let api = &self.api;
        let namespace = self.namespace.as_str();
        let operation = format!("instantiate {} {build_config}", ResourceKind::BuildConfig);
        self.retry
            .execute(&operation, move || {
                api.instantiate(namespace, build_config, request.clone())
            })
            .await
    }
}

impl std::fmt::Debug for ClusterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterContext")
            .field("namespace", &self.namespace)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BuildConfig, DeploymentConfig};
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn context(mock: MockClusterApi) -> ClusterContext {
        ClusterContext::new(Arc::new(mock), "demo").with_retry(RetryPolicy::new().with_delay_ms(1))
    }

    #[test]
    fn test_label_selector() {
        let options = ListOptions::all().with_label("app", "web").with_label("tier", "front");
        assert_eq!(options.label_selector(), Some("app=web,tier=front".to_string()));
        assert_eq!(ListOptions::all().label_selector(), None);

        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "web".to_string());
        assert!(!options.matches(&labels));
        labels.insert("tier".to_string(), "front".to_string());
        assert!(options.matches(&labels));
    }

    #[tokio::test]
    async fn test_get_terminal_error_single_attempt() {
        let mut mock = MockClusterApi::new();
        mock.expect_get()
            .times(1)
            .returning(|_, _, _| Err(ClusterError::Forbidden("denied".to_string())));

        let result = context(mock).get::<DeploymentConfig>("app").await;
        assert_eq!(result.unwrap_err(), ClusterError::Forbidden("denied".to_string()));
    }

    #[tokio::test]
    async fn test_get_transient_error_three_attempts() {
        let mut mock = MockClusterApi::new();
        mock.expect_get()
            .times(3)
            .returning(|_, _, _| Err(ClusterError::Transport("reset".to_string())));

        assert_err!(context(mock).get::<DeploymentConfig>("app").await);
    }

    #[tokio::test]
    async fn test_get_wrong_kind_is_terminal() {
        let mut mock = MockClusterApi::new();
        mock.expect_get()
            .times(1)
            .returning(|_, ns, name| Ok(BuildConfig::new(ns, name).into_resource()));

        let err = context(mock).get::<DeploymentConfig>("app").await.unwrap_err();
        assert!(matches!(err, ClusterError::UnexpectedKind { .. }));
    }

    #[tokio::test]
    async fn test_find_maps_not_found() {
        let mut mock = MockClusterApi::new();
        mock.expect_get()
            .times(1)
            .returning(|_, _, name| Err(ClusterError::not_found(ResourceKind::DeploymentConfig, name)));

        let found = assert_ok!(context(mock).find::<DeploymentConfig>("missing").await);
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_update_conflict_not_retried() {
        let mut mock = MockClusterApi::new();
        mock.expect_update()
            .times(1)
            .returning(|r| Err(ClusterError::conflict(r.kind(), r.name(), "stale")));

        let dc = DeploymentConfig::new("demo", "app", 1);
        let err = context(mock).update(&dc).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_instantiate_retries_transient() {
        let mut mock = MockClusterApi::new();
        let mut calls = 0;
        mock.expect_instantiate().times(2).returning(move |ns, bc, _| {
            calls += 1;
            if calls == 1 {
                Err(ClusterError::from_status(502, "gateway"))
            } else {
                Ok(Build::new(ns, &format!("{bc}-1"), bc))
            }
        });

        let build = assert_ok!(context(mock).instantiate("app", &BuildRequest::new()).await);
        assert_eq!(build.name(), "app-1");
    }
}
