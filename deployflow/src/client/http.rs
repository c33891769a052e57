//! `reqwest` implementation of [`ClusterApi`].

use super::{ClusterApi, KindRegistry, ListOptions};
use crate::config::ClientConfig;
use crate::core::{Build, BuildRequest, Resource, ResourceKind, TypedResource};
use crate::errors::{ClusterError, DeployflowError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Talks to a cluster API server over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpClusterApi {
    config: ClientConfig,
    registry: Arc<KindRegistry>,
    client: Client,
}

impl HttpClusterApi {
    /// Creates a client using the default kind registry.
    pub fn new(config: ClientConfig) -> Result<Self, DeployflowError> {
        Self::with_registry(config, Arc::new(KindRegistry::new()))
    }

    /// Creates a client sharing an existing kind registry.
    pub fn with_registry(
        config: ClientConfig,
        registry: Arc<KindRegistry>,
    ) -> Result<Self, DeployflowError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .danger_accept_invalid_certs(config.skip_tls_verify)
            .build()
            .map_err(|e| DeployflowError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            config,
            registry,
            client,
        })
    }

    /// The kind registry in use.
    #[must_use]
    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ClusterError> {
        let response = self.authorize(request).send().await.map_err(map_transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown").to_string());
        Err(ClusterError::from_status(status.as_u16(), body))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClusterError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ClusterError::Decode(e.to_string()))
    }

    fn body_for(&self, resource: &Resource) -> Result<Value, ClusterError> {
        let mut body = serde_json::to_value(resource).map_err(|e| ClusterError::Decode(e.to_string()))?;
        if let Value::Object(map) = &mut body {
            map.insert(
                "apiVersion".to_string(),
                Value::String(self.registry.endpoint(resource.kind()).api_version()),
            );
        }
        Ok(body)
    }
}

fn map_transport(error: reqwest::Error) -> ClusterError {
    if error.is_timeout() {
        ClusterError::Timeout(error.to_string())
    } else {
        ClusterError::Transport(error.to_string())
    }
}

/// List responses omit `kind` on their items; put it back before decoding.
fn decode_items(kind: ResourceKind, items: Vec<Value>) -> Result<Vec<Resource>, ClusterError> {
    items
        .into_iter()
        .map(|mut item| {
            if let Value::Object(map) = &mut item {
                map.entry("kind")
                    .or_insert_with(|| Value::String(kind.api_kind().to_string()));
            }
            serde_json::from_value(item).map_err(|e| ClusterError::Decode(e.to_string()))
        })
        .collect()
}

fn instantiate_body(build_config: &str, request: &BuildRequest) -> Value {
    let mut body = json!({
        "kind": "BuildRequest",
        "apiVersion": "build.openshift.io/v1",
        "metadata": { "name": build_config },
    });
    if let Some(commit) = &request.revision {
        body["revision"] = json!({ "git": { "commit": commit } });
    }
    if !request.env.is_empty() {
        body["env"] = request
            .env
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect();
    }
    body
}

#[derive(Deserialize)]
struct ItemList {
    #[serde(default)]
    items: Vec<Value>,
}

#[async_trait]
impl ClusterApi for HttpClusterApi {
    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Resource, ClusterError> {
        let url = self.url(&self.registry.resource_path(kind, namespace, name));
        debug!(%kind, %url, "GET");
        let item: Value = self.send_json(self.client.get(url)).await?;
        decode_items(kind, vec![item])?
            .pop()
            .ok_or_else(|| ClusterError::Decode("empty response".to_string()))
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Vec<Resource>, ClusterError> {
        let url = self.url(&self.registry.collection_path(kind, namespace));
        debug!(%kind, %url, "LIST");
        let mut request = self.client.get(url);
        if let Some(selector) = options.label_selector() {
            request = request.query(&[("labelSelector", selector)]);
        }
        let list: ItemList = self.send_json(request).await?;
        decode_items(kind, list.items)
    }

    async fn create(&self, resource: Resource) -> Result<Resource, ClusterError> {
        let kind = resource.kind();
        let url = self.url(&self.registry.collection_path(kind, &resource.metadata().namespace));
        debug!(%kind, %url, "POST");
        let body = self.body_for(&resource)?;
        self.send_json(self.client.post(url).json(&body)).await
    }

    async fn update(&self, resource: Resource) -> Result<Resource, ClusterError> {
        let kind = resource.kind();
        let meta = resource.metadata();
        let url = self.url(&self.registry.resource_path(kind, &meta.namespace, &meta.name));
        debug!(%kind, %url, "PUT");
        let body = self.body_for(&resource)?;
        self.send_json(self.client.put(url).json(&body)).await
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let url = self.url(&self.registry.resource_path(kind, namespace, name));
        debug!(%kind, %url, "DELETE");
        self.send(self.client.delete(url)).await.map(|_| ())
    }

    async fn instantiate(
        &self,
        namespace: &str,
        build_config: &str,
        request: BuildRequest,
    ) -> Result<Build, ClusterError> {
        let url = self.url(&self.registry.instantiate_path(namespace, build_config));
        debug!(%url, "POST instantiate");
        let body = instantiate_body(build_config, &request);
        let item: Value = self.send_json(self.client.post(url).json(&body)).await?;
        let resource = decode_items(ResourceKind::Build, vec![item])?
            .pop()
            .ok_or_else(|| ClusterError::Decode("empty response".to_string()))?;
        Build::try_from_resource(resource)
    }
}
