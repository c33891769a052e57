//! In-memory cluster for testing.
//!
//! [`FakeCluster`] implements [`ClusterApi`] over a concurrent map. It keeps
//! resource versions and rejects stale writes the way the real API server
//! does, and lets tests script phase sequences, inject faults and count
//! calls per operation and kind.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::client::{ClusterApi, ListOptions};
use crate::core::{
    Build, BuildConfig, BuildPhase, BuildRequest, DeploymentConfig, ImageReference, Resource,
    ResourceKind, RolloutInstance, RolloutPhase, TypedResource,
};
use crate::errors::ClusterError;

/// The remote operations a fault or call counter can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Fetch by name.
    Get,
    /// List a collection.
    List,
    /// Create.
    Create,
    /// Replace.
    Update,
    /// Delete.
    Delete,
    /// Instantiate a build.
    Instantiate,
}

#[derive(Debug)]
struct Fault {
    operation: Operation,
    kind: ResourceKind,
    error: ClusterError,
    remaining: Option<usize>,
}

type Key = (ResourceKind, String, String);

fn key(kind: ResourceKind, namespace: &str, name: &str) -> Key {
    (kind, namespace.to_string(), name.to_string())
}

/// An in-memory [`ClusterApi`].
#[derive(Debug, Default)]
pub struct FakeCluster {
    objects: DashMap<Key, Resource>,
    next_version: AtomicU64,
    build_scripts: DashMap<Key, VecDeque<BuildPhase>>,
    rollout_scripts: DashMap<Key, VecDeque<RolloutPhase>>,
    faults: Mutex<Vec<Fault>>,
    calls: DashMap<(Operation, ResourceKind), usize>,
    auto_rollout: Mutex<Option<RolloutPhase>>,
    converge_replicas: AtomicBool,
}

impl FakeCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// When a deployment config's generation advances, create its rollout
    /// instance in `phase`.
    #[must_use]
    pub fn with_auto_rollout(self, phase: RolloutPhase) -> Self {
        *self.auto_rollout.lock() = Some(phase);
        self
    }

    /// When a rollout's desired replicas are written, report them as running.
    #[must_use]
    pub fn with_replica_convergence(self) -> Self {
        self.converge_replicas.store(true, Ordering::SeqCst);
        self
    }

    fn bump_version(&self) -> String {
        (self.next_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn store(&self, mut resource: Resource) -> Resource {
        resource.metadata_mut().resource_version = Some(self.bump_version());
        let meta = resource.metadata();
        self.objects
            .insert(key(resource.kind(), &meta.namespace, &meta.name), resource.clone());
        resource
    }

    /// Stores a resource directly, bypassing faults and counters.
    pub fn insert<T: TypedResource>(&self, mut resource: T) -> T {
        resource.metadata_mut().resource_version = Some(self.bump_version());
        let meta = resource.metadata();
        self.objects.insert(
            key(T::KIND, &meta.namespace, &meta.name),
            resource.clone().into_resource(),
        );
        resource
    }

    /// Reads a resource directly, bypassing faults, counters and scripts.
    #[must_use]
    pub fn fetch<T: TypedResource>(&self, namespace: &str, name: &str) -> Option<T> {
        self.objects
            .get(&key(T::KIND, namespace, name))
            .map(|entry| entry.value().clone())
            .and_then(|resource| T::try_from_resource(resource).ok())
    }

    /// Number of resources of `kind` stored.
    #[must_use]
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.objects.iter().filter(|entry| entry.key().0 == kind).count()
    }

    /// Phases a build reports on successive reads; the last one sticks.
    pub fn script_build_phases(&self, namespace: &str, name: &str, phases: &[BuildPhase]) {
        self.build_scripts
            .insert(key(ResourceKind::Build, namespace, name), phases.iter().copied().collect());
    }

    /// Phases a rollout reports on successive reads; the last one sticks.
    pub fn script_rollout_phases(&self, namespace: &str, name: &str, phases: &[RolloutPhase]) {
        self.rollout_scripts.insert(
            key(ResourceKind::ReplicationController, namespace, name),
            phases.iter().copied().collect(),
        );
    }

    /// Sets a stored rollout's observed state.
    pub fn set_rollout_status(&self, namespace: &str, name: &str, phase: RolloutPhase, replicas: u32) {
        if let Some(mut rollout) = self.fetch::<RolloutInstance>(namespace, name) {
            rollout.set_phase(phase);
            rollout.status.replicas = replicas;
            self.store(rollout.into_resource());
        }
    }

    /// Sets a stored build's phase.
    pub fn set_build_phase(&self, namespace: &str, name: &str, phase: BuildPhase) {
        if let Some(mut build) = self.fetch::<Build>(namespace, name) {
            build.status.phase = phase;
            self.store(build.into_resource());
        }
    }

    /// Creates the rollout instance for the parent's current generation.
    pub fn seed_rollout(
        &self,
        parent: &DeploymentConfig,
        phase: RolloutPhase,
        replicas: u32,
    ) -> Result<RolloutInstance, ClusterError> {
        let mut rollout = RolloutInstance::from_parent(parent, phase)
            .map_err(|e| ClusterError::Decode(e.to_string()))?;
        rollout.status.replicas = replicas;
        Ok(self.insert(rollout))
    }

    /// Simulates the image trigger controller: records `image` as the new
    /// image for every trigger watching `name_tag` and advances the generation.
    pub fn trigger_image_change(
        &self,
        namespace: &str,
        deployment: &str,
        name_tag: &str,
        image: &ImageReference,
    ) -> Option<u64> {
        let mut dc = self.fetch::<DeploymentConfig>(namespace, deployment)?;
        let generation = dc.record_image_change(name_tag, image);
        let stored = self.insert(dc);
        self.maybe_roll_out(&stored);
        Some(generation)
    }

    /// Fails the next `times` calls of `operation` on `kind` with `error`.
    pub fn fail_next(&self, operation: Operation, kind: ResourceKind, error: ClusterError, times: usize) {
        self.faults.lock().push(Fault {
            operation,
            kind,
            error,
            remaining: Some(times),
        });
    }

    /// Fails every call of `operation` on `kind` with `error`.
    pub fn always_fail(&self, operation: Operation, kind: ResourceKind, error: ClusterError) {
        self.faults.lock().push(Fault {
            operation,
            kind,
            error,
            remaining: None,
        });
    }

    /// Removes every injected fault.
    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Number of calls made for `operation` on `kind`.
    #[must_use]
    pub fn calls(&self, operation: Operation, kind: ResourceKind) -> usize {
        self.calls.get(&(operation, kind)).map_or(0, |count| *count)
    }

    fn enter(&self, operation: Operation, kind: ResourceKind) -> Result<(), ClusterError> {
        *self.calls.entry((operation, kind)).or_insert(0) += 1;

        let mut faults = self.faults.lock();
        let position = faults
            .iter()
            .position(|f| f.operation == operation && f.kind == kind && f.remaining != Some(0));
        let Some(index) = position else {
            return Ok(());
        };
        let error = faults[index].error.clone();
        let exhausted = match faults[index].remaining.as_mut() {
            Some(remaining) => {
                *remaining -= 1;
                *remaining == 0
            }
            None => false,
        };
        if exhausted {
            faults.remove(index);
        }
        Err(error)
    }

    fn advance_script(&self, resource: &mut Resource) {
        let meta = resource.metadata();
        let k = key(resource.kind(), &meta.namespace, &meta.name);
        match resource {
            Resource::Build(build) => {
                if let Some(mut script) = self.build_scripts.get_mut(&k) {
                    if let Some(phase) = next_phase(&mut script) {
                        build.status.phase = phase;
                    }
                }
            }
            Resource::Rollout(rollout) => {
                if let Some(mut script) = self.rollout_scripts.get_mut(&k) {
                    if let Some(phase) = next_phase(&mut script) {
                        rollout.set_phase(phase);
                    }
                }
            }
            Resource::BuildConfig(_) | Resource::DeploymentConfig(_) => {}
        }
    }

    fn maybe_roll_out(&self, parent: &DeploymentConfig) {
        let Some(phase) = *self.auto_rollout.lock() else {
            return;
        };
        let generation = parent.latest_generation();
        if generation == 0 {
            return;
        }
        let name = parent.rollout_name(generation);
        if self.fetch::<RolloutInstance>(&parent.metadata.namespace, &name).is_none() {
            if let Err(e) = self.seed_rollout(parent, phase, 0) {
                tracing::warn!(rollout = %name, error = %e, "fake cluster could not create rollout");
            }
        }
    }
}

fn next_phase<P: Copy>(script: &mut VecDeque<P>) -> Option<P> {
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().copied()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Resource, ClusterError> {
        self.enter(Operation::Get, kind)?;
        let k = key(kind, namespace, name);
        let mut resource = self
            .objects
            .get(&k)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ClusterError::not_found(kind, name))?;

        let before = resource.clone();
        self.advance_script(&mut resource);
        if resource != before {
            resource = self.store(resource);
        }
        Ok(resource)
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Vec<Resource>, ClusterError> {
        self.enter(Operation::List, kind)?;
        let mut items: Vec<Resource> = self
            .objects
            .iter()
            .filter(|entry| entry.key().0 == kind && entry.key().1 == namespace)
            .filter(|entry| options.matches(&entry.value().metadata().labels))
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(items)
    }

    async fn create(&self, resource: Resource) -> Result<Resource, ClusterError> {
        let kind = resource.kind();
        self.enter(Operation::Create, kind)?;
        let meta = resource.metadata();
        if self.objects.contains_key(&key(kind, &meta.namespace, &meta.name)) {
            return Err(ClusterError::conflict(kind, &meta.name, "already exists"));
        }
        Ok(self.store(resource))
    }

    async fn update(&self, resource: Resource) -> Result<Resource, ClusterError> {
        let kind = resource.kind();
        self.enter(Operation::Update, kind)?;
        let meta = resource.metadata();
        let k = key(kind, &meta.namespace, &meta.name);
        let current_version = self
            .objects
            .get(&k)
            .map(|entry| entry.value().metadata().resource_version.clone())
            .ok_or_else(|| ClusterError::not_found(kind, &meta.name))?;
        if meta.resource_version.is_some() && meta.resource_version != current_version {
            return Err(ClusterError::conflict(
                kind,
                &meta.name,
                "the object has been modified; please apply your changes to the latest version",
            ));
        }

        let mut resource = resource;
        if self.converge_replicas.load(Ordering::SeqCst) {
            if let Resource::Rollout(rollout) = &mut resource {
                rollout.status.replicas = rollout.spec.replicas;
            }
        }
        let stored = self.store(resource);
        if let Resource::DeploymentConfig(dc) = &stored {
            self.maybe_roll_out(dc);
        }
        Ok(stored)
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.enter(Operation::Delete, kind)?;
        self.objects
            .remove(&key(kind, namespace, name))
            .map(|_| ())
            .ok_or_else(|| ClusterError::not_found(kind, name))
    }

    async fn instantiate(
        &self,
        namespace: &str,
        build_config: &str,
        request: BuildRequest,
    ) -> Result<Build, ClusterError> {
        self.enter(Operation::Instantiate, ResourceKind::BuildConfig)?;
        let mut bc = self
            .fetch::<BuildConfig>(namespace, build_config)
            .ok_or_else(|| ClusterError::not_found(ResourceKind::BuildConfig, build_config))?;
        bc.status.last_version += 1;
        let name = bc.build_name(bc.status.last_version);
        self.insert(bc);

        let mut build = Build::new(namespace, &name, build_config);
        if let Some(revision) = request.revision {
            build.metadata.annotations.insert("build.openshift.io/revision".to_string(), revision);
        }
        Ok(self.insert(build))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stale_write_conflicts() {
        let cluster = FakeCluster::new();
        let stored = cluster.insert(DeploymentConfig::new("demo", "app", 1));

        let mut first = stored.clone();
        first.spec.replicas = 2;
        cluster.update(first.into_resource()).await.unwrap();

        let mut stale = stored;
        stale.spec.replicas = 5;
        let err = cluster.update(stale.into_resource()).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_scripted_build_phases() {
        let cluster = FakeCluster::new();
        cluster.insert(Build::new("demo", "app-1", "app"));
        cluster.script_build_phases("demo", "app-1", &[BuildPhase::Pending, BuildPhase::Complete]);

        let phases = [
            cluster.get(ResourceKind::Build, "demo", "app-1").await.unwrap(),
            cluster.get(ResourceKind::Build, "demo", "app-1").await.unwrap(),
            cluster.get(ResourceKind::Build, "demo", "app-1").await.unwrap(),
        ]
        .map(|r| Build::try_from_resource(r).unwrap().phase());
        assert_eq!(phases, [BuildPhase::Pending, BuildPhase::Complete, BuildPhase::Complete]);
    }

    #[tokio::test]
    async fn test_fault_injection_and_counters() {
        let cluster = FakeCluster::new();
        cluster.insert(BuildConfig::new("demo", "app"));
        cluster.fail_next(
            Operation::Get,
            ResourceKind::BuildConfig,
            ClusterError::Transport("reset".to_string()),
            1,
        );

        assert!(cluster.get(ResourceKind::BuildConfig, "demo", "app").await.is_err());
        assert!(cluster.get(ResourceKind::BuildConfig, "demo", "app").await.is_ok());
        assert_eq!(cluster.calls(Operation::Get, ResourceKind::BuildConfig), 2);
    }

    #[tokio::test]
    async fn test_auto_rollout_on_generation_bump() {
        let cluster = FakeCluster::new().with_auto_rollout(RolloutPhase::Complete);
        let mut dc = cluster.insert(DeploymentConfig::new("demo", "app", 2));
        dc.bump_generation();
        cluster.update(dc.into_resource()).await.unwrap();

        let rollout = cluster.fetch::<RolloutInstance>("demo", "app-1").unwrap();
        assert_eq!(rollout.phase(), RolloutPhase::Complete);
        assert_eq!(rollout.desired_replicas(), 2);
    }

    #[tokio::test]
    async fn test_instantiate_numbers_builds() {
        let cluster = FakeCluster::new();
        cluster.insert(BuildConfig::new("demo", "app"));
        let first = cluster.instantiate("demo", "app", BuildRequest::new()).await.unwrap();
        let second = cluster.instantiate("demo", "app", BuildRequest::new()).await.unwrap();
        assert_eq!(first.name(), "app-1");
        assert_eq!(second.name(), "app-2");
        assert_eq!(second.build_config_name(), Some("app"));
        assert!(cluster
            .instantiate("demo", "missing", BuildRequest::new())
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_list_filters_namespace_and_labels() {
        let cluster = FakeCluster::new();
        cluster.insert(Build::new("demo", "app-1", "app"));
        cluster.insert(Build::new("demo", "lib-1", "lib"));
        cluster.insert(Build::new("other", "app-1", "app"));

        let options = ListOptions::all().with_label(crate::core::BUILD_CONFIG_LABEL, "app");
        let items = cluster.list(ResourceKind::Build, "demo", &options).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name(), "app-1");
    }
}
