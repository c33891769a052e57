//! Remote resource types.
//!
//! Field names follow the cluster's JSON representation (`metadata`, `spec`,
//! `status`, camelCase keys) so the same types serve the HTTP client and the
//! in-memory fake. Images inside triggers and build outputs travel as object
//! references; a rollout's phase and parent snapshot travel as annotations.

use super::capability::ResourceKind;
use super::image::{ImageReference, ImageReferenceError};
use super::status::{BuildPhase, RolloutPhase};
use crate::errors::{ClusterError, SnapshotError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label linking a build to the build config it was instantiated from.
pub const BUILD_CONFIG_LABEL: &str = "openshift.io/build-config.name";

/// Label linking a rollout instance to its deployment config.
pub const DEPLOYMENT_CONFIG_LABEL: &str = "openshift.io/deployment-config.name";

/// Annotation carrying a rollout instance's deployer phase.
pub const ROLLOUT_PHASE_ANNOTATION: &str = "openshift.io/deployment.phase";

/// Annotation carrying the parent snapshot a rollout instance was created from.
pub const ENCODED_CONFIG_ANNOTATION: &str = "openshift.io/encoded-deployment-config";

/// Object kind for a tag in an image stream.
pub const IMAGE_STREAM_TAG: &str = "ImageStreamTag";

/// Object kind for a plain pull spec.
pub const DOCKER_IMAGE: &str = "DockerImage";

/// Identity and free-form metadata shared by every resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name, unique per kind and namespace.
    pub name: String,
    /// Owning namespace.
    #[serde(default)]
    pub namespace: String,
    /// Opaque version token used for optimistic concurrency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    /// Identifying labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Non-identifying annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Creates metadata for a named resource.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Adds an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Looks up an annotation.
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

/// A reference to another object by kind and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReference {
    /// Referenced kind, such as `ImageStreamTag` or `DockerImage`.
    #[serde(default)]
    pub kind: String,
    /// Referenced name.
    pub name: String,
    /// Namespace of the referenced object, when not the referrer's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ObjectReference {
    /// The reference the cluster would use for `image`: a pull spec once it
    /// is digest-pinned, an image stream tag otherwise.
    #[must_use]
    pub fn for_image(image: &ImageReference) -> Self {
        let kind = if image.digest().is_some() {
            DOCKER_IMAGE
        } else {
            IMAGE_STREAM_TAG
        };
        Self {
            kind: kind.to_string(),
            name: image.to_string(),
            namespace: None,
        }
    }
}

impl TryFrom<ObjectReference> for ImageReference {
    type Error = ImageReferenceError;

    fn try_from(reference: ObjectReference) -> Result<Self, Self::Error> {
        reference.name.parse()
    }
}

/// Serde adapter for image fields carried as [`ObjectReference`]s.
mod image_object {
    use super::{ImageReference, ObjectReference};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(image: &ImageReference, serializer: S) -> Result<S::Ok, S::Error> {
        ObjectReference::for_image(image).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ImageReference, D::Error> {
        let reference = ObjectReference::deserialize(deserializer)?;
        ImageReference::try_from(reference).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Builds
// ---------------------------------------------------------------------------

/// Observed state of a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatus {
    /// Current phase.
    #[serde(default)]
    pub phase: BuildPhase,
    /// Human-readable detail from the build controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A single build run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    /// Metadata.
    pub metadata: ObjectMeta,
    /// Observed state.
    #[serde(default)]
    pub status: BuildStatus,
}

impl Build {
    /// Creates a build owned by `build_config`.
    #[must_use]
    pub fn new(namespace: &str, name: &str, build_config: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name).with_label(BUILD_CONFIG_LABEL, build_config),
            status: BuildStatus::default(),
        }
    }

    /// The build name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> BuildPhase {
        self.status.phase
    }

    /// The owning build config, read from the build's labels.
    #[must_use]
    pub fn build_config_name(&self) -> Option<&str> {
        self.metadata.labels.get(BUILD_CONFIG_LABEL).map(String::as_str)
    }
}

/// Where a build pushes its image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutput {
    /// The image stream tag the build writes.
    #[serde(with = "image_object")]
    pub to: ImageReference,
}

/// Declared state of a build config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfigSpec {
    /// Output image, if the build produces one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<BuildOutput>,
}

/// Observed state of a build config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfigStatus {
    /// Sequence number of the most recently instantiated build.
    #[serde(default)]
    pub last_version: u64,
}

/// The template builds are instantiated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Metadata.
    pub metadata: ObjectMeta,
    /// Declared state.
    #[serde(default)]
    pub spec: BuildConfigSpec,
    /// Observed state.
    #[serde(default)]
    pub status: BuildConfigStatus,
}

impl BuildConfig {
    /// Creates a build config without an output image.
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: BuildConfigSpec::default(),
            status: BuildConfigStatus::default(),
        }
    }

    /// Sets the output image.
    #[must_use]
    pub fn with_output(mut self, to: ImageReference) -> Self {
        self.spec.output = Some(BuildOutput { to });
        self
    }

    /// The build config name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// The declared output image.
    #[must_use]
    pub fn output_image(&self) -> Option<&ImageReference> {
        self.spec.output.as_ref().map(|output| &output.to)
    }

    /// The name of the build for a given sequence number.
    #[must_use]
    pub fn build_name(&self, version: u64) -> String {
        format!("{}-{version}", self.metadata.name)
    }
}

/// Parameters for instantiating a build from a build config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    /// Source revision to build, when not the branch head.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Environment overrides for the build.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl BuildRequest {
    /// Creates an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source revision.
    #[must_use]
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Adds an environment override.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Deployments
// ---------------------------------------------------------------------------

/// Parameters of an image-change trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageChangeParams {
    /// The image stream tag being watched.
    #[serde(with = "image_object")]
    pub from: ImageReference,
    /// Whether a change rolls out without manual intervention.
    #[serde(default)]
    pub automatic: bool,
    /// The digest-pinned image that last caused a rollout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_triggered_image: Option<String>,
}

/// A declared reason for a deployment config to roll out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeploymentTrigger {
    /// Roll out whenever the pod template changes.
    ConfigChange,
    /// Roll out whenever the watched image changes.
    ImageChange {
        /// Trigger parameters.
        #[serde(rename = "imageChangeParams")]
        params: ImageChangeParams,
    },
}

/// The image behind an image-change cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTriggerCause {
    /// The image stream tag whose change fired the trigger.
    #[serde(with = "image_object")]
    pub from: ImageReference,
}

/// Why the latest generation was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeploymentCause {
    /// The pod template changed.
    ConfigChange,
    /// A watched image changed.
    ImageChange {
        /// The trigger that fired.
        #[serde(rename = "imageTrigger")]
        trigger: ImageTriggerCause,
    },
    /// Someone bumped the generation by hand.
    Manual,
    /// A cause type this crate does not interpret.
    #[serde(other)]
    Other,
}

/// Declared state of a deployment config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfigSpec {
    /// Desired replica count.
    #[serde(default)]
    pub replicas: u32,
    /// Declared triggers.
    #[serde(default)]
    pub triggers: Vec<DeploymentTrigger>,
}

/// Details recorded for the latest generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentDetails {
    /// Causes of the latest generation.
    #[serde(default)]
    pub causes: Vec<DeploymentCause>,
}

/// Observed state of a deployment config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfigStatus {
    /// Monotonic generation number; 0 until the first rollout.
    #[serde(default)]
    pub latest_version: u64,
    /// Details of the latest generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<DeploymentDetails>,
}

/// The parent of a series of rollout instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Metadata.
    pub metadata: ObjectMeta,
    /// Declared state.
    #[serde(default)]
    pub spec: DeploymentConfigSpec,
    /// Observed state.
    #[serde(default)]
    pub status: DeploymentConfigStatus,
}

/// Trigger matching is containment on `name:tag`, so `app:latest` is
/// watched by a trigger on `app:latest` as well as by one on `p:latest`.
fn watches(trigger_from: &ImageReference, name_tag: &str) -> bool {
    name_tag.contains(&trigger_from.name_tag())
}

impl DeploymentConfig {
    /// Creates a deployment config with no triggers at generation 0.
    #[must_use]
    pub fn new(namespace: &str, name: &str, replicas: u32) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: DeploymentConfigSpec {
                replicas,
                triggers: Vec::new(),
            },
            status: DeploymentConfigStatus::default(),
        }
    }

    /// Adds an image-change trigger on `from`.
    #[must_use]
    pub fn with_image_trigger(mut self, from: ImageReference) -> Self {
        self.spec.triggers.push(DeploymentTrigger::ImageChange {
            params: ImageChangeParams {
                from,
                automatic: true,
                last_triggered_image: None,
            },
        });
        self
    }

    /// Adds a config-change trigger.
    #[must_use]
    pub fn with_config_trigger(mut self) -> Self {
        self.spec.triggers.push(DeploymentTrigger::ConfigChange);
        self
    }

    /// Sets the latest generation.
    #[must_use]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.status.latest_version = generation;
        self
    }

    /// The deployment config name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// The latest generation number.
    #[must_use]
    pub fn latest_generation(&self) -> u64 {
        self.status.latest_version
    }

    /// The declared replica count.
    #[must_use]
    pub fn desired_replicas(&self) -> u32 {
        self.spec.replicas
    }

    /// Advances the generation by one and returns the new value.
    pub fn bump_generation(&mut self) -> u64 {
        self.status.latest_version += 1;
        self.status.latest_version
    }

    /// The rollout instance name for a generation.
    #[must_use]
    pub fn rollout_name(&self, generation: u64) -> String {
        format!("{}-{generation}", self.metadata.name)
    }

    /// Parameters of every declared image-change trigger.
    pub fn image_triggers(&self) -> impl Iterator<Item = &ImageChangeParams> {
        self.spec.triggers.iter().filter_map(|trigger| match trigger {
            DeploymentTrigger::ImageChange { params } => Some(params),
            DeploymentTrigger::ConfigChange => None,
        })
    }

    fn image_triggers_mut(&mut self) -> impl Iterator<Item = &mut ImageChangeParams> {
        self.spec.triggers.iter_mut().filter_map(|trigger| match trigger {
            DeploymentTrigger::ImageChange { params } => Some(params),
            DeploymentTrigger::ConfigChange => None,
        })
    }

    /// Returns true if an image-change trigger watches `name_tag`.
    #[must_use]
    pub fn watches_image(&self, name_tag: &str) -> bool {
        self.image_triggers().any(|params| watches(&params.from, name_tag))
    }

    /// Returns true if the latest generation was caused by a change to `name_tag`.
    #[must_use]
    pub fn did_image_trigger(&self, name_tag: &str) -> bool {
        self.status.details.as_ref().is_some_and(|details| {
            details.causes.iter().any(|cause| match cause {
                DeploymentCause::ImageChange { trigger } => watches(&trigger.from, name_tag),
                DeploymentCause::ConfigChange | DeploymentCause::Manual | DeploymentCause::Other => false,
            })
        })
    }

    /// The hex digest of the image last rolled out for `name_tag`.
    #[must_use]
    pub fn image_hex_for(&self, name_tag: &str) -> Option<String> {
        self.image_triggers()
            .filter(|params| watches(&params.from, name_tag))
            .filter_map(|params| params.last_triggered_image.as_deref())
            .filter_map(|raw| raw.parse::<ImageReference>().ok())
            .find_map(|image| image.hex_digest().map(str::to_string))
    }

    /// Records that `image` fired the triggers watching `name_tag` and
    /// advances the generation, the way the trigger controller does.
    pub fn record_image_change(&mut self, name_tag: &str, image: &ImageReference) -> u64 {
        let mut sources = Vec::new();
        for params in self.image_triggers_mut() {
            if watches(&params.from, name_tag) {
                params.last_triggered_image = Some(image.to_string());
                sources.push(params.from.clone());
            }
        }
        self.status.details = Some(DeploymentDetails {
            causes: sources
                .into_iter()
                .map(|from| DeploymentCause::ImageChange {
                    trigger: ImageTriggerCause { from },
                })
                .collect(),
        });
        self.bump_generation()
    }
}

/// Declared state of a rollout instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutSpec {
    /// Desired replica count.
    #[serde(default)]
    pub replicas: u32,
}

/// Observed state of a rollout instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutStatus {
    /// Replicas currently running.
    #[serde(default)]
    pub replicas: u32,
}

/// One generation of a deployment config.
///
/// The deployer phase and the parent snapshot live in annotations, under
/// [`ROLLOUT_PHASE_ANNOTATION`] and [`ENCODED_CONFIG_ANNOTATION`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutInstance {
    /// Metadata.
    pub metadata: ObjectMeta,
    /// Declared state.
    #[serde(default)]
    pub spec: RolloutSpec,
    /// Observed state.
    #[serde(default)]
    pub status: RolloutStatus,
}

impl RolloutInstance {
    /// Creates the rollout instance for the parent's latest generation,
    /// embedding a snapshot of the parent.
    pub fn from_parent(parent: &DeploymentConfig, phase: RolloutPhase) -> Result<Self, serde_json::Error> {
        let encoded = serde_json::to_string(parent)?;
        let name = parent.rollout_name(parent.latest_generation());
        Ok(Self {
            metadata: ObjectMeta::new(parent.metadata.namespace.clone(), name)
                .with_label(DEPLOYMENT_CONFIG_LABEL, parent.name())
                .with_annotation(ROLLOUT_PHASE_ANNOTATION, phase.to_string())
                .with_annotation(ENCODED_CONFIG_ANNOTATION, encoded),
            spec: RolloutSpec {
                replicas: parent.desired_replicas(),
            },
            status: RolloutStatus { replicas: 0 },
        })
    }

    /// The rollout name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// The deployer phase; `New` until the deployer records one.
    #[must_use]
    pub fn phase(&self) -> RolloutPhase {
        self.metadata
            .annotation(ROLLOUT_PHASE_ANNOTATION)
            .and_then(RolloutPhase::from_annotation)
            .unwrap_or_default()
    }

    /// Records the deployer phase.
    pub fn set_phase(&mut self, phase: RolloutPhase) {
        self.metadata
            .annotations
            .insert(ROLLOUT_PHASE_ANNOTATION.to_string(), phase.to_string());
    }

    /// The raw parent snapshot, if one was recorded.
    #[must_use]
    pub fn encoded_config(&self) -> Option<&str> {
        self.metadata.annotation(ENCODED_CONFIG_ANNOTATION)
    }

    /// Replaces or removes the raw parent snapshot.
    pub fn set_encoded_config(&mut self, encoded: Option<String>) {
        match encoded {
            Some(encoded) => {
                self.metadata
                    .annotations
                    .insert(ENCODED_CONFIG_ANNOTATION.to_string(), encoded);
            }
            None => {
                self.metadata.annotations.remove(ENCODED_CONFIG_ANNOTATION);
            }
        }
    }

    /// Replicas currently running.
    #[must_use]
    pub fn current_replicas(&self) -> u32 {
        self.status.replicas
    }

    /// Replicas requested.
    #[must_use]
    pub fn desired_replicas(&self) -> u32 {
        self.spec.replicas
    }

    /// Requests a new replica count.
    pub fn set_desired_replicas(&mut self, replicas: u32) {
        self.spec.replicas = replicas;
    }

    /// Decodes the parent snapshot embedded at creation time.
    pub fn parent_snapshot(&self) -> Result<DeploymentConfig, SnapshotError> {
        let encoded = self
            .encoded_config()
            .ok_or_else(|| SnapshotError::Missing(self.name().to_string()))?;
        serde_json::from_str(encoded).map_err(|source| SnapshotError::Malformed {
            rollout: self.name().to_string(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Tagged resource
// ---------------------------------------------------------------------------

/// Any resource deployflow reads or writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Resource {
    /// A build.
    Build(Build),
    /// A build config.
    BuildConfig(BuildConfig),
    /// A deployment config.
    DeploymentConfig(DeploymentConfig),
    /// A rollout instance.
    #[serde(rename = "ReplicationController")]
    Rollout(RolloutInstance),
}

impl Resource {
    /// The resource kind.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Build(_) => ResourceKind::Build,
            Self::BuildConfig(_) => ResourceKind::BuildConfig,
            Self::DeploymentConfig(_) => ResourceKind::DeploymentConfig,
            Self::Rollout(_) => ResourceKind::ReplicationController,
        }
    }

    /// Shared metadata.
    #[must_use]
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Build(r) => &r.metadata,
            Self::BuildConfig(r) => &r.metadata,
            Self::DeploymentConfig(r) => &r.metadata,
            Self::Rollout(r) => &r.metadata,
        }
    }

    /// Mutable shared metadata.
    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::Build(r) => &mut r.metadata,
            Self::BuildConfig(r) => &mut r.metadata,
            Self::DeploymentConfig(r) => &mut r.metadata,
            Self::Rollout(r) => &mut r.metadata,
        }
    }

    /// The resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata().name
    }
}

/// A concrete resource type that can be carried inside a [`Resource`].
pub trait TypedResource: Sized + Clone + Send + Sync + 'static {
    /// The kind of this type.
    const KIND: ResourceKind;

    /// Shared metadata.
    fn metadata(&self) -> &ObjectMeta;

    /// Mutable shared metadata.
    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    /// Wraps the value in the tagged enum.
    fn into_resource(self) -> Resource;

    /// Unwraps the tagged enum, failing on a kind mismatch.
    fn try_from_resource(resource: Resource) -> Result<Self, ClusterError>;
}

macro_rules! typed_resource {
    ($ty:ty, $variant:ident, $kind:expr) => {
        impl TypedResource for $ty {
            const KIND: ResourceKind = $kind;

            fn metadata(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }

            fn into_resource(self) -> Resource {
                Resource::$variant(self)
            }

            fn try_from_resource(resource: Resource) -> Result<Self, ClusterError> {
                match resource {
                    Resource::$variant(inner) => Ok(inner),
                    other => Err(ClusterError::UnexpectedKind {
                        expected: Self::KIND,
                        actual: other.kind(),
                    }),
                }
            }
        }
    };
}

typed_resource!(Build, Build, ResourceKind::Build);
typed_resource!(BuildConfig, BuildConfig, ResourceKind::BuildConfig);
typed_resource!(DeploymentConfig, DeploymentConfig, ResourceKind::DeploymentConfig);
typed_resource!(RolloutInstance, Rollout, ResourceKind::ReplicationController);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const OLD: &str = "1111111111111111111111111111111111111111111111111111111111111111";
    const NEW: &str = "2222222222222222222222222222222222222222222222222222222222222222";

    fn app_latest() -> ImageReference {
        ImageReference::new("app", "latest").unwrap()
    }

    fn pinned(hex: &str) -> ImageReference {
        format!("registry.local/demo/app@sha256:{hex}").parse().unwrap()
    }

    #[test]
    fn test_build_config_label() {
        let build = Build::new("demo", "app-1", "app");
        assert_eq!(build.build_config_name(), Some("app"));
        assert_eq!(build.phase(), BuildPhase::New);
    }

    #[test]
    fn test_build_config_output() {
        let bc = BuildConfig::new("demo", "app").with_output(app_latest());
        assert_eq!(bc.output_image().map(ImageReference::name_tag), Some("app:latest".to_string()));
        assert_eq!(bc.build_name(3), "app-3");
        assert!(BuildConfig::new("demo", "lib").output_image().is_none());
    }

    #[test]
    fn test_watches_image_uses_containment() {
        let dc = DeploymentConfig::new("demo", "app", 1).with_image_trigger(app_latest());
        assert!(dc.watches_image("app:latest"));
        assert!(dc.watches_image("myapp:latest"));
        assert!(!dc.watches_image("app:v2"));
        assert!(!DeploymentConfig::new("demo", "bare", 1).watches_image("app:latest"));
    }

    #[test]
    fn test_record_image_change_fires_trigger() {
        let mut dc = DeploymentConfig::new("demo", "app", 1)
            .with_config_trigger()
            .with_image_trigger(app_latest())
            .with_generation(1);
        assert!(!dc.did_image_trigger("app:latest"));
        assert_eq!(dc.image_hex_for("app:latest"), None);

        let generation = dc.record_image_change("app:latest", &pinned(NEW));

        assert_eq!(generation, 2);
        assert!(dc.did_image_trigger("app:latest"));
        assert_eq!(dc.image_hex_for("app:latest"), Some(NEW.to_string()));
        assert_eq!(dc.rollout_name(generation), "app-2");
    }

    #[test]
    fn test_rollout_snapshot_recovers_prior_digest() {
        let mut dc = DeploymentConfig::new("demo", "app", 2).with_image_trigger(app_latest());
        dc.record_image_change("app:latest", &pinned(OLD));

        let rollout = RolloutInstance::from_parent(&dc, RolloutPhase::Complete).unwrap();
        assert_eq!(rollout.name(), "app-1");
        assert_eq!(rollout.desired_replicas(), 2);
        assert_eq!(rollout.metadata.labels.get(DEPLOYMENT_CONFIG_LABEL).unwrap(), "app");

        let snapshot = rollout.parent_snapshot().unwrap();
        assert_eq!(snapshot.image_hex_for("app:latest"), Some(OLD.to_string()));
    }

    #[test]
    fn test_parent_snapshot_errors() {
        let dc = DeploymentConfig::new("demo", "app", 1).with_generation(1);
        let mut rollout = RolloutInstance::from_parent(&dc, RolloutPhase::New).unwrap();
        rollout.set_encoded_config(None);
        assert!(matches!(rollout.parent_snapshot(), Err(SnapshotError::Missing(_))));

        rollout.set_encoded_config(Some("{not json".to_string()));
        assert!(matches!(
            rollout.parent_snapshot(),
            Err(SnapshotError::Malformed { .. })
        ));
    }

    #[test]
    fn test_resource_wire_format() {
        let dc = DeploymentConfig::new("demo", "app", 1).with_image_trigger(app_latest());
        let json = serde_json::to_value(dc.clone().into_resource()).unwrap();
        assert_eq!(json["kind"], "DeploymentConfig");
        assert_eq!(json["spec"]["triggers"][0]["type"], "ImageChange");
        assert_eq!(
            json["spec"]["triggers"][0]["imageChangeParams"]["from"],
            serde_json::json!({"kind": "ImageStreamTag", "name": "app:latest"})
        );
        assert_eq!(json["status"]["latestVersion"], 0);

        let back: Resource = serde_json::from_value(json).unwrap();
        assert_eq!(DeploymentConfig::try_from_resource(back).unwrap(), dc);
    }

    #[test]
    fn test_rollout_kind_name_on_wire() {
        let dc = DeploymentConfig::new("demo", "app", 1).with_generation(1);
        let rollout = RolloutInstance::from_parent(&dc, RolloutPhase::Running).unwrap();
        let json = serde_json::to_value(rollout.into_resource()).unwrap();
        assert_eq!(json["kind"], "ReplicationController");
        assert_eq!(json["metadata"]["annotations"][ROLLOUT_PHASE_ANNOTATION], "Running");
        assert!(json["metadata"]["annotations"][ENCODED_CONFIG_ANNOTATION].is_string());
        assert!(json["status"].get("phase").is_none());
    }

    #[test]
    fn test_decodes_cluster_build_config() {
        let raw = r#"{
            "kind": "BuildConfig",
            "apiVersion": "build.openshift.io/v1",
            "metadata": {"name": "app", "namespace": "demo", "resourceVersion": "811"},
            "spec": {
                "source": {"git": {"uri": "https://git.local/app.git"}},
                "strategy": {"type": "Source"},
                "output": {"to": {"kind": "ImageStreamTag", "name": "app:latest"}}
            },
            "status": {"lastVersion": 4}
        }"#;

        let config = BuildConfig::try_from_resource(serde_json::from_str(raw).unwrap()).unwrap();

        assert_eq!(config.output_image().map(ImageReference::name_tag), Some("app:latest".to_string()));
        assert_eq!(config.status.last_version, 4);
    }

    #[test]
    fn test_decodes_cluster_deployment_config() {
        let raw = format!(
            r#"{{
            "kind": "DeploymentConfig",
            "apiVersion": "apps.openshift.io/v1",
            "metadata": {{"name": "app", "namespace": "demo"}},
            "spec": {{
                "replicas": 2,
                "triggers": [
                    {{"type": "ConfigChange"}},
                    {{
                        "type": "ImageChange",
                        "imageChangeParams": {{
                            "automatic": true,
                            "containerNames": ["app"],
                            "from": {{"kind": "ImageStreamTag", "namespace": "demo", "name": "app:latest"}},
                            "lastTriggeredImage": "registry.local/demo/app@sha256:{NEW}"
                        }}
                    }}
                ]
            }},
            "status": {{
                "latestVersion": 3,
                "details": {{
                    "message": "image change",
                    "causes": [
                        {{"type": "ImageChange", "imageTrigger": {{"from": {{"kind": "ImageStreamTag", "name": "app:latest"}}}}}}
                    ]
                }}
            }}
        }}"#
        );

        let dc = DeploymentConfig::try_from_resource(serde_json::from_str(&raw).unwrap()).unwrap();

        assert_eq!(dc.latest_generation(), 3);
        assert!(dc.watches_image("app:latest"));
        assert!(dc.did_image_trigger("app:latest"));
        assert_eq!(dc.image_hex_for("app:latest"), Some(NEW.to_string()));
    }

    #[test]
    fn test_unknown_cause_type_is_tolerated() {
        let details: DeploymentDetails =
            serde_json::from_str(r#"{"causes": [{"type": "Rollback"}, {"type": "Manual"}]}"#).unwrap();
        assert_eq!(details.causes, vec![DeploymentCause::Other, DeploymentCause::Manual]);
    }

    #[test]
    fn test_decodes_cluster_rollout() {
        let mut parent = DeploymentConfig::new("demo", "app", 2).with_image_trigger(app_latest());
        parent.record_image_change("app:latest", &pinned(OLD));
        let encoded = serde_json::to_string(&parent).unwrap();
        let raw = serde_json::json!({
            "kind": "ReplicationController",
            "apiVersion": "v1",
            "metadata": {
                "name": "app-1",
                "namespace": "demo",
                "labels": {"openshift.io/deployment-config.name": "app"},
                "annotations": {
                    "openshift.io/deployment.phase": "Complete",
                    "openshift.io/encoded-deployment-config": encoded,
                    "openshift.io/deployment-config.latest-version": "1"
                }
            },
            "spec": {"replicas": 2, "selector": {"deploymentconfig": "app"}},
            "status": {"replicas": 2, "readyReplicas": 2}
        });

        let rollout = RolloutInstance::try_from_resource(serde_json::from_value(raw).unwrap()).unwrap();

        assert_eq!(rollout.phase(), RolloutPhase::Complete);
        assert_eq!(rollout.current_replicas(), 2);
        let snapshot = rollout.parent_snapshot().unwrap();
        assert_eq!(snapshot.image_hex_for("app:latest"), Some(OLD.to_string()));
    }

    #[test]
    fn test_rollout_without_phase_annotation_is_new() {
        let dc = DeploymentConfig::new("demo", "app", 1).with_generation(1);
        let mut rollout = RolloutInstance::from_parent(&dc, RolloutPhase::Running).unwrap();
        rollout.metadata.annotations.remove(ROLLOUT_PHASE_ANNOTATION);
        assert_eq!(rollout.phase(), RolloutPhase::New);

        rollout.set_phase(RolloutPhase::Failed);
        assert_eq!(rollout.phase(), RolloutPhase::Failed);
    }

    #[test]
    fn test_pinned_image_serializes_as_docker_image() {
        let reference = ObjectReference::for_image(&pinned(NEW));
        assert_eq!(reference.kind, DOCKER_IMAGE);
        assert_eq!(ObjectReference::for_image(&app_latest()).kind, IMAGE_STREAM_TAG);
        assert_eq!(ImageReference::try_from(reference).unwrap(), pinned(NEW));
    }

    #[test]
    fn test_kind_mismatch() {
        let resource = Build::new("demo", "app-1", "app").into_resource();
        let err = BuildConfig::try_from_resource(resource).unwrap_err();
        assert_eq!(
            err,
            ClusterError::UnexpectedKind {
                expected: ResourceKind::BuildConfig,
                actual: ResourceKind::Build,
            }
        );
    }
}
