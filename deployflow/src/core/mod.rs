//! Core domain model types for deployflow.
//!
//! This module contains the types every other module works with:
//! - Build and rollout phase enums
//! - Image references and digests
//! - The remote resource model and its capability set
//! - Step outcomes and failure reasons

mod capability;
mod image;
mod outcome;
mod resources;
mod status;

pub use capability::{Capability, CapabilitySet, ResourceKind};
pub use image::{ImageReference, ImageReferenceError, DEFAULT_TAG};
pub use outcome::{FailureReason, ProofGap, StepOutcome, Verdict};
pub use resources::{
    Build, BuildConfig, BuildConfigSpec, BuildConfigStatus, BuildOutput, BuildRequest,
    BuildStatus, DeploymentCause, DeploymentConfig, DeploymentConfigSpec,
    DeploymentConfigStatus, DeploymentDetails, DeploymentTrigger, ImageChangeParams,
    ImageTriggerCause, ObjectMeta, ObjectReference, Resource, RolloutInstance, RolloutSpec,
    RolloutStatus, TypedResource, BUILD_CONFIG_LABEL, DEPLOYMENT_CONFIG_LABEL, DOCKER_IMAGE,
    ENCODED_CONFIG_ANNOTATION, IMAGE_STREAM_TAG, ROLLOUT_PHASE_ANNOTATION,
};
pub use status::{BuildPhase, RolloutPhase};
