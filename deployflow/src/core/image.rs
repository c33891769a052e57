//! Image references and content digests.
//!
//! An image reference has the shape
//! `[registry/][namespace/]name[:tag][@algorithm:hex]`. Build outputs and
//! image-change triggers refer to images by `name:tag`, while a rollout's
//! containers and a trigger's last triggered image refer to them by digest.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Tag assumed when a reference carries none.
pub const DEFAULT_TAG: &str = "latest";

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$").expect("image name pattern is valid")
});

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w][\w.-]{0,127}$").expect("image tag pattern is valid"));

static DIGEST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:[.+_-][a-z0-9]+)*:[a-fA-F0-9]{32,}$")
        .expect("image digest pattern is valid")
});

/// Errors that can occur while parsing an image reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageReferenceError {
    /// The reference string is empty.
    #[error("Empty image reference")]
    Empty,

    /// The repository name is not valid.
    #[error("Invalid image name '{0}'")]
    InvalidName(String),

    /// The tag is not valid.
    #[error("Invalid image tag '{0}'")]
    InvalidTag(String),

    /// The digest is not of the form `algorithm:hex`.
    #[error("Invalid image digest '{0}'")]
    InvalidDigest(String),
}

/// A parsed container image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageReference {
    registry: Option<String>,
    namespace: Option<String>,
    name: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReference {
    /// Creates a `name:tag` reference.
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Result<Self, ImageReferenceError> {
        format!("{}:{}", name.into(), tag.into()).parse()
    }

    /// The repository name, without registry or namespace.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tag, or [`DEFAULT_TAG`] when none was given.
    #[must_use]
    pub fn tag(&self) -> &str {
        self.tag.as_deref().unwrap_or(DEFAULT_TAG)
    }

    /// The registry host, if present.
    #[must_use]
    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    /// The repository namespace, if present.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The full `algorithm:hex` digest, if present.
    #[must_use]
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// The hex part of the digest, if present.
    #[must_use]
    pub fn hex_digest(&self) -> Option<&str> {
        self.digest
            .as_deref()
            .and_then(|digest| digest.split_once(':'))
            .map(|(_, hex)| hex)
    }

    /// The `name:tag` form used by build outputs and triggers.
    #[must_use]
    pub fn name_tag(&self) -> String {
        format!("{}:{}", self.name, self.tag())
    }

    /// Returns a copy of this reference pinned to a digest.
    pub fn with_digest(&self, digest: impl Into<String>) -> Result<Self, ImageReferenceError> {
        let digest = digest.into();
        if !DIGEST_PATTERN.is_match(&digest) {
            return Err(ImageReferenceError::InvalidDigest(digest));
        }
        Ok(Self {
            digest: Some(digest),
            ..self.clone()
        })
    }
}

fn looks_like_registry(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

impl FromStr for ImageReference {
    type Err = ImageReferenceError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ImageReferenceError::Empty);
        }

        let (path, digest) = match trimmed.split_once('@') {
            Some((path, digest)) => {
                if !DIGEST_PATTERN.is_match(digest) {
                    return Err(ImageReferenceError::InvalidDigest(digest.to_string()));
                }
                (path, Some(digest.to_string()))
            }
            None => (trimmed, None),
        };

        let mut segments: Vec<&str> = path.split('/').collect();
        let last = segments.pop().unwrap_or_default();

        let (name, tag) = match last.rsplit_once(':') {
            Some((name, tag)) => {
                if !TAG_PATTERN.is_match(tag) {
                    return Err(ImageReferenceError::InvalidTag(tag.to_string()));
                }
                (name, Some(tag.to_string()))
            }
            None => (last, None),
        };
        if !NAME_PATTERN.is_match(name) {
            return Err(ImageReferenceError::InvalidName(name.to_string()));
        }

        let registry = match segments.first() {
            Some(first) if looks_like_registry(first) => Some(segments.remove(0).to_string()),
            _ => None,
        };
        let namespace = if segments.is_empty() {
            None
        } else {
            Some(segments.join("/"))
        };

        Ok(Self {
            registry,
            namespace,
            name: name.to_string(),
            tag,
            digest,
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{registry}/")?;
        }
        if let Some(namespace) = &self.namespace {
            write!(f, "{namespace}/")?;
        }
        write!(f, "{}", self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for ImageReference {
    type Error = ImageReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ImageReference> for String {
    fn from(reference: ImageReference) -> Self {
        reference.to_string()
    }
}
