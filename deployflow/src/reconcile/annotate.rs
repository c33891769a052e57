//! Best-effort job provenance annotation.

use super::Reconciler;
use crate::cancellation::Deadline;
use crate::core::{Capability, TypedResource};
use crate::errors::ClusterError;
use crate::observability::StepLog;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Annotation key carrying the job that produced a resource.
pub const PROVENANCE_ANNOTATION: &str = "openshift.io/jenkins-build-uri";

/// Identifies the pipeline job driving the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceContext {
    /// Job name.
    pub job_name: String,
    /// Build number within the job.
    pub build_number: String,
    /// Pre-resolved callback URL; used verbatim when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

impl ProvenanceContext {
    /// Creates a context from a job name and build number.
    #[must_use]
    pub fn new(job_name: impl Into<String>, build_number: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            build_number: build_number.into(),
            callback_url: None,
        }
    }

    /// Sets the callback URL.
    #[must_use]
    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    /// Reads `JOB_NAME`, `BUILD_NUMBER` and `BUILD_URL` from a map.
    ///
    /// Returns `None` unless both the job name and build number are present.
    #[must_use]
    pub fn from_map(vars: &HashMap<String, String>) -> Option<Self> {
        let job_name = vars.get("JOB_NAME").filter(|v| !v.is_empty())?;
        let build_number = vars.get("BUILD_NUMBER").filter(|v| !v.is_empty())?;
        let mut context = Self::new(job_name.clone(), build_number.clone());
        context.callback_url = vars.get("BUILD_URL").filter(|v| !v.is_empty()).cloned();
        Some(context)
    }

    /// Reads the same variables from the process environment.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let vars: HashMap<String, String> = ["JOB_NAME", "BUILD_NUMBER", "BUILD_URL"]
            .into_iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key.to_string(), value)))
            .collect();
        Self::from_map(&vars)
    }

    /// The annotation value.
    #[must_use]
    pub fn value(&self) -> String {
        self.callback_url
            .clone()
            .unwrap_or_else(|| format!("job/{}/{}/", self.job_name, self.build_number))
    }
}

impl Reconciler {
    /// Writes the provenance annotation onto `name`.
    ///
    /// Each attempt re-reads the resource so the write carries its current
    /// version. Never fails the caller: exhausting the attempts, or reaching
    /// `deadline` between them, logs a warning and returns `false`.
    pub async fn annotate_provenance<T: TypedResource>(
        &self,
        name: &str,
        deadline: &Deadline,
        log: &StepLog,
    ) -> bool {
        let Some(provenance) = &self.provenance else {
            log.verbose(format!("no job provenance configured; not annotating {name}"));
            return false;
        };
        if !T::KIND.supports(Capability::Annotatable) {
            debug!(kind = %T::KIND, "kind does not take annotations");
            return false;
        }

        let value = provenance.value();
        let attempts = self.settings.annotate_attempts.max(1);
        for attempt in 1..=attempts {
            match self.write_annotation::<T>(name, &value).await {
                Ok(()) => {
                    log.verbose(format!("annotated {} {name} with {value}", T::KIND));
                    return true;
                }
                Err(e) if attempt < attempts => {
                    debug!(kind = %T::KIND, %name, attempt, error = %e, "annotation attempt failed");
                    deadline.sleep(self.settings.annotate_backoff()).await;
                    if deadline.is_expired() {
                        log.warn(format!(
                            "stopped annotating {} {name} after {attempt} attempts: {e}",
                            T::KIND
                        ));
                        return false;
                    }
                }
                Err(e) => {
                    log.warn(format!(
                        "could not annotate {} {name} after {attempts} attempts: {e}",
                        T::KIND
                    ));
                }
            }
        }
        false
    }

    async fn write_annotation<T: TypedResource>(&self, name: &str, value: &str) -> Result<(), ClusterError> {
        let mut resource = self.cluster.get::<T>(name).await?;
        resource
            .metadata_mut()
            .annotations
            .insert(PROVENANCE_ANNOTATION.to_string(), value.to_string());
        self.cluster.update(&resource).await.map(|_| ())
    }
}
