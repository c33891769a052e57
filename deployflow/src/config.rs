//! Configuration types for steps, polling and the cluster client.

use crate::errors::DeployflowError;
use crate::utils::WaitBudget;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tick and budget settings shared by every polling loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    /// Delay between build and rollout status polls, in milliseconds.
    #[serde(default = "default_status_tick")]
    pub status_tick_ms: u64,
    /// Delay between image-trigger polls, in milliseconds.
    #[serde(default = "default_trigger_tick")]
    pub trigger_tick_ms: u64,
    /// Delay between reachability probes, in milliseconds.
    #[serde(default = "default_probe_tick")]
    pub probe_tick_ms: u64,
    /// Delay between provenance annotation attempts, in milliseconds.
    #[serde(default = "default_annotate_backoff")]
    pub annotate_backoff_ms: u64,
    /// Maximum provenance annotation attempts.
    #[serde(default = "default_annotate_attempts")]
    pub annotate_attempts: u32,
    /// The trigger sub-budget is the step budget divided by this.
    #[serde(default = "default_trigger_budget_divisor")]
    pub trigger_budget_divisor: u32,
}

fn default_status_tick() -> u64 {
    1_000
}

fn default_trigger_tick() -> u64 {
    10_000
}

fn default_probe_tick() -> u64 {
    2_500
}

fn default_annotate_backoff() -> u64 {
    3_000
}

fn default_annotate_attempts() -> u32 {
    3
}

fn default_trigger_budget_divisor() -> u32 {
    3
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            status_tick_ms: default_status_tick(),
            trigger_tick_ms: default_trigger_tick(),
            probe_tick_ms: default_probe_tick(),
            annotate_backoff_ms: default_annotate_backoff(),
            annotate_attempts: default_annotate_attempts(),
            trigger_budget_divisor: default_trigger_budget_divisor(),
        }
    }
}

impl PollSettings {
    /// Creates settings with the default ticks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status tick.
    #[must_use]
    pub fn with_status_tick_ms(mut self, ms: u64) -> Self {
        self.status_tick_ms = ms;
        self
    }

    /// Sets the trigger tick.
    #[must_use]
    pub fn with_trigger_tick_ms(mut self, ms: u64) -> Self {
        self.trigger_tick_ms = ms;
        self
    }

    /// Sets the probe tick.
    #[must_use]
    pub fn with_probe_tick_ms(mut self, ms: u64) -> Self {
        self.probe_tick_ms = ms;
        self
    }

    /// Sets the annotation backoff.
    #[must_use]
    pub fn with_annotate_backoff_ms(mut self, ms: u64) -> Self {
        self.annotate_backoff_ms = ms;
        self
    }

    /// Sets the annotation attempt limit.
    #[must_use]
    pub fn with_annotate_attempts(mut self, attempts: u32) -> Self {
        self.annotate_attempts = attempts;
        self
    }

    /// Status tick as a duration.
    #[must_use]
    pub fn status_tick(&self) -> Duration {
        Duration::from_millis(self.status_tick_ms)
    }

    /// Trigger tick as a duration.
    #[must_use]
    pub fn trigger_tick(&self) -> Duration {
        Duration::from_millis(self.trigger_tick_ms)
    }

    /// Probe tick as a duration.
    #[must_use]
    pub fn probe_tick(&self) -> Duration {
        Duration::from_millis(self.probe_tick_ms)
    }

    /// Annotation backoff as a duration.
    #[must_use]
    pub fn annotate_backoff(&self) -> Duration {
        Duration::from_millis(self.annotate_backoff_ms)
    }

    /// The portion of `budget` granted to waiting for a trigger to fire.
    #[must_use]
    pub fn trigger_budget(&self, budget: Duration) -> Duration {
        budget / self.trigger_budget_divisor.max(1)
    }
}

/// What the step harness supplies to every step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepConfig {
    /// Namespace the target lives in.
    pub namespace: String,
    /// Name of the target resource.
    pub target: String,
    /// How long the step may wait.
    #[serde(default)]
    pub wait_time: WaitBudget,
    /// Whether progress lines are recorded.
    #[serde(default)]
    pub verbose: bool,
}

impl StepConfig {
    /// Creates a step config with the default wait time.
    #[must_use]
    pub fn new(namespace: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            target: target.into(),
            wait_time: WaitBudget::default(),
            verbose: false,
        }
    }

    /// Sets the wait time.
    #[must_use]
    pub fn with_wait_time(mut self, wait_time: WaitBudget) -> Self {
        self.wait_time = wait_time;
        self
    }

    /// Sets the wait time from harness text such as `90sec`.
    pub fn with_wait_text(mut self, text: &str) -> Result<Self, DeployflowError> {
        self.wait_time = WaitBudget::parse(text)?;
        Ok(self)
    }

    /// Enables or disables verbose logging.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Checks that the config names a target.
    pub fn validate(&self) -> Result<(), DeployflowError> {
        if self.namespace.trim().is_empty() {
            return Err(DeployflowError::Config("namespace is required".to_string()));
        }
        if self.target.trim().is_empty() {
            return Err(DeployflowError::Config("target name is required".to_string()));
        }
        Ok(())
    }
}

/// Connection settings for the HTTP cluster client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API server base URL.
    pub base_url: String,
    /// Bearer token, if the server requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: f64,
    /// Accept any server certificate.
    #[serde(default)]
    pub skip_tls_verify: bool,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_request_timeout() -> f64 {
    30.0
}

fn default_user_agent() -> String {
    "deployflow/0.1".to_string()
}

impl ClientConfig {
    /// Creates a config for `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            request_timeout_seconds: default_request_timeout(),
            skip_tls_verify: false,
            user_agent: default_user_agent(),
        }
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.request_timeout_seconds = seconds;
        self
    }

    /// Accepts any server certificate.
    #[must_use]
    pub fn with_skip_tls_verify(mut self, skip: bool) -> Self {
        self.skip_tls_verify = skip;
        self
    }

    /// Gets the request timeout as a duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_seconds.max(0.0))
    }

    /// The base URL without a trailing slash.
    #[must_use]
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Checks that the config is usable.
    pub fn validate(&self) -> Result<(), DeployflowError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(DeployflowError::Config(format!(
                "base URL must be http or https: {}",
                self.base_url
            )));
        }
        if !self.request_timeout_seconds.is_finite() || self.request_timeout_seconds <= 0.0 {
            return Err(DeployflowError::Config(
                "request timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_settings_defaults() {
        let settings = PollSettings::default();
        assert_eq!(settings.status_tick(), Duration::from_secs(1));
        assert_eq!(settings.trigger_tick(), Duration::from_secs(10));
        assert_eq!(settings.probe_tick(), Duration::from_millis(2_500));
        assert_eq!(settings.annotate_backoff(), Duration::from_secs(3));
        assert_eq!(settings.annotate_attempts, 3);
    }

    #[test]
    fn test_trigger_budget_is_a_third() {
        let settings = PollSettings::default();
        assert_eq!(
            settings.trigger_budget(Duration::from_secs(90)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_poll_settings_partial_json() {
        let settings: PollSettings = serde_json::from_str(r#"{"status_tick_ms": 5}"#).unwrap();
        assert_eq!(settings.status_tick_ms, 5);
        assert_eq!(settings.trigger_tick_ms, 10_000);
    }

    #[test]
    fn test_step_config_from_harness_json() {
        let config: StepConfig = serde_json::from_str(
            r#"{"namespace": "demo", "target": "app", "waitTime": "2min", "verbose": true}"#,
        )
        .unwrap();
        assert_eq!(config.wait_time.as_millis(), 120_000);
        assert!(config.verbose);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_step_config_validation() {
        assert!(StepConfig::new("", "app").validate().is_err());
        assert!(StepConfig::new("demo", " ").validate().is_err());
        assert!(StepConfig::new("demo", "app").with_wait_text("soon").is_err());
    }

    #[test]
    fn test_client_config() {
        let config = ClientConfig::new("https://api.cluster.local:6443/")
            .with_token("secret")
            .with_timeout(5.0);
        assert_eq!(config.base(), "https://api.cluster.local:6443");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
        assert!(ClientConfig::new("ftp://nope").validate().is_err());
    }
}
