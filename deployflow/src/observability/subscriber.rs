//! Global tracing subscriber setup.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

/// Output format for the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Plain,
    /// One JSON object per event.
    Json,
}

const DEFAULT_FILTER: &str = "deployflow=info";

/// Builds an env-filtered subscriber in `format`, honoring `RUST_LOG` when set.
#[must_use]
pub fn build_subscriber(format: LogFormat) -> Box<dyn Subscriber + Send + Sync> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Plain => Box::new(registry.with(tracing_subscriber::fmt::layer())),
        LogFormat::Json => Box::new(registry.with(tracing_subscriber::fmt::layer().json())),
    }
}

/// Installs [`build_subscriber`] as the global subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    tracing::subscriber::set_global_default(build_subscriber(format))
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}
