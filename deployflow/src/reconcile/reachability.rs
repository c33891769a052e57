//! Service reachability probing.
//!
//! A rollout can complete while its service is still not answering. The
//! reachability verifier probes an endpoint on every tick until it answers
//! or the deadline passes.

use super::cancelled;
use crate::cancellation::Deadline;
use crate::core::{FailureReason, Verdict};
use crate::observability::StepLog;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

/// A host and port to probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Request path for HTTP probes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Endpoint {
    /// Creates an endpoint.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: None,
        }
    }

    /// Sets the HTTP path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The URL an HTTP probe requests.
    #[must_use]
    pub fn url(&self) -> String {
        let path = self.path.as_deref().unwrap_or("/");
        let path = path.strip_prefix('/').unwrap_or(path);
        format!("http://{}/{path}", self.address())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}{path}", self.address()),
            None => f.write_str(&self.address()),
        }
    }
}

/// Why a single probe failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// The connection could not be opened.
    #[error("cannot connect to {endpoint}: {message}")]
    Connect {
        /// The probed endpoint.
        endpoint: String,
        /// Transport detail.
        message: String,
    },

    /// The probe did not finish in time.
    #[error("probe of {0} timed out")]
    Timeout(String),

    /// The endpoint answered with a server error.
    #[error("{endpoint} answered with status {status}")]
    Status {
        /// The probed endpoint.
        endpoint: String,
        /// HTTP status.
        status: u16,
    },
}

/// Checks whether an endpoint answers.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probes `endpoint` once.
    async fn probe(&self, endpoint: &Endpoint) -> Result<(), ProbeError>;
}

/// Probes by opening a TCP connection.
#[derive(Debug, Clone)]
pub struct TcpProber {
    connect_timeout: Duration,
}

impl Default for TcpProber {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
        }
    }
}

impl TcpProber {
    /// Creates a prober with a 2 second connect timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
        let address = endpoint.address();
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::Connect {
                endpoint: address,
                message: e.to_string(),
            }),
            Err(_) => Err(ProbeError::Timeout(address)),
        }
    }
}

/// Probes with an HTTP GET; anything below 500 counts as reachable.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpProber {
    /// Creates a prober whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, crate::errors::DeployflowError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::errors::DeployflowError::Config(e.to_string()))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
        let response = self.client.get(endpoint.url()).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(endpoint.to_string())
            } else {
                ProbeError::Connect {
                    endpoint: endpoint.to_string(),
                    message: e.to_string(),
                }
            }
        })?;
        let status = response.status();
        if status.is_server_error() {
            return Err(ProbeError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Probes `endpoint` every `tick` until it answers or `deadline` passes.
pub async fn verify_reachability(
    prober: &dyn Prober,
    endpoint: &Endpoint,
    deadline: &Deadline,
    tick: Duration,
    log: &StepLog,
) -> Verdict {
    let mut attempts = 0u32;
    let mut last_error: Option<ProbeError> = None;

    loop {
        if deadline.is_cancelled() {
            return Err(cancelled(deadline));
        }

        attempts += 1;
        match prober.probe(endpoint).await {
            Ok(()) => {
                log.info(format!("{endpoint} is reachable"));
                debug!(%endpoint, attempts, "probe succeeded");
                return Ok(());
            }
            Err(e) => {
                log.verbose(format!("probe {attempts} of {endpoint} failed: {e}"));
                last_error = Some(e);
            }
        }

        if deadline.is_expired() {
            break;
        }
        deadline.sleep(tick).await;
    }

    if deadline.is_cancelled() {
        return Err(cancelled(deadline));
    }
    let last_observed = match last_error {
        Some(e) => format!("{endpoint} unreachable after {attempts} attempts: {e}"),
        None => format!("{endpoint} unreachable after {attempts} attempts"),
    };
    log.error(last_observed.clone());
    Err(FailureReason::Timeout {
        waited_ms: deadline.elapsed_ms(),
        last_observed,
    })
}
