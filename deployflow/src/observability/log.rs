//! Per-step log collection.
//!
//! The step harness expects human-readable lines back from every step. A
//! [`StepLog`] collects them and mirrors each one to `tracing` with the step
//! name and run id attached, so the same line shows up in structured logs.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Severity of a step log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Progress detail, recorded only for verbose steps.
    Verbose,
    /// Normal progress.
    Info,
    /// Something went wrong but the step carries on.
    Warn,
    /// The step failed.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verbose => write!(f, "VERBOSE"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// One recorded line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// When the line was recorded.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: LogLevel,
    /// The message.
    pub message: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.level,
            self.message
        )
    }
}

/// Collects the lines a step reports to its harness.
#[derive(Debug)]
pub struct StepLog {
    step: String,
    run_id: Uuid,
    verbose: bool,
    lines: RwLock<Vec<LogLine>>,
}

impl StepLog {
    /// Creates a log for a step.
    #[must_use]
    pub fn new(step: impl Into<String>, verbose: bool) -> Self {
        Self {
            step: step.into(),
            run_id: Uuid::new_v4(),
            verbose,
            lines: RwLock::new(Vec::new()),
        }
    }

    /// The step name.
    #[must_use]
    pub fn step(&self) -> &str {
        &self.step
    }

    /// Identifier of this step run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Whether verbose lines are recorded.
    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Records a progress line.
    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!(step = %self.step, run_id = %self.run_id, "{message}");
        self.push(LogLevel::Info, message);
    }

    /// Records a detail line when the step is verbose.
    pub fn verbose(&self, message: impl Into<String>) {
        let message = message.into();
        debug!(step = %self.step, run_id = %self.run_id, "{message}");
        if self.verbose {
            self.push(LogLevel::Verbose, message);
        }
    }

    /// Records a non-fatal problem.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(step = %self.step, run_id = %self.run_id, "{message}");
        self.push(LogLevel::Warn, message);
    }

    /// Records a failure.
    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!(step = %self.step, run_id = %self.run_id, "{message}");
        self.push(LogLevel::Error, message);
    }

    fn push(&self, level: LogLevel, message: String) {
        self.lines.write().push(LogLine {
            timestamp: Utc::now(),
            level,
            message,
        });
    }

    /// A copy of every recorded line.
    #[must_use]
    pub fn entries(&self) -> Vec<LogLine> {
        self.lines.read().clone()
    }

    /// Recorded messages, without timestamps.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.lines.read().iter().map(|line| line.message.clone()).collect()
    }

    /// Recorded lines rendered for display.
    #[must_use]
    pub fn rendered(&self) -> Vec<String> {
        self.lines.read().iter().map(ToString::to_string).collect()
    }

    /// Returns true if any recorded message contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.read().iter().any(|line| line.message.contains(needle))
    }

    /// Number of recorded lines at `level`.
    #[must_use]
    pub fn count(&self, level: LogLevel) -> usize {
        self.lines.read().iter().filter(|line| line.level == level).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_lines_gated() {
        let quiet = StepLog::new("deploy", false);
        quiet.verbose("polling");
        quiet.info("started");
        assert_eq!(quiet.messages(), vec!["started".to_string()]);

        let chatty = StepLog::new("deploy", true);
        chatty.verbose("polling");
        assert!(chatty.contains("polling"));
        assert_eq!(chatty.count(LogLevel::Verbose), 1);
    }

    #[test]
    fn test_failures_always_recorded() {
        let log = StepLog::new("build", false);
        log.warn("annotation skipped");
        log.error("build app-3 ended in phase Failed");
        assert_eq!(log.count(LogLevel::Warn), 1);
        assert_eq!(log.count(LogLevel::Error), 1);
    }

    #[test]
    fn test_rendered_format() {
        let log = StepLog::new("scale", false);
        log.info("target=3");
        let rendered = log.rendered();
        assert_eq!(rendered.len(), 1);
        assert!(rendered[0].ends_with("[INFO] target=3"));
    }

    #[test]
    fn test_run_ids_differ() {
        assert_ne!(StepLog::new("a", false).run_id(), StepLog::new("a", false).run_id());
    }
}
