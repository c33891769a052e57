//! Wall-clock deadlines for polling loops.
//!
//! A [`Deadline`] bounds every waiter. An attached [`CancellationToken`]
//! counts as an immediate deadline, and wakes a sleeping waiter so it can
//! re-poll and notice.

use super::CancellationToken;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A point in time after which a waiter must stop polling.
#[derive(Debug, Clone)]
pub struct Deadline {
    started: Instant,
    expires_at: Instant,
    token: Option<Arc<CancellationToken>>,
}

impl Deadline {
    /// Creates a deadline `budget` from now.
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            expires_at: started + budget,
            token: None,
        }
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_token(mut self, token: Arc<CancellationToken>) -> Self {
        self.token = Some(token);
        self
    }

    /// Starts a new deadline `budget` from now that shares this one's token.
    ///
    /// The child never outlives its parent: it expires at whichever comes
    /// first, `budget` from now or the parent's own expiry.
    #[must_use]
    pub fn sub_deadline(&self, budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            expires_at: (started + budget).min(self.expires_at),
            token: self.token.clone(),
        }
    }

    /// Returns true if the attached token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(|token| token.is_cancelled())
    }

    /// The cancellation reason, if cancelled.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<String> {
        self.token.as_ref().and_then(|token| token.reason())
    }

    /// Returns true once the deadline has passed or the token fired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_cancelled() || Instant::now() >= self.expires_at
    }

    /// Time left before expiry; zero when expired or cancelled.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        if self.is_cancelled() {
            return Duration::ZERO;
        }
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// The full budget this deadline was created with.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.expires_at.saturating_duration_since(self.started)
    }

    /// Time since the deadline was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Milliseconds since the deadline was created.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Sleeps for one tick, never past the deadline.
    ///
    /// Returns early, without error, if the token is cancelled mid-sleep.
    pub async fn sleep(&self, tick: Duration) {
        let nap = tick.min(self.remaining());
        if nap.is_zero() {
            return;
        }
        match &self.token {
            Some(token) => {
                tokio::select! {
                    () = tokio::time::sleep(nap) => {}
                    () = token.cancelled() => {}
                }
            }
            None => tokio::time::sleep(nap).await,
        }
    }
}
