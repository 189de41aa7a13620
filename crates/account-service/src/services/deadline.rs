//! Caller-supplied deadlines for collaborator calls.

use crate::errors::AccountError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Absolute instant by which an operation must finish.
///
/// Every collaborator call an orchestrator operation makes is raced against
/// the deadline of that operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    #[must_use]
    pub fn after(duration: Duration) -> Self {
        Self {
            at: Instant::now() + duration,
        }
    }

    #[must_use]
    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    #[must_use]
    pub fn instant(&self) -> Instant {
        self.at
    }

    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    #[must_use]
    pub fn is_elapsed(&self) -> bool {
        Instant::now() >= self.at
    }

    /// This deadline, or `max` from now if that comes first.
    #[must_use]
    pub fn capped(&self, max: Duration) -> Self {
        Self {
            at: self.at.min(Instant::now() + max),
        }
    }

    /// Poll `fut` until it completes or the deadline passes.
    ///
    /// Returns `None` on elapse. The future is dropped at that point, so any
    /// side effect it already started has an unknown outcome.
    pub async fn race<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::time::timeout_at(self.at, fut).await.ok()
    }

    /// Run one named step, mapping elapse to `InternalFailure`.
    pub async fn run<T, F>(&self, step: &str, fut: F) -> Result<T, AccountError>
    where
        F: Future<Output = Result<T, AccountError>>,
    {
        match self.race(fut).await {
            Some(result) => result,
            None => Err(Self::elapsed(step)),
        }
    }

    /// Error reported when `step` outlives its deadline.
    #[must_use]
    pub fn elapsed(step: &str) -> AccountError {
        warn!(target: "account.deadline", step = step, "Step exceeded its deadline");
        AccountError::InternalFailure(format!("{step} timed out"))
    }
}
