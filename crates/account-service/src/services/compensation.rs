//! Rollback bookkeeping for multi-step operations.
//!
//! Each step that leaves a side effect behind registers a [`Reversible`]
//! describing how to undo it. If the operation fails, [`CompensationRegistry::trigger`]
//! runs every registered reversal, most recent first.
//!
//! Reversals are best-effort. A failing or hanging reversal is logged and
//! counted, but it never replaces the error that caused compensation, and it
//! never stops the remaining reversals from running.

use crate::errors::AccountError;
use crate::observability::metrics::record_compensation_action;
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};

/// An undo action for one completed step.
#[async_trait]
pub trait Reversible: Send + Sync {
    /// Bounded label for logs and metrics.
    fn name(&self) -> &'static str;

    async fn undo(&self) -> Result<(), AccountError>;
}

/// Outcome of a [`CompensationRegistry::trigger`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompensationReport {
    pub attempted: usize,
    /// Reversals that returned an error or timed out.
    pub failed: usize,
}

impl CompensationReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Call-scoped list of reversals.
///
/// `register` takes `&self`, so concurrent fan-out branches can share one
/// registry by reference.
pub struct CompensationRegistry {
    actions: Mutex<Vec<Box<dyn Reversible>>>,
    action_timeout: Duration,
}

impl CompensationRegistry {
    /// `action_timeout` bounds each reversal independently of the caller's
    /// deadline, which may already have passed when compensation starts.
    #[must_use]
    pub fn new(action_timeout: Duration) -> Self {
        Self {
            actions: Mutex::new(Vec::new()),
            action_timeout,
        }
    }

    pub fn register(&self, action: Box<dyn Reversible>) {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every registered reversal in reverse registration order.
    ///
    /// The list is drained, so a second call runs nothing.
    pub async fn trigger(&self) -> CompensationReport {
        let actions: Vec<Box<dyn Reversible>> = std::mem::take(
            &mut *self
                .actions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let mut report = CompensationReport::default();

        for action in actions.into_iter().rev() {
            report.attempted += 1;
            let name = action.name();

            match tokio::time::timeout(self.action_timeout, action.undo()).await {
                Ok(Ok(())) => {
                    info!(target: "account.compensation", action = name, "Reversal applied");
                    record_compensation_action(name, "success");
                }
                Ok(Err(e)) => {
                    report.failed += 1;
                    error!(
                        target: "account.compensation",
                        action = name,
                        error = %e,
                        "Reversal failed"
                    );
                    record_compensation_action(name, "error");
                }
                Err(_) => {
                    report.failed += 1;
                    warn!(
                        target: "account.compensation",
                        action = name,
                        timeout_ms = self.action_timeout.as_millis() as u64,
                        "Reversal timed out"
                    );
                    record_compensation_action(name, "timeout");
                }
            }
        }

        report
    }
}
