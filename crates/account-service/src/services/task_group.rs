//! Concurrent fan-out with a joined error.
//!
//! Branches are polled concurrently inside the calling task, so they may
//! borrow from it. [`TaskGroup::join`] waits for every branch, including the
//! ones still running after another has failed, because a late success may
//! still register a reversal that compensation has to run.

use crate::errors::AccountError;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use tracing::warn;

type Branch<'a> = BoxFuture<'a, (&'static str, Result<(), AccountError>)>;

#[derive(Default)]
pub struct TaskGroup<'a> {
    branches: FuturesUnordered<Branch<'a>>,
}

impl<'a> TaskGroup<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            branches: FuturesUnordered::new(),
        }
    }

    /// Add a named branch. Nothing runs until [`TaskGroup::join`].
    pub fn spawn<F>(&mut self, name: &'static str, fut: F)
    where
        F: Future<Output = Result<(), AccountError>> + Send + 'a,
    {
        self.branches
            .push(Box::pin(async move { (name, fut.await) }));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Run every branch to completion.
    ///
    /// Returns the first error in completion order, wrapped with its branch
    /// name. Later errors are logged.
    pub async fn join(mut self) -> Result<(), AccountError> {
        let mut first_error: Option<AccountError> = None;

        while let Some((name, result)) = self.branches.next().await {
            let Err(err) = result else {
                continue;
            };

            if first_error.is_some() {
                warn!(
                    target: "account.saga",
                    branch = name,
                    error = %err,
                    "Additional branch failure"
                );
            } else {
                first_error = Some(err.in_step(name));
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
