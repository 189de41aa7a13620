//! Lifecycle event emission.
//!
//! Events are appended to a Redis stream. Consumers compare the `sync_code`
//! against their cached copy of the account to detect staleness.

use crate::errors::AccountError;
use crate::models::LifecycleEvent;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use tracing::{debug, error, instrument, warn};

/// Publishes lifecycle events to downstream consumers.
#[async_trait]
pub trait EventNotifier: Send + Sync {
    async fn emit(&self, event: &LifecycleEvent) -> Result<(), AccountError>;
}

/// [`EventNotifier`] appending to a Redis stream with `XADD`.
#[derive(Clone)]
pub struct RedisEventNotifier {
    connection: MultiplexedConnection,
    stream: String,
}

impl RedisEventNotifier {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::InternalFailure` if the connection fails.
    pub async fn connect(redis_url: &str, stream: &str) -> Result<Self, AccountError> {
        let client = Client::open(redis_url).map_err(|e| {
            // Note: Do NOT log redis_url as it may contain credentials
            error!(target: "account.events", error = %e, "Failed to open Redis client");
            AccountError::InternalFailure(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "account.events", error = %e, "Failed to connect to Redis");
                AccountError::InternalFailure(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self::from_connection(connection, stream))
    }

    #[must_use]
    pub fn from_connection(connection: MultiplexedConnection, stream: &str) -> Self {
        Self {
            connection,
            stream: stream.to_string(),
        }
    }
}

#[async_trait]
impl EventNotifier for RedisEventNotifier {
    #[instrument(skip_all, fields(kind = event.kind.as_str()))]
    async fn emit(&self, event: &LifecycleEvent) -> Result<(), AccountError> {
        let mut conn = self.connection.clone();

        let entry_id: String = redis::cmd("XADD")
            .arg(&self.stream)
            .arg("*")
            .arg("kind")
            .arg(event.kind.as_str())
            .arg("account_id")
            .arg(event.account_id.to_string())
            .arg("sync_code")
            .arg(event.sync_code.as_str())
            .arg("occurred_at")
            .arg(event.occurred_at.timestamp())
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(target: "account.events", error = %e, "Failed to emit lifecycle event");
                AccountError::InternalFailure(format!("Failed to emit lifecycle event: {e}"))
            })?;

        debug!(
            target: "account.events",
            kind = event.kind.as_str(),
            entry_id = %entry_id,
            "Lifecycle event emitted"
        );

        Ok(())
    }
}

/// Recording notifier for tests.
pub mod mock {
    use super::*;
    use crate::models::{AccountId, LifecycleEventKind};
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex, PoisonError};

    #[derive(Clone, Default)]
    pub struct RecordingEventNotifier {
        events: Arc<Mutex<Vec<LifecycleEvent>>>,
        failing_kinds: Arc<Mutex<HashSet<LifecycleEventKind>>>,
    }

    impl RecordingEventNotifier {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail every emission of `kind` until cleared.
        pub fn fail_kind(&self, kind: LifecycleEventKind, fail: bool) {
            let mut kinds = self
                .failing_kinds
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if fail {
                kinds.insert(kind);
            } else {
                kinds.remove(&kind);
            }
        }

        #[must_use]
        pub fn events(&self) -> Vec<LifecycleEvent> {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Emitted events of `kind` for `account_id`.
        #[must_use]
        pub fn count(&self, kind: LifecycleEventKind, account_id: AccountId) -> usize {
            self.events()
                .iter()
                .filter(|e| e.kind == kind && e.account_id == account_id)
                .count()
        }
    }

    #[async_trait]
    impl EventNotifier for RecordingEventNotifier {
        async fn emit(&self, event: &LifecycleEvent) -> Result<(), AccountError> {
            let failing = self
                .failing_kinds
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&event.kind);
            if failing {
                return Err(AccountError::InternalFailure(
                    "mock event stream unavailable".into(),
                ));
            }
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event.clone());
            Ok(())
        }
    }
}
