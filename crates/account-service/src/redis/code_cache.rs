//! Shared keyed cache backing the code exchange store.
//!
//! # Key Patterns
//!
//! - `login_code:{namespace}:{subject}` - JSON entry with the code hash and expiry
//!
//! Keys for different subjects are independent, so no cross-key locking is needed.

use crate::redis::lua_scripts;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, instrument, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Keyed cache with per-entry TTL and atomic single-use consumption.
#[async_trait]
pub trait CodeCache: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Delete `key` only if it still holds `expected`. Returns whether it did.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Redis-backed [`CodeCache`].
///
/// Cheaply cloneable; the multiplexed connection is shared by all clones.
#[derive(Clone)]
pub struct RedisCodeCache {
    connection: MultiplexedConnection,
    compare_and_delete_script: Script,
}

impl RedisCodeCache {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Unavailable` if the connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url).map_err(|e| {
            // Note: Do NOT log redis_url as it may contain credentials
            error!(target: "account.redis", error = %e, "Failed to open Redis client");
            CacheError::Unavailable(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "account.redis", error = %e, "Failed to connect to Redis");
                CacheError::Unavailable(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self::from_connection(connection))
    }

    #[must_use]
    pub fn from_connection(connection: MultiplexedConnection) -> Self {
        Self {
            connection,
            compare_and_delete_script: Script::new(lua_scripts::COMPARE_AND_DELETE),
        }
    }
}

#[async_trait]
impl CodeCache for RedisCodeCache {
    #[instrument(skip_all)]
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let seconds = ttl.as_secs().max(1);

        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .map_err(|e| {
                warn!(target: "account.redis", error = %e, "Failed to store cache entry");
                CacheError::Unavailable(format!("Failed to store cache entry: {e}"))
            })
    }

    #[instrument(skip_all)]
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();

        conn.get(key).await.map_err(|e| {
            warn!(target: "account.redis", error = %e, "Failed to read cache entry");
            CacheError::Unavailable(format!("Failed to read cache entry: {e}"))
        })
    }

    #[instrument(skip_all)]
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection.clone();

        let deleted: i64 = self
            .compare_and_delete_script
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(target: "account.redis", error = %e, "Failed to consume cache entry");
                CacheError::Unavailable(format!("Failed to consume cache entry: {e}"))
            })?;

        Ok(deleted == 1)
    }

    #[instrument(skip_all)]
    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();

        conn.del::<_, ()>(key).await.map_err(|e| {
            warn!(target: "account.redis", error = %e, "Failed to delete cache entry");
            CacheError::Unavailable(format!("Failed to delete cache entry: {e}"))
        })
    }
}

/// In-memory cache for tests.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use tokio::time::Instant;

    /// In-memory [`CodeCache`] honoring TTLs against tokio's clock, so tests
    /// can expire entries with `tokio::time::advance`.
    #[derive(Clone, Default)]
    pub struct MemoryCodeCache {
        inner: Arc<Mutex<HashMap<String, (String, Instant)>>>,
        unavailable: Arc<AtomicBool>,
        delay: Arc<Mutex<Option<Duration>>>,
        call_count: Arc<AtomicUsize>,
    }

    impl MemoryCodeCache {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent call fail with `CacheError::Unavailable`.
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        /// Delay every subsequent call.
        pub fn set_delay(&self, delay: Option<Duration>) {
            *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
        }

        #[must_use]
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Live (unexpired) entries.
        #[must_use]
        pub fn len(&self) -> usize {
            let now = Instant::now();
            self.inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .values()
                .filter(|(_, expires)| *expires > now)
                .count()
        }

        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// Raw stored value, bypassing fault injection.
        #[must_use]
        pub fn raw(&self, key: &str) -> Option<String> {
            let now = Instant::now();
            self.inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(key)
                .filter(|(_, expires)| *expires > now)
                .map(|(value, _)| value.clone())
        }

        async fn enter(&self) -> Result<(), CacheError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(CacheError::Unavailable("mock cache unavailable".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CodeCache for MemoryCodeCache {
        async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
            self.enter().await?;
            self.inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.enter().await?;
            Ok(self.raw(key))
        }

        async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
            self.enter().await?;
            let now = Instant::now();
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let matches = inner
                .get(key)
                .is_some_and(|(value, expires)| *expires > now && value == expected);
            if matches {
                inner.remove(key);
            }
            Ok(matches)
        }

        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            self.enter().await?;
            self.inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(key);
            Ok(())
        }
    }

}
