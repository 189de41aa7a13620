//! Single-use code exchange.
//!
//! A code is issued once identity has been verified and exchanged later for
//! session tokens, so long-lived tokens never travel through redirect URLs
//! or logs. Only a keyed hash of the code is stored.
//!
//! # Semantics
//!
//! - One live code per subject and namespace; issuing replaces the previous one
//! - Validation consumes the code on the first match and never again
//! - A wrong code does not consume the stored one
//! - Miss, expiry and mismatch are indistinguishable to the caller
//! - Cache failures are `InternalFailure`, never "invalid code"

use crate::crypto::{self, LoginCodeHasher};
use crate::errors::AccountError;
use crate::observability::hash_for_correlation;
use crate::observability::metrics::record_login_code;
use crate::redis::{CacheError, CodeCache};
use chrono::Utc;
use common::secret::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Namespace for codes exchanged for session tokens.
pub const LOGIN_NAMESPACE: &str = "login";

/// Namespace for codes embedded in email-verification tokens.
pub const EMAIL_NAMESPACE: &str = "email";

#[derive(Debug, Serialize, Deserialize)]
struct StoredCode {
    hash: String,
    issued_at: i64,
    expires_at: i64,
}

fn cache_failure(operation: &str, err: &CacheError) -> AccountError {
    record_login_code(operation, "cache_error");
    AccountError::InternalFailure(format!("login code store unavailable: {err}"))
}

/// Issues and consumes single-use codes bound to a subject.
///
/// Cheaply cloneable.
#[derive(Clone)]
pub struct CodeExchangeStore {
    cache: Arc<dyn CodeCache>,
    hasher: Arc<LoginCodeHasher>,
    namespace: &'static str,
    ttl: Duration,
}

impl CodeExchangeStore {
    #[must_use]
    pub fn new(
        cache: Arc<dyn CodeCache>,
        hasher: Arc<LoginCodeHasher>,
        namespace: &'static str,
        ttl: Duration,
    ) -> Self {
        Self {
            cache,
            hasher,
            namespace,
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn key(&self, subject: &str) -> String {
        format!("login_code:{}:{}", self.namespace, subject)
    }

    /// Issue a fresh code for `subject`, replacing any unconsumed one.
    ///
    /// The returned plaintext is never stored and cannot be recovered.
    #[instrument(skip_all, fields(namespace = self.namespace))]
    pub async fn issue_code(&self, subject: &str) -> Result<SecretString, AccountError> {
        let code = crypto::generate_login_code()?;
        let issued_at = Utc::now().timestamp();
        let ttl_secs = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);

        let entry = StoredCode {
            hash: self.hasher.hash(subject, code.expose_secret()),
            issued_at,
            expires_at: issued_at.saturating_add(ttl_secs),
        };
        let value = serde_json::to_string(&entry).map_err(|e| {
            AccountError::InternalFailure(format!("Failed to encode login code entry: {e}"))
        })?;

        self.cache
            .put(&self.key(subject), &value, self.ttl)
            .await
            .map_err(|e| cache_failure("issue", &e))?;

        debug!(
            target: "account.login_code",
            namespace = self.namespace,
            subject = %hash_for_correlation(subject),
            "Login code issued"
        );
        record_login_code("issue", "success");

        Ok(code)
    }

    /// Check `code` for `subject`, consuming it on match.
    ///
    /// Returns `Ok(false)` for a missing, expired, mismatched or already
    /// consumed code. Callers must not retry a `false`.
    #[instrument(skip_all, fields(namespace = self.namespace))]
    pub async fn validate_code(&self, subject: &str, code: &str) -> Result<bool, AccountError> {
        let key = self.key(subject);

        let Some(raw) = self
            .cache
            .get(&key)
            .await
            .map_err(|e| cache_failure("validate", &e))?
        else {
            return Ok(self.rejected(subject, "missing"));
        };

        let entry: StoredCode = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    target: "account.login_code",
                    namespace = self.namespace,
                    error = %e,
                    "Discarding unreadable login code entry"
                );
                return Ok(self.rejected(subject, "corrupt"));
            }
        };

        if entry.expires_at <= Utc::now().timestamp() {
            return Ok(self.rejected(subject, "expired"));
        }

        if !self.hasher.verify(subject, code, &entry.hash) {
            return Ok(self.rejected(subject, "mismatch"));
        }

        // Only the caller whose delete succeeds has consumed the code
        let consumed = self
            .cache
            .compare_and_delete(&key, &raw)
            .await
            .map_err(|e| cache_failure("validate", &e))?;

        if !consumed {
            return Ok(self.rejected(subject, "already_consumed"));
        }

        debug!(
            target: "account.login_code",
            namespace = self.namespace,
            subject = %hash_for_correlation(subject),
            "Login code consumed"
        );
        record_login_code("validate", "success");

        Ok(true)
    }

    /// Discard any live code for `subject`.
    #[instrument(skip_all, fields(namespace = self.namespace))]
    pub async fn revoke(&self, subject: &str) -> Result<(), AccountError> {
        self.cache
            .delete(&self.key(subject))
            .await
            .map_err(|e| cache_failure("revoke", &e))?;
        record_login_code("revoke", "success");
        Ok(())
    }

    fn rejected(&self, subject: &str, reason: &'static str) -> bool {
        debug!(
            target: "account.login_code",
            namespace = self.namespace,
            subject = %hash_for_correlation(subject),
            reason = reason,
            "Login code rejected"
        );
        record_login_code("validate", reason);
        false
    }
}
