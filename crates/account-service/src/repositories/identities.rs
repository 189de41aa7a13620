//! Identity record storage.
//!
//! Uniqueness (one local identity per account, one identity per provider per
//! account, one owner per email or provider subject) is enforced here by
//! storage constraints, not by the orchestrator.

use crate::errors::AccountError;
use crate::models::{
    AccountId, IdentityKey, LocalIdentity, NewIdentity, Provider, ProviderIdentity,
};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// Storage for local and provider-bound identities.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Bind `identity` to `account_id`. An existing identity is a `Conflict`.
    async fn enroll(&self, account_id: AccountId, identity: &NewIdentity)
        -> Result<(), AccountError>;

    /// Remove the identity with `key` if it belongs to `account_id`.
    async fn remove(&self, account_id: AccountId, key: &IdentityKey) -> Result<(), AccountError>;

    /// Remove every identity of `account_id`. Returns how many were removed.
    async fn remove_all(&self, account_id: AccountId) -> Result<u64, AccountError>;

    async fn find_local(&self, email: &str) -> Result<Option<LocalIdentity>, AccountError>;

    async fn find_provider(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<ProviderIdentity>, AccountError>;

    /// Mark every identity of `account_id` with `email` verified.
    /// Returns whether any identity matched.
    async fn mark_verified(&self, account_id: AccountId, email: &str)
        -> Result<bool, AccountError>;
}

#[derive(sqlx::FromRow)]
struct LocalIdentityRow {
    account_id: Uuid,
    email: String,
    password_hash: String,
    is_active: bool,
    is_verified: bool,
}

#[derive(sqlx::FromRow)]
struct ProviderIdentityRow {
    account_id: Uuid,
    provider_subject: String,
    email: String,
    is_verified: bool,
}

/// Postgres-backed [`IdentityStore`].
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn enroll_error(e: &sqlx::Error) -> AccountError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => {
            AccountError::Conflict("identity already exists".to_string())
        }
        _ => AccountError::InternalFailure(format!("Failed to enroll identity: {e}")),
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    #[instrument(skip_all)]
    async fn enroll(
        &self,
        account_id: AccountId,
        identity: &NewIdentity,
    ) -> Result<(), AccountError> {
        match identity {
            NewIdentity::Local {
                email,
                password_hash,
            } => {
                sqlx::query(
                    r#"
                    INSERT INTO local_identities (account_id, email, password_hash)
                    VALUES ($1, $2, $3)
                    "#,
                )
                .bind(account_id.as_uuid())
                .bind(email)
                .bind(password_hash)
                .execute(&self.pool)
                .await
                .map_err(|e| enroll_error(&e))?;
            }
            NewIdentity::Provider(profile) => {
                sqlx::query(
                    r#"
                    INSERT INTO provider_identities
                        (account_id, provider, provider_subject, email, is_verified)
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(account_id.as_uuid())
                .bind(profile.provider.as_str())
                .bind(&profile.subject)
                .bind(&profile.email)
                .bind(profile.email_verified)
                .execute(&self.pool)
                .await
                .map_err(|e| enroll_error(&e))?;
            }
        }

        Ok(())
    }

    #[instrument(skip_all)]
    async fn remove(&self, account_id: AccountId, key: &IdentityKey) -> Result<(), AccountError> {
        let query = match key {
            IdentityKey::Local { email } => sqlx::query(
                r#"
                DELETE FROM local_identities
                WHERE account_id = $1 AND email = $2
                "#,
            )
            .bind(account_id.as_uuid())
            .bind(email),
            IdentityKey::Provider { provider, subject } => sqlx::query(
                r#"
                DELETE FROM provider_identities
                WHERE account_id = $1 AND provider = $2 AND provider_subject = $3
                "#,
            )
            .bind(account_id.as_uuid())
            .bind(provider.as_str())
            .bind(subject),
        };

        query
            .execute(&self.pool)
            .await
            .map_err(|e| AccountError::InternalFailure(format!("Failed to remove identity: {e}")))?;

        Ok(())
    }

    #[instrument(skip_all)]
    async fn remove_all(&self, account_id: AccountId) -> Result<u64, AccountError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AccountError::InternalFailure(format!("Failed to begin transaction: {e}"))
        })?;

        let local = sqlx::query("DELETE FROM local_identities WHERE account_id = $1")
            .bind(account_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AccountError::InternalFailure(format!("Failed to remove local identity: {e}"))
            })?;

        let provider = sqlx::query("DELETE FROM provider_identities WHERE account_id = $1")
            .bind(account_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AccountError::InternalFailure(format!("Failed to remove provider identities: {e}"))
            })?;

        tx.commit().await.map_err(|e| {
            AccountError::InternalFailure(format!("Failed to commit transaction: {e}"))
        })?;

        Ok(local.rows_affected() + provider.rows_affected())
    }

    #[instrument(skip_all)]
    async fn find_local(&self, email: &str) -> Result<Option<LocalIdentity>, AccountError> {
        let row = sqlx::query_as::<_, LocalIdentityRow>(
            r#"
            SELECT account_id, email, password_hash, is_active, is_verified
            FROM local_identities
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AccountError::InternalFailure(format!("Failed to fetch local identity: {e}"))
        })?;

        Ok(row.map(|r| LocalIdentity {
            account_id: AccountId::from_uuid(r.account_id),
            email: r.email,
            password_hash: r.password_hash,
            is_active: r.is_active,
            is_verified: r.is_verified,
        }))
    }

    #[instrument(skip_all, fields(provider = provider.as_str()))]
    async fn find_provider(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<ProviderIdentity>, AccountError> {
        let row = sqlx::query_as::<_, ProviderIdentityRow>(
            r#"
            SELECT account_id, provider_subject, email, is_verified
            FROM provider_identities
            WHERE provider = $1 AND provider_subject = $2
            "#,
        )
        .bind(provider.as_str())
        .bind(subject)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AccountError::InternalFailure(format!("Failed to fetch provider identity: {e}"))
        })?;

        Ok(row.map(|r| ProviderIdentity {
            account_id: AccountId::from_uuid(r.account_id),
            provider,
            subject: r.provider_subject,
            email: r.email,
            is_verified: r.is_verified,
        }))
    }

    #[instrument(skip_all)]
    async fn mark_verified(
        &self,
        account_id: AccountId,
        email: &str,
    ) -> Result<bool, AccountError> {
        let (updated,): (i64,) = sqlx::query_as(
            r#"
            WITH local AS (
                UPDATE local_identities
                SET is_verified = TRUE, updated_at = NOW()
                WHERE account_id = $1 AND email = $2
                RETURNING 1
            ),
            provider AS (
                UPDATE provider_identities
                SET is_verified = TRUE, updated_at = NOW()
                WHERE account_id = $1 AND email = $2
                RETURNING 1
            )
            SELECT (SELECT COUNT(*) FROM local) + (SELECT COUNT(*) FROM provider)
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AccountError::InternalFailure(format!("Failed to mark identity verified: {e}"))
        })?;

        Ok(updated > 0)
    }
}

/// In-memory identity store for tests.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    #[derive(Default)]
    struct Inner {
        local: HashMap<String, LocalIdentity>,
        provider: HashMap<(Provider, String), ProviderIdentity>,
    }

    /// In-memory [`IdentityStore`] enforcing the same uniqueness rules as the
    /// database schema.
    #[derive(Clone, Default)]
    pub struct InMemoryIdentityStore {
        inner: Arc<Mutex<Inner>>,
        fail_enroll: Arc<AtomicBool>,
        fail_remove: Arc<AtomicBool>,
        enroll_delay: Arc<Mutex<Option<Duration>>>,
    }

    impl InMemoryIdentityStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fail_enroll(&self, fail: bool) {
            self.fail_enroll.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_remove(&self, fail: bool) {
            self.fail_remove.store(fail, Ordering::SeqCst);
        }

        /// Delay enrollments; the record is written after the delay.
        pub fn set_enroll_delay(&self, delay: Option<Duration>) {
            *self
                .enroll_delay
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = delay;
        }

        /// Identities bound to `account_id`.
        #[must_use]
        pub fn count_for(&self, account_id: AccountId) -> usize {
            let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner
                .local
                .values()
                .filter(|i| i.account_id == account_id)
                .count()
                + inner
                    .provider
                    .values()
                    .filter(|i| i.account_id == account_id)
                    .count()
        }

        #[must_use]
        pub fn len(&self) -> usize {
            let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.local.len() + inner.provider.len()
        }

        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// Seed a local identity directly.
        pub fn put_local(&self, identity: LocalIdentity) {
            self.inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .local
                .insert(identity.email.clone(), identity);
        }

        /// Flip the active flag of a local identity.
        pub fn set_local_active(&self, email: &str, active: bool) {
            if let Some(identity) = self
                .inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .local
                .get_mut(email)
            {
                identity.is_active = active;
            }
        }

        #[must_use]
        pub fn local(&self, email: &str) -> Option<LocalIdentity> {
            self.inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .local
                .get(email)
                .cloned()
        }
    }

    #[async_trait]
    impl IdentityStore for InMemoryIdentityStore {
        async fn enroll(
            &self,
            account_id: AccountId,
            identity: &NewIdentity,
        ) -> Result<(), AccountError> {
            let delay = *self
                .enroll_delay
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_enroll.load(Ordering::SeqCst) {
                return Err(AccountError::InternalFailure(
                    "mock identity store unavailable".into(),
                ));
            }

            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            match identity {
                NewIdentity::Local {
                    email,
                    password_hash,
                } => {
                    let taken = inner.local.contains_key(email)
                        || inner.local.values().any(|i| i.account_id == account_id);
                    if taken {
                        return Err(AccountError::Conflict("identity already exists".into()));
                    }
                    inner.local.insert(
                        email.clone(),
                        LocalIdentity {
                            account_id,
                            email: email.clone(),
                            password_hash: password_hash.clone(),
                            is_active: true,
                            is_verified: false,
                        },
                    );
                }
                NewIdentity::Provider(profile) => {
                    let key = (profile.provider, profile.subject.clone());
                    let taken = inner.provider.contains_key(&key)
                        || inner
                            .provider
                            .values()
                            .any(|i| i.account_id == account_id && i.provider == profile.provider);
                    if taken {
                        return Err(AccountError::Conflict("identity already exists".into()));
                    }
                    inner.provider.insert(
                        key,
                        ProviderIdentity {
                            account_id,
                            provider: profile.provider,
                            subject: profile.subject.clone(),
                            email: profile.email.clone(),
                            is_verified: profile.email_verified,
                        },
                    );
                }
            }
            Ok(())
        }

        async fn remove(
            &self,
            account_id: AccountId,
            key: &IdentityKey,
        ) -> Result<(), AccountError> {
            if self.fail_remove.load(Ordering::SeqCst) {
                return Err(AccountError::InternalFailure(
                    "mock identity store unavailable".into(),
                ));
            }
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            match key {
                IdentityKey::Local { email } => {
                    if inner
                        .local
                        .get(email)
                        .is_some_and(|i| i.account_id == account_id)
                    {
                        inner.local.remove(email);
                    }
                }
                IdentityKey::Provider { provider, subject } => {
                    let key = (*provider, subject.clone());
                    if inner
                        .provider
                        .get(&key)
                        .is_some_and(|i| i.account_id == account_id)
                    {
                        inner.provider.remove(&key);
                    }
                }
            }
            Ok(())
        }

        async fn remove_all(&self, account_id: AccountId) -> Result<u64, AccountError> {
            if self.fail_remove.load(Ordering::SeqCst) {
                return Err(AccountError::InternalFailure(
                    "mock identity store unavailable".into(),
                ));
            }
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let before = inner.local.len() + inner.provider.len();
            inner.local.retain(|_, i| i.account_id != account_id);
            inner.provider.retain(|_, i| i.account_id != account_id);
            let after = inner.local.len() + inner.provider.len();
            Ok((before - after) as u64)
        }

        async fn find_local(&self, email: &str) -> Result<Option<LocalIdentity>, AccountError> {
            Ok(self.local(email))
        }

        async fn find_provider(
            &self,
            provider: Provider,
            subject: &str,
        ) -> Result<Option<ProviderIdentity>, AccountError> {
            Ok(self
                .inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .provider
                .get(&(provider, subject.to_string()))
                .cloned())
        }

        async fn mark_verified(
            &self,
            account_id: AccountId,
            email: &str,
        ) -> Result<bool, AccountError> {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let mut matched = false;
            for identity in inner.local.values_mut() {
                if identity.account_id == account_id && identity.email == email {
                    identity.is_verified = true;
                    matched = true;
                }
            }
            for identity in inner.provider.values_mut() {
                if identity.account_id == account_id && identity.email == email {
                    identity.is_verified = true;
                    matched = true;
                }
            }
            Ok(matched)
        }
    }

}
