//! Account repository.
//!
//! Lifecycle mutations are expressed as a single `UPDATE` so a repeated
//! transition converges on the same row state with a new sync code.

use crate::errors::AccountError;
use crate::models::{Account, AccountChange, AccountId, SyncCode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// Storage for account rows.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a new account. A duplicate id is a `Conflict`.
    async fn insert(&self, account: &Account) -> Result<(), AccountError>;

    async fn get(&self, id: AccountId) -> Result<Option<Account>, AccountError>;

    /// Apply a lifecycle transition and return the updated row.
    async fn apply(&self, id: AccountId, change: &AccountChange) -> Result<Account, AccountError>;

    /// Hard-delete the row. Returns whether a row existed.
    async fn delete(&self, id: AccountId) -> Result<bool, AccountError>;

    /// Archived accounts whose retention deadline is at or before `now`.
    async fn list_purgeable(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<AccountId>, AccountError>;
}

/// Account model (maps to accounts table)
#[derive(Debug, Clone, sqlx::FromRow)]
struct AccountRow {
    account_id: Uuid,
    sync_code: String,
    is_archived: bool,
    archived_at: Option<DateTime<Utc>>,
    delete_after: Option<DateTime<Utc>>,
    is_blocked: bool,
    created_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: AccountId::from_uuid(row.account_id),
            sync_code: SyncCode::new(row.sync_code),
            is_archived: row.is_archived,
            archived_at: row.archived_at,
            delete_after: row.delete_after,
            is_blocked: row.is_blocked,
            created_at: row.created_at,
        }
    }
}

/// Postgres-backed [`AccountRepository`].
#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    #[instrument(skip_all)]
    async fn insert(&self, account: &Account) -> Result<(), AccountError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (account_id, sync_code, is_archived, archived_at,
                                  delete_after, is_blocked, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(account.sync_code.as_str())
        .bind(account.is_archived)
        .bind(account.archived_at)
        .bind(account.delete_after)
        .bind(account.is_blocked)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                AccountError::Conflict("account id already exists".to_string())
            }
            _ => AccountError::InternalFailure(format!("Failed to insert account: {e}")),
        })?;

        Ok(())
    }

    #[instrument(skip_all)]
    async fn get(&self, id: AccountId) -> Result<Option<Account>, AccountError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT
                account_id, sync_code, is_archived, archived_at,
                delete_after, is_blocked, created_at
            FROM accounts
            WHERE account_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AccountError::InternalFailure(format!("Failed to fetch account: {e}")))?;

        Ok(row.map(Account::from))
    }

    #[instrument(skip_all, fields(transition = change.transition.as_str()))]
    async fn apply(&self, id: AccountId, change: &AccountChange) -> Result<Account, AccountError> {
        let retention_secs = i64::try_from(change.retention.as_secs()).unwrap_or(i64::MAX);

        // SET expressions read the pre-update row, so archived_at on the
        // right-hand side is the previous value.
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            UPDATE accounts
            SET
                sync_code = $2,
                is_archived = CASE $3::text
                    WHEN 'archive' THEN TRUE
                    WHEN 'restore' THEN FALSE
                    ELSE is_archived END,
                archived_at = CASE $3::text
                    WHEN 'archive' THEN COALESCE(archived_at, $4)
                    WHEN 'restore' THEN NULL
                    ELSE archived_at END,
                delete_after = CASE $3::text
                    WHEN 'archive' THEN COALESCE(archived_at, $4) + ($5::bigint * INTERVAL '1 second')
                    WHEN 'restore' THEN NULL
                    ELSE delete_after END,
                is_blocked = CASE $3::text
                    WHEN 'block' THEN TRUE
                    WHEN 'unblock' THEN FALSE
                    ELSE is_blocked END,
                updated_at = NOW()
            WHERE account_id = $1
            RETURNING
                account_id, sync_code, is_archived, archived_at,
                delete_after, is_blocked, created_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(change.sync_code.as_str())
        .bind(change.transition.as_str())
        .bind(change.at)
        .bind(retention_secs)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AccountError::InternalFailure(format!("Failed to update account: {e}")))?;

        row.map(Account::from)
            .ok_or_else(|| AccountError::NotFound("account does not exist".to_string()))
    }

    #[instrument(skip_all)]
    async fn delete(&self, id: AccountId) -> Result<bool, AccountError> {
        let result = sqlx::query(
            r#"
            DELETE FROM accounts
            WHERE account_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| AccountError::InternalFailure(format!("Failed to delete account: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip_all)]
    async fn list_purgeable(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<AccountId>, AccountError> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT account_id
            FROM accounts
            WHERE is_archived AND delete_after <= $1
            ORDER BY delete_after
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AccountError::InternalFailure(format!("Failed to list purgeable accounts: {e}"))
        })?;

        Ok(ids.into_iter().map(|(id,)| AccountId::from_uuid(id)).collect())
    }
}

/// In-memory repository for tests.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    /// In-memory [`AccountRepository`] with fault injection.
    #[derive(Clone, Default)]
    pub struct InMemoryAccountRepository {
        rows: Arc<Mutex<HashMap<AccountId, Account>>>,
        fail_insert: Arc<AtomicBool>,
        fail_apply: Arc<AtomicBool>,
        fail_delete: Arc<AtomicBool>,
        insert_delay: Arc<Mutex<Option<Duration>>>,
        insert_calls: Arc<AtomicUsize>,
    }

    impl InMemoryAccountRepository {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fail_insert(&self, fail: bool) {
            self.fail_insert.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_apply(&self, fail: bool) {
            self.fail_apply.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_delete(&self, fail: bool) {
            self.fail_delete.store(fail, Ordering::SeqCst);
        }

        /// Delay inserts; the row is written after the delay.
        pub fn set_insert_delay(&self, delay: Option<Duration>) {
            *self
                .insert_delay
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = delay;
        }

        #[must_use]
        pub fn insert_calls(&self) -> usize {
            self.insert_calls.load(Ordering::SeqCst)
        }

        #[must_use]
        pub fn snapshot(&self, id: AccountId) -> Option<Account> {
            self.rows
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&id)
                .cloned()
        }

        #[must_use]
        pub fn len(&self) -> usize {
            self.rows
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }

        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// Seed a row directly.
        pub fn put(&self, account: Account) {
            self.rows
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(account.id, account);
        }
    }

    #[async_trait]
    impl AccountRepository for InMemoryAccountRepository {
        async fn insert(&self, account: &Account) -> Result<(), AccountError> {
            self.insert_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self
                .insert_delay
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_insert.load(Ordering::SeqCst) {
                return Err(AccountError::InternalFailure(
                    "mock database unavailable".into(),
                ));
            }
            let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
            if rows.contains_key(&account.id) {
                return Err(AccountError::Conflict("account id already exists".into()));
            }
            rows.insert(account.id, account.clone());
            Ok(())
        }

        async fn get(&self, id: AccountId) -> Result<Option<Account>, AccountError> {
            Ok(self.snapshot(id))
        }

        async fn apply(
            &self,
            id: AccountId,
            change: &AccountChange,
        ) -> Result<Account, AccountError> {
            if self.fail_apply.load(Ordering::SeqCst) {
                return Err(AccountError::InternalFailure(
                    "mock database unavailable".into(),
                ));
            }
            let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
            let current = rows
                .get(&id)
                .ok_or_else(|| AccountError::NotFound("account does not exist".into()))?;
            let next = current.apply(change);
            rows.insert(id, next.clone());
            Ok(next)
        }

        async fn delete(&self, id: AccountId) -> Result<bool, AccountError> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(AccountError::InternalFailure(
                    "mock database unavailable".into(),
                ));
            }
            Ok(self
                .rows
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id)
                .is_some())
        }

        async fn list_purgeable(
            &self,
            now: DateTime<Utc>,
            limit: u32,
        ) -> Result<Vec<AccountId>, AccountError> {
            let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
            let mut purgeable: Vec<&Account> =
                rows.values().filter(|a| a.is_purgeable(now)).collect();
            purgeable.sort_by_key(|a| a.delete_after);
            Ok(purgeable
                .into_iter()
                .take(limit as usize)
                .map(|a| a.id)
                .collect())
        }
    }
}
