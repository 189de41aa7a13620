//! Profile service client.
//!
//! Every account owns exactly one profile, created during account creation
//! and removed again if the creation is rolled back. Both calls are
//! idempotent at the wire: creating an existing profile and deleting a
//! missing one are successes.

use crate::errors::AccountError;
use crate::models::AccountId;
use crate::observability::hash_for_correlation;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, instrument, warn};
use uuid::Uuid;

/// Default timeout for profile requests.
const PROFILE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const PROFILE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait ProfileClient: Send + Sync {
    async fn create_profile(&self, account_id: AccountId) -> Result<(), AccountError>;

    async fn delete_profile(&self, account_id: AccountId) -> Result<(), AccountError>;
}

#[derive(Debug, Serialize)]
struct CreateProfileRequest {
    account_id: Uuid,
}

/// HTTP client for the profile service.
#[derive(Clone)]
pub struct HttpProfileClient {
    client: Client,
    base_url: String,
}

impl HttpProfileClient {
    /// # Errors
    ///
    /// Returns `InternalFailure` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, AccountError> {
        let client = Client::builder()
            .timeout(PROFILE_REQUEST_TIMEOUT)
            .connect_timeout(PROFILE_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                error!(target: "account.profile_client", error = %e, "Failed to build HTTP client");
                AccountError::InternalFailure("Failed to build profile client".to_string())
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn unavailable(e: &reqwest::Error) -> AccountError {
        warn!(target: "account.profile_client", error = %e, "Profile request failed");
        AccountError::InternalFailure("Profile service is unavailable".to_string())
    }

    fn status_error(status: StatusCode) -> AccountError {
        warn!(target: "account.profile_client", status = %status, "Unexpected profile service response");
        if status == StatusCode::BAD_REQUEST {
            AccountError::InvalidInput("Profile request rejected".to_string())
        } else {
            AccountError::InternalFailure("Profile service is unavailable".to_string())
        }
    }
}

#[async_trait]
impl ProfileClient for HttpProfileClient {
    #[instrument(skip_all, fields(account = %hash_for_correlation(&account_id.to_string())))]
    async fn create_profile(&self, account_id: AccountId) -> Result<(), AccountError> {
        let url = format!("{}/profiles", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&CreateProfileRequest {
                account_id: account_id.as_uuid(),
            })
            .send()
            .await
            .map_err(|e| Self::unavailable(&e))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::CONFLICT {
            Ok(())
        } else {
            Err(Self::status_error(status))
        }
    }

    #[instrument(skip_all, fields(account = %hash_for_correlation(&account_id.to_string())))]
    async fn delete_profile(&self, account_id: AccountId) -> Result<(), AccountError> {
        let url = format!("{}/profiles/{}", self.base_url, account_id);

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| Self::unavailable(&e))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(Self::status_error(status))
        }
    }
}

/// Fake profile service for tests.
pub mod mock {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};

    #[derive(Clone, Default)]
    pub struct MockProfileClient {
        profiles: Arc<Mutex<HashSet<AccountId>>>,
        fail_create: Arc<AtomicBool>,
        fail_delete: Arc<AtomicBool>,
        create_delay: Arc<Mutex<Option<Duration>>>,
        create_calls: Arc<AtomicUsize>,
        delete_calls: Arc<AtomicUsize>,
    }

    impl MockProfileClient {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fail_create(&self, fail: bool) {
            self.fail_create.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_delete(&self, fail: bool) {
            self.fail_delete.store(fail, Ordering::SeqCst);
        }

        /// Delay creates; the profile is recorded after the delay.
        pub fn set_create_delay(&self, delay: Option<Duration>) {
            *self
                .create_delay
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = delay;
        }

        #[must_use]
        pub fn exists(&self, account_id: AccountId) -> bool {
            self.profiles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&account_id)
        }

        #[must_use]
        pub fn len(&self) -> usize {
            self.profiles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }

        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        #[must_use]
        pub fn create_calls(&self) -> usize {
            self.create_calls.load(Ordering::SeqCst)
        }

        #[must_use]
        pub fn delete_calls(&self) -> usize {
            self.delete_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProfileClient for MockProfileClient {
        async fn create_profile(&self, account_id: AccountId) -> Result<(), AccountError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self
                .create_delay
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(AccountError::InternalFailure(
                    "Profile service is unavailable".into(),
                ));
            }
            self.profiles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(account_id);
            Ok(())
        }

        async fn delete_profile(&self, account_id: AccountId) -> Result<(), AccountError> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(AccountError::InternalFailure(
                    "Profile service is unavailable".into(),
                ));
            }
            self.profiles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&account_id);
            Ok(())
        }
    }
}
