//! Mail dispatch client.

use crate::errors::AccountError;
use crate::observability::hash_for_correlation;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, instrument, warn};

const MAIL_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const MAIL_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait MailDispatcher: Send + Sync {
    /// Deliver the email-verification token to `email`.
    async fn send_verification_mail(&self, email: &str, token: &str) -> Result<(), AccountError>;
}

#[derive(Serialize)]
struct VerificationMailRequest<'a> {
    email: &'a str,
    token: &'a str,
}

/// HTTP client for the mail service.
#[derive(Clone)]
pub struct HttpMailClient {
    client: Client,
    base_url: String,
}

impl HttpMailClient {
    /// # Errors
    ///
    /// Returns `InternalFailure` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, AccountError> {
        let client = Client::builder()
            .timeout(MAIL_REQUEST_TIMEOUT)
            .connect_timeout(MAIL_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                error!(target: "account.mail_client", error = %e, "Failed to build HTTP client");
                AccountError::InternalFailure("Failed to build mail client".to_string())
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MailDispatcher for HttpMailClient {
    #[instrument(skip_all, fields(recipient = %hash_for_correlation(email)))]
    async fn send_verification_mail(&self, email: &str, token: &str) -> Result<(), AccountError> {
        let url = format!("{}/messages/verification", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&VerificationMailRequest { email, token })
            .send()
            .await
            .map_err(|e| {
                warn!(target: "account.mail_client", error = %e, "Mail request failed");
                AccountError::InternalFailure("Mail service is unavailable".to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
            warn!(target: "account.mail_client", status = %status, "Mail service rejected recipient");
            Err(AccountError::InvalidInput(
                "Verification mail rejected".to_string(),
            ))
        } else {
            warn!(target: "account.mail_client", status = %status, "Unexpected mail service response");
            Err(AccountError::InternalFailure(
                "Mail service is unavailable".to_string(),
            ))
        }
    }
}

/// Fake mail service for tests.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};

    /// A captured verification mail.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentMail {
        pub email: String,
        pub token: String,
    }

    #[derive(Clone, Default)]
    pub struct MockMailDispatcher {
        sent: Arc<Mutex<Vec<SentMail>>>,
        fail: Arc<AtomicBool>,
    }

    impl MockMailDispatcher {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        #[must_use]
        pub fn sent(&self) -> Vec<SentMail> {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Most recent mail sent to `email`.
        #[must_use]
        pub fn last_to(&self, email: &str) -> Option<SentMail> {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .rev()
                .find(|m| m.email == email)
                .cloned()
        }
    }

    #[async_trait]
    impl MailDispatcher for MockMailDispatcher {
        async fn send_verification_mail(
            &self,
            email: &str,
            token: &str,
        ) -> Result<(), AccountError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(AccountError::InternalFailure(
                    "Mail service is unavailable".into(),
                ));
            }
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(SentMail {
                    email: email.to_string(),
                    token: token.to_string(),
                });
            Ok(())
        }
    }
}
