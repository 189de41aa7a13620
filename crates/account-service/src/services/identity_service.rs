//! Identity verification.
//!
//! Turns presented credential material into either an account id or, for a
//! provider token with no bound account, the profile the provider asserted.
//! Provider-specific logic lives behind [`IdentityProvider`], selected from a
//! [`ProviderRegistry`] by the [`Provider`] key.
//!
//! # Security
//!
//! - Password checks always run bcrypt, against a dummy hash when the email is
//!   unknown, so response time does not reveal whether an email is registered
//! - Every rejection of a password login carries the same message
//! - Emails and provider subjects are logged only as correlation hashes

use crate::crypto::{self, DUMMY_BCRYPT_HASH};
use crate::errors::AccountError;
use crate::models::{CredentialMaterial, NewIdentity, Provider, ProviderProfile, VerifiedIdentity};
use crate::observability::hash_for_correlation;
use crate::repositories::IdentityStore;
use crate::services::deadline::Deadline;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LENGTH: usize = 8;

const USERINFO_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const INVALID_CREDENTIALS: &str = "invalid credentials";

/// Verifies a provider-issued token.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve `token` to the profile the provider asserts for its holder.
    ///
    /// A token the provider rejects is `Unauthorized`; an unreachable
    /// provider is `InternalFailure`.
    async fn verify(&self, token: &SecretString) -> Result<ProviderProfile, AccountError>;
}

/// Provider implementations keyed by [`Provider`].
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Provider, Arc<dyn IdentityProvider>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Provider, implementation: Arc<dyn IdentityProvider>) -> Self {
        self.providers.insert(provider, implementation);
        self
    }

    /// # Errors
    ///
    /// Returns `InvalidInput` if `provider` has no registered implementation.
    pub fn get(&self, provider: Provider) -> Result<&Arc<dyn IdentityProvider>, AccountError> {
        self.providers.get(&provider).ok_or_else(|| {
            AccountError::InvalidInput(format!("provider {} is not configured", provider.as_str()))
        })
    }

    #[must_use]
    pub fn is_configured(&self, provider: Provider) -> bool {
        self.providers.contains_key(&provider)
    }

    /// Verify `token` with the implementation registered for `provider`.
    pub async fn verify(
        &self,
        provider: Provider,
        token: &SecretString,
    ) -> Result<ProviderProfile, AccountError> {
        self.get(provider)?.verify(token).await
    }
}

/// Provider adapter that resolves a bearer token against a userinfo endpoint.
///
/// Accepts a JSON object carrying `sub` (or a string or numeric `id`),
/// `email`, and optionally `email_verified`.
#[derive(Clone)]
pub struct UserinfoProvider {
    provider: Provider,
    client: Client,
    userinfo_url: String,
}

impl UserinfoProvider {
    /// # Errors
    ///
    /// Returns `InternalFailure` if the HTTP client cannot be built.
    pub fn new(provider: Provider, userinfo_url: impl Into<String>) -> Result<Self, AccountError> {
        let client = Client::builder()
            .timeout(USERINFO_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                error!(target: "account.identity", error = %e, "Failed to build HTTP client");
                AccountError::InternalFailure("Failed to build provider client".to_string())
            })?;

        Ok(Self {
            provider,
            client,
            userinfo_url: userinfo_url.into(),
        })
    }

    fn parse_profile(&self, body: &Value) -> Result<ProviderProfile, AccountError> {
        let subject = match body.get("sub").or_else(|| body.get("id")) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(AccountError::Unauthorized(
                    "provider did not return a subject".to_string(),
                ))
            }
        };

        let email = body
            .get("email")
            .and_then(Value::as_str)
            .filter(|e| !e.is_empty())
            .map(normalize_email)
            .ok_or_else(|| {
                AccountError::Unauthorized("provider did not return an email".to_string())
            })?;

        let email_verified = match body.get("email_verified") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        };

        Ok(ProviderProfile {
            provider: self.provider,
            subject,
            email,
            email_verified,
        })
    }
}

#[async_trait]
impl IdentityProvider for UserinfoProvider {
    #[instrument(skip_all, fields(provider = self.provider.as_str()))]
    async fn verify(&self, token: &SecretString) -> Result<ProviderProfile, AccountError> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                warn!(target: "account.identity", provider = self.provider.as_str(), error = %e, "Provider request failed");
                AccountError::InternalFailure("identity provider is unavailable".to_string())
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AccountError::Unauthorized(
                "provider rejected the token".to_string(),
            ));
        }
        if !status.is_success() {
            warn!(target: "account.identity", provider = self.provider.as_str(), status = %status, "Unexpected provider response");
            return Err(AccountError::InternalFailure(
                "identity provider is unavailable".to_string(),
            ));
        }

        let body: Value = response.json().await.map_err(|e| {
            warn!(target: "account.identity", provider = self.provider.as_str(), error = %e, "Unreadable provider response");
            AccountError::InternalFailure("identity provider returned an invalid response".to_string())
        })?;

        self.parse_profile(&body)
    }
}

/// Lowercased, trimmed form under which local identities are stored.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Reject anything that is not plausibly `local@domain.tld`.
pub fn validate_email(email: &str) -> Result<(), AccountError> {
    let invalid = || AccountError::InvalidInput("email address is malformed".to_string());

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.chars().any(char::is_whitespace)
    {
        return Err(invalid());
    }
    Ok(())
}

pub fn validate_password(password: &SecretString) -> Result<(), AccountError> {
    if password.expose_secret().chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AccountError::InvalidInput(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Credential verification and enrollment preparation.
#[derive(Clone)]
pub struct IdentityVerifier {
    store: Arc<dyn IdentityStore>,
    providers: ProviderRegistry,
}

impl IdentityVerifier {
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>, providers: ProviderRegistry) -> Self {
        Self { store, providers }
    }

    #[must_use]
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Verify `credential` against stored identities.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for malformed material or an unconfigured provider
    /// - `Unauthorized` for wrong, unknown or inactive credentials
    /// - `InternalFailure` if storage or a provider is unavailable
    #[instrument(skip_all, fields(kind = credential.kind_label()))]
    pub async fn verify(
        &self,
        credential: &CredentialMaterial,
        deadline: Deadline,
    ) -> Result<VerifiedIdentity, AccountError> {
        match credential {
            CredentialMaterial::Password { email, password } => {
                self.verify_password(email, password, deadline).await
            }
            CredentialMaterial::ProviderToken { provider, token } => {
                let profile = deadline
                    .run("verify_provider", self.providers.verify(*provider, token))
                    .await?;
                let existing = deadline
                    .run(
                        "find_identity",
                        self.store.find_provider(profile.provider, &profile.subject),
                    )
                    .await?;

                match existing {
                    Some(identity) => {
                        debug!(
                            target: "account.identity",
                            provider = provider.as_str(),
                            subject = %hash_for_correlation(&profile.subject),
                            "Provider identity recognised"
                        );
                        Ok(VerifiedIdentity::Registered(identity.account_id))
                    }
                    None => {
                        debug!(
                            target: "account.identity",
                            provider = provider.as_str(),
                            subject = %hash_for_correlation(&profile.subject),
                            "Provider identity has no account"
                        );
                        Ok(VerifiedIdentity::Unregistered(profile))
                    }
                }
            }
        }
    }

    async fn verify_password(
        &self,
        email: &str,
        password: &SecretString,
        deadline: Deadline,
    ) -> Result<VerifiedIdentity, AccountError> {
        let email = normalize_email(email);
        if email.is_empty() || password.expose_secret().is_empty() {
            return Err(AccountError::InvalidInput(
                "email and password are required".to_string(),
            ));
        }

        let identity = deadline
            .run("find_identity", self.store.find_local(&email))
            .await?;

        // Always run bcrypt so a miss costs the same as a wrong password
        let hash_to_verify = identity
            .as_ref()
            .map_or(DUMMY_BCRYPT_HASH, |i| i.password_hash.as_str());
        let is_valid = crypto::verify_password(password, hash_to_verify)?;

        let identity = identity.ok_or_else(|| {
            debug!(target: "account.identity", email = %hash_for_correlation(&email), "Unknown email");
            AccountError::Unauthorized(INVALID_CREDENTIALS.to_string())
        })?;

        if !identity.is_active || !is_valid {
            debug!(
                target: "account.identity",
                email = %hash_for_correlation(&email),
                active = identity.is_active,
                "Password login rejected"
            );
            return Err(AccountError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        Ok(VerifiedIdentity::Registered(identity.account_id))
    }

    /// Validate `credential` and turn it into the identity to enroll.
    ///
    /// Passwords are hashed here; provider tokens are verified and their
    /// profile is enrolled as-is.
    #[instrument(skip_all, fields(kind = credential.kind_label()))]
    pub async fn resolve_enrollment(
        &self,
        credential: &CredentialMaterial,
        bcrypt_cost: u32,
        deadline: Deadline,
    ) -> Result<NewIdentity, AccountError> {
        match credential {
            CredentialMaterial::Password { email, password } => {
                let email = normalize_email(email);
                validate_email(&email)?;
                validate_password(password)?;
                let password_hash = crypto::hash_password(password, bcrypt_cost)?;
                Ok(NewIdentity::Local {
                    email,
                    password_hash,
                })
            }
            CredentialMaterial::ProviderToken { provider, token } => {
                let profile = deadline
                    .run("verify_provider", self.providers.verify(*provider, token))
                    .await?;
                Ok(NewIdentity::Provider(profile))
            }
        }
    }
}

/// Scripted identity providers for tests.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    /// Provider that accepts a fixed set of tokens.
    #[derive(Clone, Default)]
    pub struct StaticIdentityProvider {
        profiles: Arc<Mutex<HashMap<String, ProviderProfile>>>,
        unavailable: Arc<AtomicBool>,
        calls: Arc<AtomicUsize>,
    }

    impl StaticIdentityProvider {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Accept `token` as proof of `profile`.
        pub fn accept(&self, token: &str, profile: ProviderProfile) {
            self.profiles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(token.to_string(), profile);
        }

        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        #[must_use]
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IdentityProvider for StaticIdentityProvider {
        async fn verify(&self, token: &SecretString) -> Result<ProviderProfile, AccountError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(AccountError::InternalFailure(
                    "identity provider is unavailable".into(),
                ));
            }
            self.profiles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(token.expose_secret())
                .cloned()
                .ok_or_else(|| AccountError::Unauthorized("provider rejected the token".into()))
        }
    }
}
