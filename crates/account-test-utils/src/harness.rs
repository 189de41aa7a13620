//! Orchestrator test harness
//!
//! Wires an [`AccountService`] to in-memory collaborators so tests can drive
//! whole operations and then inspect, or break, every collaborator.

use account_service::crypto::LoginCodeHasher;
use account_service::models::{
    AccountId, CredentialMaterial, LoginCodeIssued, Provider, ProviderProfile, SessionTokens,
};
use account_service::redis::code_cache::mock::MemoryCodeCache;
use account_service::redis::events::mock::RecordingEventNotifier;
use account_service::repositories::accounts::mock::InMemoryAccountRepository;
use account_service::repositories::identities::mock::InMemoryIdentityStore;
use account_service::services::identity_service::mock::StaticIdentityProvider;
use account_service::services::identity_service::ProviderRegistry;
use account_service::services::mail_client::mock::MockMailDispatcher;
use account_service::services::profile_client::mock::MockProfileClient;
use account_service::services::{AccountService, AccountSettings, Collaborators, Deadline};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

use crate::crypto_fixtures::{test_code_hash_key, test_token_issuer};
use crate::test_ids::{TEST_PASSWORD, TEST_PROVIDER_EMAIL, TEST_PROVIDER_SUBJECT, TEST_PROVIDER_TOKEN};

/// Default caller deadline for harness operations.
pub const TEST_DEADLINE: Duration = Duration::from_secs(10);

/// Settings with the cheapest bcrypt cost and short timeouts.
pub fn test_settings() -> AccountSettings {
    AccountSettings {
        archive_retention: Duration::from_secs(30 * 86_400),
        step_timeout: Duration::from_secs(2),
        compensation_timeout: Duration::from_secs(1),
        bcrypt_cost: 10,
        login_code_ttl: Duration::from_secs(300),
        email_code_ttl: Duration::from_secs(3600),
        purge_batch_size: 100,
    }
}

/// Password credential for `email` using [`TEST_PASSWORD`].
pub fn password_credential(email: &str) -> CredentialMaterial {
    password_credential_with(email, TEST_PASSWORD)
}

pub fn password_credential_with(email: &str, password: &str) -> CredentialMaterial {
    CredentialMaterial::Password {
        email: email.to_string(),
        password: SecretString::from(password),
    }
}

pub fn provider_credential(provider: Provider, token: &str) -> CredentialMaterial {
    CredentialMaterial::ProviderToken {
        provider,
        token: SecretString::from(token),
    }
}

pub fn provider_profile(subject: &str, email: &str, email_verified: bool) -> ProviderProfile {
    ProviderProfile {
        provider: Provider::Github,
        subject: subject.to_string(),
        email: email.to_string(),
        email_verified,
    }
}

/// Orchestrator wired to fakes.
///
/// Every fake is a cheap clone sharing state with the one inside the
/// service, so fault injection and inspection act on the live instance.
pub struct TestAccountHarness {
    pub service: AccountService,
    pub accounts: InMemoryAccountRepository,
    pub identities: InMemoryIdentityStore,
    pub profiles: MockProfileClient,
    pub events: RecordingEventNotifier,
    pub mail: MockMailDispatcher,
    pub cache: MemoryCodeCache,
    /// Registered for [`Provider::Github`]. Accepts [`TEST_PROVIDER_TOKEN`]
    /// for a verified profile out of the box.
    pub provider: StaticIdentityProvider,
}

impl Default for TestAccountHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAccountHarness {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: AccountSettings) -> Self {
        let accounts = InMemoryAccountRepository::new();
        let identities = InMemoryIdentityStore::new();
        let profiles = MockProfileClient::new();
        let events = RecordingEventNotifier::new();
        let mail = MockMailDispatcher::new();
        let cache = MemoryCodeCache::new();

        let provider = StaticIdentityProvider::new();
        provider.accept(
            TEST_PROVIDER_TOKEN,
            provider_profile(TEST_PROVIDER_SUBJECT, TEST_PROVIDER_EMAIL, true),
        );

        let collaborators = Collaborators {
            accounts: Arc::new(accounts.clone()),
            identities: Arc::new(identities.clone()),
            profiles: Arc::new(profiles.clone()),
            events: Arc::new(events.clone()),
            mail: Arc::new(mail.clone()),
            code_cache: Arc::new(cache.clone()),
        };

        let service = AccountService::new(
            collaborators,
            ProviderRegistry::new().with_provider(Provider::Github, Arc::new(provider.clone())),
            Arc::new(test_token_issuer()),
            Arc::new(LoginCodeHasher::new(&test_code_hash_key())),
            settings,
        );

        Self {
            service,
            accounts,
            identities,
            profiles,
            events,
            mail,
            cache,
            provider,
        }
    }

    pub fn deadline(&self) -> Deadline {
        Deadline::after(TEST_DEADLINE)
    }

    /// Create a password account for `email`. Panics on failure.
    pub async fn create_local_account(&self, email: &str) -> AccountId {
        self.service
            .create_account(&password_credential(email), self.deadline())
            .await
            .expect("account creation should succeed")
    }

    /// Token from the most recent verification mail sent to `email`.
    pub fn verification_token_for(&self, email: &str) -> String {
        self.mail
            .last_to(email)
            .expect("a verification mail should have been sent")
            .token
    }

    /// Issue a login code for the password account of `email`.
    pub async fn login_code(&self, email: &str) -> LoginCodeIssued {
        self.service
            .issue_login_code(&password_credential(email), self.deadline())
            .await
            .expect("login code should be issued")
    }

    /// Run the full password login for `email`.
    pub async fn login(&self, email: &str) -> SessionTokens {
        let issued = self.login_code(email).await;
        self.service
            .verify_login_code(&issued.subject.to_string(), &issued.code, self.deadline())
            .await
            .expect("login code should be accepted")
    }

    /// Archive `account_id`. Panics on failure.
    pub async fn archive(&self, account_id: AccountId) {
        self.service
            .archive(account_id, self.deadline())
            .await
            .expect("archive should succeed");
    }

    /// Whether any trace of `account_id` remains in storage or the profile
    /// service.
    pub fn leaves_no_trace(&self, account_id: AccountId) -> bool {
        self.accounts.snapshot(account_id).is_none()
            && self.identities.count_for(account_id) == 0
            && !self.profiles.exists(account_id)
    }
}
