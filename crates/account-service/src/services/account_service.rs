//! Account orchestration.
//!
//! [`AccountService`] drives every account operation across the
//! collaborators that own a piece of an account: the account row, identity
//! records, the profile service, the lifecycle event stream, mail dispatch,
//! and the login-code cache.
//!
//! # Creation
//!
//! Account creation fans out to three independent steps (persist the row,
//! enroll the identity, create the profile) and joins them. Each step that
//! may have left a side effect behind registers a reversal. If any step
//! fails, every registered reversal runs before the first error is returned,
//! so a failed creation leaves nothing observable behind apart from the
//! `creation_failed` event.
//!
//! # Lifecycle
//!
//! Archive, restore, block, unblock and delete are one storage mutation plus
//! a mandatory event. A failed emission fails the call without undoing the
//! mutation; mutations converge when repeated, so callers retry the whole
//! transition.

use crate::config::Config;
use crate::crypto::{self, LoginCodeHasher};
use crate::errors::AccountError;
use crate::models::{
    Account, AccountChange, AccountId, CredentialMaterial, IdentityKey, LifecycleEvent,
    LifecycleEventKind, LifecycleTransition, LoginCodeIssued, NewIdentity, SessionTokens,
    SyncCode, VerifiedIdentity,
};
use crate::observability::hash_for_correlation;
use crate::observability::metrics::{
    record_accounts_purged, record_lifecycle_transition, record_saga,
};
use crate::observability::ErrorCategory;
use crate::redis::{CodeCache, EventNotifier};
use crate::repositories::{AccountRepository, IdentityStore};
use crate::services::compensation::{CompensationRegistry, Reversible};
use crate::services::deadline::Deadline;
use crate::services::identity_service::{IdentityVerifier, ProviderRegistry};
use crate::services::login_code_service::{CodeExchangeStore, EMAIL_NAMESPACE, LOGIN_NAMESPACE};
use crate::services::mail_client::MailDispatcher;
use crate::services::profile_client::ProfileClient;
use crate::services::task_group::TaskGroup;
use crate::services::token_service::TokenIssuer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::jwt::{
    AccessClaims, EmailVerificationClaims, EmailVerificationExtra, RefreshClaims,
};
use common::secret::{ExposeSecret, SecretString};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Tunables for [`AccountService`].
#[derive(Debug, Clone)]
pub struct AccountSettings {
    /// Time between archive and purge eligibility.
    pub archive_retention: Duration,
    /// Upper bound for a single collaborator call, below the caller deadline.
    pub step_timeout: Duration,
    /// Bound for each reversal during compensation.
    pub compensation_timeout: Duration,
    pub bcrypt_cost: u32,
    pub login_code_ttl: Duration,
    pub email_code_ttl: Duration,
    pub purge_batch_size: u32,
}

impl AccountSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            archive_retention: config.archive_retention,
            step_timeout: config.step_timeout,
            compensation_timeout: config.compensation_timeout,
            bcrypt_cost: config.bcrypt_cost,
            login_code_ttl: config.login_code_ttl,
            email_code_ttl: config.email_token_ttl,
            purge_batch_size: config.purge_batch_size,
        }
    }
}

/// The collaborators an [`AccountService`] coordinates.
#[derive(Clone)]
pub struct Collaborators {
    pub accounts: Arc<dyn AccountRepository>,
    pub identities: Arc<dyn IdentityStore>,
    pub profiles: Arc<dyn ProfileClient>,
    pub events: Arc<dyn EventNotifier>,
    pub mail: Arc<dyn MailDispatcher>,
    pub code_cache: Arc<dyn CodeCache>,
}

// ============================================================================
// Reversals
// ============================================================================

struct NotifyCreationFailed {
    events: Arc<dyn EventNotifier>,
    account_id: AccountId,
    sync_code: SyncCode,
}

#[async_trait]
impl Reversible for NotifyCreationFailed {
    fn name(&self) -> &'static str {
        "notify_creation_failed"
    }

    async fn undo(&self) -> Result<(), AccountError> {
        self.events
            .emit(&LifecycleEvent {
                kind: LifecycleEventKind::CreationFailed,
                account_id: self.account_id,
                sync_code: self.sync_code.clone(),
                occurred_at: Utc::now(),
            })
            .await
    }
}

struct DeleteAccountRow {
    accounts: Arc<dyn AccountRepository>,
    account_id: AccountId,
}

#[async_trait]
impl Reversible for DeleteAccountRow {
    fn name(&self) -> &'static str {
        "delete_account"
    }

    async fn undo(&self) -> Result<(), AccountError> {
        self.accounts.delete(self.account_id).await.map(|_| ())
    }
}

struct RemoveIdentity {
    identities: Arc<dyn IdentityStore>,
    account_id: AccountId,
    key: IdentityKey,
}

#[async_trait]
impl Reversible for RemoveIdentity {
    fn name(&self) -> &'static str {
        "remove_identity"
    }

    async fn undo(&self) -> Result<(), AccountError> {
        self.identities.remove(self.account_id, &self.key).await
    }
}

struct DeleteProfile {
    profiles: Arc<dyn ProfileClient>,
    account_id: AccountId,
}

#[async_trait]
impl Reversible for DeleteProfile {
    fn name(&self) -> &'static str {
        "delete_profile"
    }

    async fn undo(&self) -> Result<(), AccountError> {
        self.profiles.delete_profile(self.account_id).await
    }
}

struct RevokeCode {
    store: CodeExchangeStore,
    subject: String,
}

#[async_trait]
impl Reversible for RevokeCode {
    fn name(&self) -> &'static str {
        "revoke_code"
    }

    async fn undo(&self) -> Result<(), AccountError> {
        self.store.revoke(&self.subject).await
    }
}

/// Run one fan-out step and register its reversal.
///
/// The reversal is registered when the step succeeds and when it outlives
/// its deadline, since a timed-out call may still have taken effect. A
/// definitive error left nothing to undo.
async fn reversible_step<F>(
    registry: &CompensationRegistry,
    deadline: Deadline,
    step: &'static str,
    fut: F,
    reversal: Box<dyn Reversible>,
) -> Result<(), AccountError>
where
    F: Future<Output = Result<(), AccountError>>,
{
    match deadline.race(fut).await {
        Some(Ok(())) => {
            registry.register(reversal);
            Ok(())
        }
        Some(Err(e)) => Err(e),
        None => {
            registry.register(reversal);
            Err(Deadline::elapsed(step))
        }
    }
}

fn observe<T>(operation: &'static str, started: Instant, result: &Result<T, AccountError>) {
    let duration = started.elapsed();
    match result {
        Ok(_) => {
            debug!(target: "account.saga", operation = operation, "Operation succeeded");
            record_saga(operation, "success", None, duration);
        }
        Err(e) => {
            let category = ErrorCategory::from(e);
            if e.is_retryable() {
                warn!(target: "account.saga", operation = operation, error = %e, "Operation failed");
            } else {
                debug!(target: "account.saga", operation = operation, error = %e, "Operation rejected");
            }
            record_saga(operation, "error", Some(category.as_str()), duration);
        }
    }
}

fn correlation(account_id: AccountId) -> String {
    hash_for_correlation(&account_id.to_string())
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Account lifecycle, login-code exchange and session issuance.
pub struct AccountService {
    accounts: Arc<dyn AccountRepository>,
    identities: Arc<dyn IdentityStore>,
    profiles: Arc<dyn ProfileClient>,
    events: Arc<dyn EventNotifier>,
    mail: Arc<dyn MailDispatcher>,
    verifier: IdentityVerifier,
    tokens: Arc<TokenIssuer>,
    login_codes: CodeExchangeStore,
    email_codes: CodeExchangeStore,
    settings: AccountSettings,
}

impl AccountService {
    #[must_use]
    pub fn new(
        collaborators: Collaborators,
        providers: ProviderRegistry,
        tokens: Arc<TokenIssuer>,
        code_hasher: Arc<LoginCodeHasher>,
        settings: AccountSettings,
    ) -> Self {
        let login_codes = CodeExchangeStore::new(
            Arc::clone(&collaborators.code_cache),
            Arc::clone(&code_hasher),
            LOGIN_NAMESPACE,
            settings.login_code_ttl,
        );
        let email_codes = CodeExchangeStore::new(
            collaborators.code_cache,
            code_hasher,
            EMAIL_NAMESPACE,
            settings.email_code_ttl,
        );

        Self {
            verifier: IdentityVerifier::new(Arc::clone(&collaborators.identities), providers),
            accounts: collaborators.accounts,
            identities: collaborators.identities,
            profiles: collaborators.profiles,
            events: collaborators.events,
            mail: collaborators.mail,
            tokens,
            login_codes,
            email_codes,
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &AccountSettings {
        &self.settings
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    // ------------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------------

    /// Create an account bound to `credential`.
    ///
    /// Returns the new id only once every step, including the verification
    /// mail for an unverified email, has succeeded.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for malformed credential material
    /// - `Unauthorized` if a provider rejects its token
    /// - `Conflict` if the identity is already bound to an account
    /// - `InternalFailure` if a collaborator failed or timed out
    #[instrument(skip_all, fields(kind = credential.kind_label()))]
    pub async fn create_account(
        &self,
        credential: &CredentialMaterial,
        deadline: Deadline,
    ) -> Result<AccountId, AccountError> {
        let started = Instant::now();
        let result = async {
            let identity = self
                .verifier
                .resolve_enrollment(credential, self.settings.bcrypt_cost, deadline)
                .await?;
            self.create_with_identity(&identity, deadline).await
        }
        .await;
        observe("create_account", started, &result);
        result
    }

    async fn create_with_identity(
        &self,
        identity: &NewIdentity,
        deadline: Deadline,
    ) -> Result<AccountId, AccountError> {
        let account_id = AccountId::generate();
        let sync_code = crypto::generate_sync_code()?;
        let account = Account::new(account_id, sync_code.clone(), Utc::now());

        let registry = CompensationRegistry::new(self.settings.compensation_timeout);
        registry.register(Box::new(NotifyCreationFailed {
            events: Arc::clone(&self.events),
            account_id,
            sync_code,
        }));

        info!(
            target: "account.saga",
            account = %correlation(account_id),
            "Creating account"
        );

        let step_deadline = deadline.capped(self.settings.step_timeout);
        let mut group = TaskGroup::new();
        group.spawn(
            "persist_account",
            reversible_step(
                &registry,
                step_deadline,
                "persist_account",
                self.accounts.insert(&account),
                Box::new(DeleteAccountRow {
                    accounts: Arc::clone(&self.accounts),
                    account_id,
                }),
            ),
        );
        group.spawn(
            "enroll_identity",
            reversible_step(
                &registry,
                step_deadline,
                "enroll_identity",
                self.identities.enroll(account_id, identity),
                Box::new(RemoveIdentity {
                    identities: Arc::clone(&self.identities),
                    account_id,
                    key: identity.key(),
                }),
            ),
        );
        group.spawn(
            "create_profile",
            reversible_step(
                &registry,
                step_deadline,
                "create_profile",
                self.profiles.create_profile(account_id),
                Box::new(DeleteProfile {
                    profiles: Arc::clone(&self.profiles),
                    account_id,
                }),
            ),
        );

        if let Err(err) = group.join().await {
            self.compensate(&registry, account_id, &err).await;
            return Err(err);
        }

        if !identity.email_verified() {
            if let Err(err) = self
                .send_verification(&registry, account_id, identity, deadline)
                .await
            {
                let err = err.in_step("send_verification");
                self.compensate(&registry, account_id, &err).await;
                return Err(err);
            }
        }

        info!(
            target: "account.saga",
            account = %correlation(account_id),
            "Account created"
        );

        Ok(account_id)
    }

    async fn send_verification(
        &self,
        registry: &CompensationRegistry,
        account_id: AccountId,
        identity: &NewIdentity,
        deadline: Deadline,
    ) -> Result<(), AccountError> {
        let subject = account_id.to_string();
        let step_deadline = deadline.capped(self.settings.step_timeout);

        // Revoking a code that was never stored is harmless
        registry.register(Box::new(RevokeCode {
            store: self.email_codes.clone(),
            subject: subject.clone(),
        }));
        let code = step_deadline
            .run("issue_email_code", self.email_codes.issue_code(&subject))
            .await?;

        let token = self.tokens.generate::<EmailVerificationClaims>(
            &subject,
            EmailVerificationExtra {
                email: identity.email().to_string(),
                code: code.expose_secret().to_string(),
            },
        )?;

        step_deadline
            .run(
                "send_mail",
                self.mail
                    .send_verification_mail(identity.email(), &token.token),
            )
            .await
    }

    async fn compensate(
        &self,
        registry: &CompensationRegistry,
        account_id: AccountId,
        cause: &AccountError,
    ) {
        warn!(
            target: "account.saga",
            account = %correlation(account_id),
            error = %cause,
            reversals = registry.len(),
            "Account creation failed, compensating"
        );

        let report = registry.trigger().await;
        if !report.is_complete() {
            error!(
                target: "account.saga",
                account = %correlation(account_id),
                attempted = report.attempted,
                failed = report.failed,
                "Compensation incomplete, partial account state may remain"
            );
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Archive the account, starting its retention period.
    #[instrument(skip_all, fields(account = %correlation(account_id)))]
    pub async fn archive(
        &self,
        account_id: AccountId,
        deadline: Deadline,
    ) -> Result<Account, AccountError> {
        self.transition(account_id, LifecycleTransition::Archive, deadline)
            .await
    }

    /// Undo an archive, cancelling the scheduled purge.
    #[instrument(skip_all, fields(account = %correlation(account_id)))]
    pub async fn restore(
        &self,
        account_id: AccountId,
        deadline: Deadline,
    ) -> Result<Account, AccountError> {
        self.transition(account_id, LifecycleTransition::Restore, deadline)
            .await
    }

    #[instrument(skip_all, fields(account = %correlation(account_id)))]
    pub async fn block(
        &self,
        account_id: AccountId,
        deadline: Deadline,
    ) -> Result<Account, AccountError> {
        self.transition(account_id, LifecycleTransition::Block, deadline)
            .await
    }

    #[instrument(skip_all, fields(account = %correlation(account_id)))]
    pub async fn unblock(
        &self,
        account_id: AccountId,
        deadline: Deadline,
    ) -> Result<Account, AccountError> {
        self.transition(account_id, LifecycleTransition::Unblock, deadline)
            .await
    }

    async fn transition(
        &self,
        account_id: AccountId,
        transition: LifecycleTransition,
        deadline: Deadline,
    ) -> Result<Account, AccountError> {
        let started = Instant::now();
        let result = async {
            let change = AccountChange {
                transition,
                sync_code: crypto::generate_sync_code()?,
                at: Utc::now(),
                retention: self.settings.archive_retention,
            };

            let account = deadline
                .run("update_account", self.accounts.apply(account_id, &change))
                .await?;

            self.emit(transition.event_kind(), account_id, &account.sync_code, deadline)
                .await?;

            Ok(account)
        }
        .await;

        let status = if result.is_ok() { "success" } else { "error" };
        record_lifecycle_transition(transition.as_str(), status);
        observe(transition.as_str(), started, &result);
        result
    }

    /// Hard-delete an archived account and its identities.
    ///
    /// A missing account still emits `deleted`, so a retry after a failed
    /// emission converges.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the account exists and is not archived.
    #[instrument(skip_all, fields(account = %correlation(account_id)))]
    pub async fn delete(&self, account_id: AccountId, deadline: Deadline) -> Result<(), AccountError> {
        let started = Instant::now();
        let result = self.delete_account(account_id, deadline).await;
        record_lifecycle_transition("delete", if result.is_ok() { "success" } else { "error" });
        observe("delete", started, &result);
        result
    }

    async fn delete_account(
        &self,
        account_id: AccountId,
        deadline: Deadline,
    ) -> Result<(), AccountError> {
        let existing = deadline
            .run("load_account", self.accounts.get(account_id))
            .await?;
        if let Some(account) = &existing {
            if !account.is_archived {
                return Err(AccountError::Conflict(
                    "account must be archived before deletion".to_string(),
                ));
            }
        }

        let removed = deadline
            .run("remove_identities", self.identities.remove_all(account_id))
            .await?;
        let existed = deadline
            .run("delete_account", self.accounts.delete(account_id))
            .await?;

        debug!(
            target: "account.saga",
            account = %correlation(account_id),
            identities = removed,
            existed = existed,
            "Account rows deleted"
        );

        let sync_code = crypto::generate_sync_code()?;
        self.emit(LifecycleEventKind::Deleted, account_id, &sync_code, deadline)
            .await
    }

    async fn emit(
        &self,
        kind: LifecycleEventKind,
        account_id: AccountId,
        sync_code: &SyncCode,
        deadline: Deadline,
    ) -> Result<(), AccountError> {
        let event = LifecycleEvent {
            kind,
            account_id,
            sync_code: sync_code.clone(),
            occurred_at: Utc::now(),
        };

        deadline
            .run("emit_event", self.events.emit(&event))
            .await
            .map_err(|e| {
                warn!(
                    target: "account.saga",
                    account = %correlation(account_id),
                    kind = kind.as_str(),
                    error = %e,
                    "Lifecycle event not emitted, mutation stays applied"
                );
                e.in_step("emit_event")
            })
    }

    /// Delete archived accounts whose retention period has passed.
    ///
    /// Processes at most one batch. Individual failures are logged and
    /// skipped; they are picked up again by the next sweep.
    #[instrument(skip_all)]
    pub async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<usize, AccountError> {
        let started = Instant::now();
        let result = async {
            let candidates = deadline
                .run(
                    "list_purgeable",
                    self.accounts
                        .list_purgeable(now, self.settings.purge_batch_size),
                )
                .await?;

            let mut purged = 0usize;
            for account_id in candidates {
                match self.delete(account_id, deadline).await {
                    Ok(()) => purged += 1,
                    Err(e) => warn!(
                        target: "account.purge",
                        account = %correlation(account_id),
                        error = %e,
                        "Failed to purge account"
                    ),
                }
            }

            if purged > 0 {
                info!(target: "account.purge", purged = purged, "Purged expired accounts");
            }
            record_accounts_purged(purged as u64);
            Ok(purged)
        }
        .await;
        observe("purge_expired", started, &result);
        result
    }

    // ------------------------------------------------------------------------
    // Login codes and sessions
    // ------------------------------------------------------------------------

    /// Verify `credential` and issue a single-use login code for its account.
    ///
    /// A provider identity with no account yet is provisioned first.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for rejected credentials and for archived or blocked
    /// accounts.
    #[instrument(skip_all, fields(kind = credential.kind_label()))]
    pub async fn issue_login_code(
        &self,
        credential: &CredentialMaterial,
        deadline: Deadline,
    ) -> Result<LoginCodeIssued, AccountError> {
        let started = Instant::now();
        let result = async {
            let account_id = match self.verifier.verify(credential, deadline).await? {
                VerifiedIdentity::Registered(account_id) => account_id,
                VerifiedIdentity::Unregistered(profile) => {
                    self.provision_provider_account(NewIdentity::Provider(profile), deadline)
                        .await?
                }
            };

            self.require_active(account_id, deadline).await?;

            let code = deadline
                .run(
                    "issue_code",
                    self.login_codes.issue_code(&account_id.to_string()),
                )
                .await?;

            Ok(LoginCodeIssued {
                subject: account_id,
                code,
            })
        }
        .await;
        observe("issue_login_code", started, &result);
        result
    }

    async fn provision_provider_account(
        &self,
        identity: NewIdentity,
        deadline: Deadline,
    ) -> Result<AccountId, AccountError> {
        match self.create_with_identity(&identity, deadline).await {
            Ok(account_id) => Ok(account_id),
            // A concurrent login for the same provider subject won the race
            Err(AccountError::Conflict(m)) => {
                let NewIdentity::Provider(profile) = &identity else {
                    return Err(AccountError::Conflict(m));
                };
                deadline
                    .run(
                        "find_identity",
                        self.identities
                            .find_provider(profile.provider, &profile.subject),
                    )
                    .await?
                    .map(|existing| existing.account_id)
                    .ok_or(AccountError::Conflict(m))
            }
            Err(e) => Err(e),
        }
    }

    /// Exchange a login code for a session.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `subject` is not an account id or `code` is empty
    /// - `Unauthorized` for a missing, expired, mismatched or consumed code,
    ///   and for archived or blocked accounts
    #[instrument(skip_all)]
    pub async fn verify_login_code(
        &self,
        subject: &str,
        code: &SecretString,
        deadline: Deadline,
    ) -> Result<SessionTokens, AccountError> {
        let started = Instant::now();
        let result = async {
            let account_id = AccountId::parse(subject)?;
            if code.expose_secret().is_empty() {
                return Err(AccountError::InvalidInput("login code is required".to_string()));
            }

            let valid = deadline
                .run(
                    "validate_code",
                    self.login_codes
                        .validate_code(&account_id.to_string(), code.expose_secret()),
                )
                .await?;
            if !valid {
                return Err(AccountError::Unauthorized(
                    "invalid or expired login code".to_string(),
                ));
            }

            self.require_active(account_id, deadline).await?;
            self.mint_session(account_id)
        }
        .await;
        observe("verify_login_code", started, &result);
        result
    }

    /// Mint a fresh session from a refresh token.
    #[instrument(skip_all)]
    pub async fn refresh_session(
        &self,
        refresh_token: &str,
        deadline: Deadline,
    ) -> Result<SessionTokens, AccountError> {
        let started = Instant::now();
        let result = async {
            let claims: RefreshClaims = self.tokens.verify(refresh_token)?;
            let account_id = AccountId::parse(&claims.sub).map_err(|_| {
                AccountError::Unauthorized("token subject is not an account".to_string())
            })?;

            self.require_active(account_id, deadline).await?;
            self.mint_session(account_id)
        }
        .await;
        observe("refresh_session", started, &result);
        result
    }

    /// Consume an email-verification token and mark its email verified.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` for an invalid, expired or already used token
    /// - `NotFound` if no identity of the account carries the email
    #[instrument(skip_all)]
    pub async fn verify_email(&self, token: &str, deadline: Deadline) -> Result<AccountId, AccountError> {
        let started = Instant::now();
        let result = async {
            let claims: EmailVerificationClaims = self.tokens.verify(token)?;
            let account_id = AccountId::parse(&claims.sub).map_err(|_| {
                AccountError::Unauthorized("token subject is not an account".to_string())
            })?;

            let valid = deadline
                .run(
                    "validate_code",
                    self.email_codes.validate_code(&claims.sub, &claims.code),
                )
                .await?;
            if !valid {
                return Err(AccountError::Unauthorized(
                    "verification link is invalid or already used".to_string(),
                ));
            }

            let marked = deadline
                .run(
                    "mark_verified",
                    self.identities.mark_verified(account_id, &claims.email),
                )
                .await?;
            if !marked {
                return Err(AccountError::NotFound(
                    "no identity with this email".to_string(),
                ));
            }

            Ok(account_id)
        }
        .await;
        observe("verify_email", started, &result);
        result
    }

    async fn require_active(
        &self,
        account_id: AccountId,
        deadline: Deadline,
    ) -> Result<Account, AccountError> {
        let account = deadline
            .run("load_account", self.accounts.get(account_id))
            .await?
            .filter(Account::is_active)
            .ok_or_else(|| AccountError::Unauthorized("account is not active".to_string()))?;
        Ok(account)
    }

    fn mint_session(&self, account_id: AccountId) -> Result<SessionTokens, AccountError> {
        let subject = account_id.to_string();
        let access = self.tokens.generate::<AccessClaims>(&subject, ())?;
        let refresh = self.tokens.generate::<RefreshClaims>(&subject, ())?;

        Ok(SessionTokens {
            access_token: access.token,
            access_expires_at: access.expires_at,
            refresh_token: refresh.token,
            refresh_expires_at: refresh.expires_at,
        })
    }
}
