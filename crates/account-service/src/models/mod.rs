//! Domain types for accounts, identities and sessions.

use crate::errors::AccountError;
use chrono::{DateTime, Utc};
use common::secret::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Account
// ============================================================================

/// Opaque account identifier, allocated at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Allocate a fresh id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse a caller-supplied subject id.
    pub fn parse(value: &str) -> Result<Self, AccountError> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|_| AccountError::InvalidInput("subject id is not a valid account id".into()))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque value regenerated on every lifecycle transition.
///
/// Downstream replicas compare it against their cached copy to detect staleness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncCode(String);

impl SyncCode {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity-agnostic account root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub sync_code: SyncCode,
    pub is_archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    /// Hard deletion becomes eligible after this instant.
    pub delete_after: Option<DateTime<Utc>>,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    #[must_use]
    pub fn new(id: AccountId, sync_code: SyncCode, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            sync_code,
            is_archived: false,
            archived_at: None,
            delete_after: None,
            is_blocked: false,
            created_at,
        }
    }

    /// Neither archived nor blocked.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_archived && !self.is_blocked
    }

    /// Archived and past its retention deadline.
    #[must_use]
    pub fn is_purgeable(&self, now: DateTime<Utc>) -> bool {
        self.is_archived && self.delete_after.is_some_and(|deadline| deadline <= now)
    }

    /// Result of applying `change` to this account.
    ///
    /// Storage adapters implement the same rules in their own query language.
    /// Applying a change twice yields the same flags; only the sync code moves.
    #[must_use]
    pub fn apply(&self, change: &AccountChange) -> Account {
        let mut next = self.clone();
        next.sync_code = change.sync_code.clone();

        match change.transition {
            LifecycleTransition::Archive => {
                let archived_at = self.archived_at.unwrap_or(change.at);
                next.is_archived = true;
                next.archived_at = Some(archived_at);
                next.delete_after = Some(retention_deadline(archived_at, change.retention));
            }
            LifecycleTransition::Restore => {
                next.is_archived = false;
                next.archived_at = None;
                next.delete_after = None;
            }
            LifecycleTransition::Block => next.is_blocked = true,
            LifecycleTransition::Unblock => next.is_blocked = false,
        }

        next
    }
}

/// `archived_at + retention`, saturating at the maximum representable instant.
#[must_use]
pub fn retention_deadline(archived_at: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(retention)
        .ok()
        .and_then(|delta| archived_at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A lifecycle mutation to apply to one account row.
#[derive(Debug, Clone)]
pub struct AccountChange {
    pub transition: LifecycleTransition,
    /// Replaces the stored sync code.
    pub sync_code: SyncCode,
    pub at: DateTime<Utc>,
    /// Only read by `Archive`.
    pub retention: Duration,
}

/// Reversible lifecycle transitions. Delete is handled separately because it
/// removes the row rather than mutating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleTransition {
    Archive,
    Restore,
    Block,
    Unblock,
}

impl LifecycleTransition {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleTransition::Archive => "archive",
            LifecycleTransition::Restore => "restore",
            LifecycleTransition::Block => "block",
            LifecycleTransition::Unblock => "unblock",
        }
    }

    /// Event emitted once the mutation is stored.
    #[must_use]
    pub fn event_kind(&self) -> LifecycleEventKind {
        match self {
            LifecycleTransition::Archive => LifecycleEventKind::Archived,
            LifecycleTransition::Restore => LifecycleEventKind::Restored,
            LifecycleTransition::Block => LifecycleEventKind::Blocked,
            LifecycleTransition::Unblock => LifecycleEventKind::Unblocked,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventKind {
    CreationFailed,
    Archived,
    Restored,
    Blocked,
    Unblocked,
    Deleted,
}

impl LifecycleEventKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEventKind::CreationFailed => "creation_failed",
            LifecycleEventKind::Archived => "archived",
            LifecycleEventKind::Restored => "restored",
            LifecycleEventKind::Blocked => "blocked",
            LifecycleEventKind::Unblocked => "unblocked",
            LifecycleEventKind::Deleted => "deleted",
        }
    }
}

/// Event published to downstream consumers after a lifecycle change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: LifecycleEventKind,
    pub account_id: AccountId,
    pub sync_code: SyncCode,
    pub occurred_at: DateTime<Utc>,
}

// ============================================================================
// Identities
// ============================================================================

/// External identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Github,
    Apple,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Google, Provider::Github, Provider::Apple];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Github => "github",
            Provider::Apple => "apple",
        }
    }

    /// Parse a provider name; unknown names are `InvalidInput`.
    pub fn parse(value: &str) -> Result<Self, AccountError> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| AccountError::InvalidInput(format!("unknown provider: {value}")))
    }
}

/// What a provider asserts about the holder of a token.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider: Provider,
    /// Provider-side subject id.
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
}

impl fmt::Debug for ProviderProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderProfile")
            .field("provider", &self.provider)
            .field("subject", &"[REDACTED]")
            .field("email", &"[REDACTED]")
            .field("email_verified", &self.email_verified)
            .finish()
    }
}

/// Credentials presented by a client.
pub enum CredentialMaterial {
    Password {
        email: String,
        password: SecretString,
    },
    ProviderToken {
        provider: Provider,
        token: SecretString,
    },
}

impl fmt::Debug for CredentialMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialMaterial::Password { .. } => f
                .debug_struct("Password")
                .field("email", &"[REDACTED]")
                .field("password", &"[REDACTED]")
                .finish(),
            CredentialMaterial::ProviderToken { provider, .. } => f
                .debug_struct("ProviderToken")
                .field("provider", provider)
                .field("token", &"[REDACTED]")
                .finish(),
        }
    }
}

impl CredentialMaterial {
    /// Bounded label for logs and metrics.
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            CredentialMaterial::Password { .. } => "password",
            CredentialMaterial::ProviderToken { provider, .. } => provider.as_str(),
        }
    }
}

/// Identity to enroll against a freshly allocated account.
#[derive(Clone)]
pub enum NewIdentity {
    Local {
        email: String,
        password_hash: String,
    },
    Provider(ProviderProfile),
}

impl fmt::Debug for NewIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NewIdentity::Local { .. } => f
                .debug_struct("Local")
                .field("email", &"[REDACTED]")
                .field("password_hash", &"[REDACTED]")
                .finish(),
            NewIdentity::Provider(profile) => f.debug_tuple("Provider").field(profile).finish(),
        }
    }
}

impl NewIdentity {
    #[must_use]
    pub fn key(&self) -> IdentityKey {
        match self {
            NewIdentity::Local { email, .. } => IdentityKey::Local {
                email: email.clone(),
            },
            NewIdentity::Provider(profile) => IdentityKey::Provider {
                provider: profile.provider,
                subject: profile.subject.clone(),
            },
        }
    }

    #[must_use]
    pub fn email(&self) -> &str {
        match self {
            NewIdentity::Local { email, .. } => email,
            NewIdentity::Provider(profile) => &profile.email,
        }
    }

    /// Whether the email is already known to be owned by the holder.
    #[must_use]
    pub fn email_verified(&self) -> bool {
        match self {
            NewIdentity::Local { .. } => false,
            NewIdentity::Provider(profile) => profile.email_verified,
        }
    }
}

/// Unique key of an identity record at the storage boundary.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Local { email: String },
    Provider { provider: Provider, subject: String },
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::Local { .. } => f.write_str("Local([REDACTED])"),
            IdentityKey::Provider { provider, .. } => write!(f, "Provider({provider:?}, [REDACTED])"),
        }
    }
}

/// Stored local (password) identity.
#[derive(Clone)]
pub struct LocalIdentity {
    pub account_id: AccountId,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_verified: bool,
}

impl fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("account_id", &self.account_id)
            .field("email", &"[REDACTED]")
            .field("password_hash", &"[REDACTED]")
            .field("is_active", &self.is_active)
            .field("is_verified", &self.is_verified)
            .finish()
    }
}

/// Stored provider-bound identity.
#[derive(Clone)]
pub struct ProviderIdentity {
    pub account_id: AccountId,
    pub provider: Provider,
    pub subject: String,
    pub email: String,
    pub is_verified: bool,
}

impl fmt::Debug for ProviderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderIdentity")
            .field("account_id", &self.account_id)
            .field("provider", &self.provider)
            .field("subject", &"[REDACTED]")
            .field("email", &"[REDACTED]")
            .field("is_verified", &self.is_verified)
            .finish()
    }
}

/// Outcome of verifying credential material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifiedIdentity {
    /// Credentials belong to an existing account.
    Registered(AccountId),
    /// A provider vouched for the holder but no account is bound yet.
    Unregistered(ProviderProfile),
}

// ============================================================================
// Results
// ============================================================================

/// A freshly issued login code. The plaintext exists only here.
#[derive(Debug)]
pub struct LoginCodeIssued {
    pub subject: AccountId,
    pub code: SecretString,
}

/// Access and refresh tokens establishing a session.
#[derive(Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub access_expires_at: i64,
    pub refresh_token: String,
    pub refresh_expires_at: i64,
}

impl fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokens")
            .field("access_token", &"[REDACTED]")
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_token", &"[REDACTED]")
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}
