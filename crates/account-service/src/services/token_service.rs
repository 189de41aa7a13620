//! Token issuance for the three token kinds.
//!
//! The issuer holds one private key per kind and embeds a [`TokenVerifier`]
//! configured with the matching public keys, so tokens it mints verify
//! locally and in any process that loads the same public keys.

use crate::config::Config;
use crate::crypto;
use crate::errors::AccountError;
use crate::observability::metrics::{record_token_issuance, record_token_validation};
use chrono::Utc;
use common::jwt::{key_id_for, TokenClaims, TokenError, TokenKind, TokenVerifier};
use common::secret::{ExposeSecret, SecretBox};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

struct SigningKey {
    pkcs8: SecretBox<Vec<u8>>,
    key_id: String,
    public_key: Vec<u8>,
    ttl: Duration,
}

/// A signed token and its expiry (unix seconds).
#[derive(Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: i64,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub struct TokenIssuer {
    keys: HashMap<TokenKind, SigningKey>,
    verifier: TokenVerifier,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(clock_skew: Duration) -> Self {
        Self {
            keys: HashMap::new(),
            verifier: TokenVerifier::new(clock_skew),
        }
    }

    /// Register the private key and lifetime for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `InternalFailure` if `pkcs8` is not an Ed25519 private key.
    pub fn with_kind(
        mut self,
        kind: TokenKind,
        pkcs8: SecretBox<Vec<u8>>,
        ttl: Duration,
    ) -> Result<Self, AccountError> {
        let public_key = crypto::public_key_from_pkcs8(pkcs8.expose_secret())?;
        let key_id = key_id_for(kind, &public_key);

        self.verifier = self.verifier.with_public_key(kind, &public_key);
        self.keys.insert(
            kind,
            SigningKey {
                pkcs8,
                key_id,
                public_key,
                ttl,
            },
        );
        Ok(self)
    }

    /// Issuer with all three kinds configured.
    pub fn from_config(config: &Config) -> Result<Self, AccountError> {
        let copy = |key: &SecretBox<Vec<u8>>| SecretBox::new(Box::new(key.expose_secret().clone()));

        Self::new(config.jwt_clock_skew)
            .with_kind(
                TokenKind::Access,
                copy(&config.access_token_key),
                config.access_token_ttl,
            )?
            .with_kind(
                TokenKind::Refresh,
                copy(&config.refresh_token_key),
                config.refresh_token_ttl,
            )?
            .with_kind(
                TokenKind::EmailVerification,
                copy(&config.email_token_key),
                config.email_token_ttl,
            )
    }

    /// Sign a `C` claim set for `subject`, expiring one TTL from now.
    pub fn generate<C: TokenClaims>(
        &self,
        subject: &str,
        extra: C::Extra,
    ) -> Result<IssuedToken, AccountError> {
        self.generate_at::<C>(subject, extra, Utc::now().timestamp())
    }

    /// [`TokenIssuer::generate`] with an explicit issue time.
    #[instrument(skip_all, fields(kind = C::KIND.as_str()))]
    pub fn generate_at<C: TokenClaims>(
        &self,
        subject: &str,
        extra: C::Extra,
        now: i64,
    ) -> Result<IssuedToken, AccountError> {
        let kind = C::KIND;
        let result = self.sign::<C>(subject, extra, now);

        match &result {
            Ok(_) => {
                debug!(target: "account.tokens", kind = kind.as_str(), "Token issued");
                record_token_issuance(kind.as_str(), "success");
            }
            Err(e) => {
                warn!(target: "account.tokens", kind = kind.as_str(), error = %e, "Token issuance failed");
                record_token_issuance(kind.as_str(), "error");
            }
        }

        result
    }

    fn sign<C: TokenClaims>(
        &self,
        subject: &str,
        extra: C::Extra,
        now: i64,
    ) -> Result<IssuedToken, AccountError> {
        let key = self.keys.get(&C::KIND).ok_or_else(|| {
            AccountError::InternalFailure(format!("no {} signing key", C::KIND))
        })?;

        let ttl = i64::try_from(key.ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(ttl);
        let claims = C::assemble(subject.to_string(), now, expires_at, extra);

        let token = crypto::sign_jwt(&claims, key.pkcs8.expose_secret(), &key.key_id)?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Verify `token` as a `C` claim set.
    #[instrument(skip_all, fields(kind = C::KIND.as_str()))]
    pub fn verify<C: TokenClaims>(&self, token: &str) -> Result<C, TokenError> {
        let kind = C::KIND.as_str();
        let result = self.verifier.verify::<C>(token);

        match &result {
            Ok(_) => record_token_validation(kind, "success", None),
            Err(e) => record_token_validation(kind, "error", Some(e.as_label())),
        }

        result
    }

    /// Verifier holding only the public half of each configured key.
    #[must_use]
    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    #[must_use]
    pub fn ttl(&self, kind: TokenKind) -> Option<Duration> {
        self.keys.get(&kind).map(|k| k.ttl)
    }

    #[must_use]
    pub fn key_id(&self, kind: TokenKind) -> Option<&str> {
        self.keys.get(&kind).map(|k| k.key_id.as_str())
    }

    /// PEM-wrapped public key for distribution to verifying processes.
    #[must_use]
    pub fn public_key_pem(&self, kind: TokenKind) -> Option<String> {
        use base64::{engine::general_purpose, Engine as _};

        self.keys.get(&kind).map(|k| {
            format!(
                "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----",
                general_purpose::STANDARD.encode(&k.public_key)
            )
        })
    }
}
