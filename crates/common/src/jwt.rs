//! Signed account tokens: kinds, typed claim sets, and verification.
//!
//! Three token kinds exist, each with its own Ed25519 key pair and lifetime:
//!
//! | Kind                 | Claims                             |
//! |----------------------|------------------------------------|
//! | `access`             | `sub`, `iat`, `exp`                |
//! | `refresh`            | `sub`, `iat`, `exp`                |
//! | `email_verification` | `sub`, `iat`, `exp`, `email`, `code` |
//!
//! Issuance happens in the account service, which holds the private keys.
//! Verification only needs the public keys, so [`TokenVerifier`] lives here
//! and can run in any process.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only `EdDSA` is accepted; any other `alg` is treated as tampering
//! - The `kid` header must name the key of the kind being verified, so a
//!   token minted for one kind never verifies as another
//! - `sub`, `email` and `code` are redacted in `Debug` output
//!
//! # Failure causes
//!
//! [`TokenError`] keeps the causes callers act on apart: an expired token
//! means "authenticate again", an invalid signature means "treat as
//! tampered", and a missing claim means the token was minted for a different
//! shape than the caller expected.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use ring::digest;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum accepted token size in bytes (8KB).
///
/// Checked before any base64 decoding or signature work so oversized input is
/// rejected at minimal cost.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default tolerance for `iat` values ahead of the local clock.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Upper bound for configurable clock skew tolerance.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Token kinds
// =============================================================================

/// The three token kinds, each backed by independent key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    EmailVerification,
}

impl TokenKind {
    /// All kinds, in a stable order.
    pub const ALL: [TokenKind; 3] = [
        TokenKind::Access,
        TokenKind::Refresh,
        TokenKind::EmailVerification,
    ];

    /// Stable lowercase label, also used as the `kid` prefix and metric label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::EmailVerification => "email_verification",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the `kid` for a public key: `<kind>-<first 8 hex of SHA-256(key)>`.
///
/// Deterministic, so an issuer and a verifier configured with the same key
/// agree on the identifier without sharing anything else.
#[must_use]
pub fn key_id_for(kind: TokenKind, public_key: &[u8]) -> String {
    let fingerprint = digest::digest(&digest::SHA256, public_key);
    let short: String = fingerprint
        .as_ref()
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("{}-{}", kind.as_str(), short)
}

// =============================================================================
// Errors
// =============================================================================

/// Token issuance and verification failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Not a structurally valid token (oversized, bad encoding, `iat` in the future).
    #[error("token is malformed")]
    Malformed,

    /// Signature, algorithm, or key id does not match the expected kind.
    #[error("token signature is invalid")]
    InvalidSignature,

    /// Signature is valid but `exp` has passed.
    #[error("token has expired")]
    Expired,

    /// Signature is valid but a claim required by the kind is absent.
    #[error("token is missing a required claim: {0}")]
    MissingClaim(String),

    /// Key material is missing or signing failed.
    #[error("token key material unavailable: {0}")]
    Internal(String),
}

impl TokenError {
    /// Bounded label for metrics.
    #[must_use]
    pub fn as_label(&self) -> &'static str {
        match self {
            TokenError::Malformed => "malformed",
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::Expired => "expired",
            TokenError::MissingClaim(_) => "missing_claim",
            TokenError::Internal(_) => "internal",
        }
    }
}

// =============================================================================
// Claims
// =============================================================================

/// A typed claim set bound to exactly one [`TokenKind`].
///
/// Decoding fails with [`TokenError::MissingClaim`] when any field of the
/// implementing struct is absent from the token.
pub trait TokenClaims: Serialize + DeserializeOwned + Send + Sync {
    /// Kind whose key signs and verifies this claim set.
    const KIND: TokenKind;

    /// Kind-specific claims supplied by the caller at issuance.
    type Extra;

    /// Assemble the claim set.
    fn assemble(sub: String, iat: i64, exp: i64, extra: Self::Extra) -> Self;

    fn subject(&self) -> &str;

    fn issued_at(&self) -> i64;

    fn expires_at(&self) -> i64;
}

/// Claims carried by an access token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims carried by a refresh token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims carried by an email-verification token.
///
/// `code` is a single-use value that the account service consumes when the
/// token is redeemed, so a verification link works once.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailVerificationClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub email: String,
    pub code: String,
}

/// Kind-specific claims for [`EmailVerificationClaims`].
#[derive(Clone)]
pub struct EmailVerificationExtra {
    pub email: String,
    pub code: String,
}

impl fmt::Debug for EmailVerificationExtra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailVerificationExtra")
            .field("email", &"[REDACTED]")
            .field("code", &"[REDACTED]")
            .finish()
    }
}

impl TokenClaims for AccessClaims {
    const KIND: TokenKind = TokenKind::Access;
    type Extra = ();

    fn assemble(sub: String, iat: i64, exp: i64, _extra: ()) -> Self {
        Self { sub, iat, exp }
    }

    fn subject(&self) -> &str {
        &self.sub
    }

    fn issued_at(&self) -> i64 {
        self.iat
    }

    fn expires_at(&self) -> i64 {
        self.exp
    }
}

impl TokenClaims for RefreshClaims {
    const KIND: TokenKind = TokenKind::Refresh;
    type Extra = ();

    fn assemble(sub: String, iat: i64, exp: i64, _extra: ()) -> Self {
        Self { sub, iat, exp }
    }

    fn subject(&self) -> &str {
        &self.sub
    }

    fn issued_at(&self) -> i64 {
        self.iat
    }

    fn expires_at(&self) -> i64 {
        self.exp
    }
}

impl TokenClaims for EmailVerificationClaims {
    const KIND: TokenKind = TokenKind::EmailVerification;
    type Extra = EmailVerificationExtra;

    fn assemble(sub: String, iat: i64, exp: i64, extra: EmailVerificationExtra) -> Self {
        Self {
            sub,
            iat,
            exp,
            email: extra.email,
            code: extra.code,
        }
    }

    fn subject(&self) -> &str {
        &self.sub
    }

    fn issued_at(&self) -> i64 {
        self.iat
    }

    fn expires_at(&self) -> i64 {
        self.exp
    }
}

impl fmt::Debug for AccessClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessClaims")
            .field("sub", &"[REDACTED]")
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .finish()
    }
}

impl fmt::Debug for RefreshClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshClaims")
            .field("sub", &"[REDACTED]")
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .finish()
    }
}

impl fmt::Debug for EmailVerificationClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailVerificationClaims")
            .field("sub", &"[REDACTED]")
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .field("email", &"[REDACTED]")
            .field("code", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Verification
// =============================================================================

struct VerificationKey {
    key_id: String,
    decoding: DecodingKey,
}

/// Verifies tokens of every configured kind against that kind's public key.
///
/// Key material is read-only after construction; share it behind an `Arc`.
pub struct TokenVerifier {
    keys: HashMap<TokenKind, VerificationKey>,
    clock_skew: Duration,
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&'static str> = self.keys.keys().map(TokenKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("TokenVerifier")
            .field("kinds", &kinds)
            .field("clock_skew", &self.clock_skew)
            .finish()
    }
}

impl TokenVerifier {
    /// Create a verifier with no keys. `clock_skew` is clamped to [`MAX_CLOCK_SKEW`].
    #[must_use]
    pub fn new(clock_skew: Duration) -> Self {
        Self {
            keys: HashMap::new(),
            clock_skew: clock_skew.min(MAX_CLOCK_SKEW),
        }
    }

    /// Register the raw Ed25519 public key for `kind`.
    #[must_use]
    pub fn with_public_key(mut self, kind: TokenKind, public_key: &[u8]) -> Self {
        self.keys.insert(
            kind,
            VerificationKey {
                key_id: key_id_for(kind, public_key),
                decoding: DecodingKey::from_ed_der(public_key),
            },
        );
        self
    }

    /// Register the public key for `kind` from its PEM form.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Internal` if the PEM body is not valid base64.
    pub fn with_public_key_pem(self, kind: TokenKind, pem: &str) -> Result<Self, TokenError> {
        let bytes = decode_ed25519_public_key_pem(pem)
            .map_err(|e| TokenError::Internal(format!("invalid {kind} public key: {e}")))?;
        Ok(self.with_public_key(kind, &bytes))
    }

    /// The `kid` expected on tokens of `kind`, if a key is configured.
    #[must_use]
    pub fn key_id(&self, kind: TokenKind) -> Option<&str> {
        self.keys.get(&kind).map(|k| k.key_id.as_str())
    }

    /// Verify `token` as claim set `C` and return the decoded claims.
    ///
    /// # Errors
    ///
    /// - `Malformed` - oversized, undecodable, or `iat` beyond the clock skew
    /// - `InvalidSignature` - wrong algorithm, wrong kind's key id, or bad signature
    /// - `Expired` - `exp` has passed
    /// - `MissingClaim` - a claim required by `C` is absent
    /// - `Internal` - no key configured for `C::KIND`
    pub fn verify<C: TokenClaims>(&self, token: &str) -> Result<C, TokenError> {
        let kind = C::KIND;
        let key = self
            .keys
            .get(&kind)
            .ok_or_else(|| TokenError::Internal(format!("no {kind} verification key")))?;

        let kid = extract_kid(token)?;
        if kid != key.key_id {
            tracing::debug!(
                target: "common.jwt",
                kind = kind.as_str(),
                "Token rejected: key id does not belong to this kind"
            );
            return Err(TokenError::InvalidSignature);
        }

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let token_data = decode::<C>(token, &key.decoding, &validation).map_err(|e| {
            let mapped = map_decode_error(e.kind());
            tracing::debug!(
                target: "common.jwt",
                kind = kind.as_str(),
                error = %e,
                cause = mapped.as_label(),
                "Token verification failed"
            );
            mapped
        })?;

        validate_iat(token_data.claims.issued_at(), self.clock_skew)?;

        Ok(token_data.claims)
    }
}

fn map_decode_error(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::MissingRequiredClaim(claim) => TokenError::MissingClaim(claim.clone()),
        // Signature verified but the payload does not fit the claim struct
        ErrorKind::Json(e) => TokenError::MissingClaim(e.to_string()),
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::MissingAlgorithm
        | ErrorKind::InvalidKeyFormat => TokenError::InvalidSignature,
        _ => TokenError::Malformed,
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Extract the `kid` header without verifying the token.
///
/// The returned value is only good for key lookup; the token must still be
/// verified against the key it names.
///
/// # Errors
///
/// - `Malformed` - oversized, not three segments, bad base64 or JSON
/// - `InvalidSignature` - the header carries no usable `kid`
pub fn extract_kid(token: &str) -> Result<String, TokenError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(TokenError::Malformed);
    }

    let mut parts = token.split('.');
    let (Some(header_part), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(TokenError::Malformed);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        TokenError::Malformed
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        TokenError::Malformed
    })?;

    header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(TokenError::InvalidSignature)
}

/// Reject tokens whose `iat` is further ahead of now than `clock_skew`.
///
/// # Errors
///
/// Returns `TokenError::Malformed` when `iat` is too far in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), TokenError> {
    validate_iat_at(iat, clock_skew, chrono::Utc::now().timestamp())
}

pub(crate) fn validate_iat_at(iat: i64, clock_skew: Duration, now: i64) -> Result<(), TokenError> {
    // clock_skew is clamped to MAX_CLOCK_SKEW, well within i64
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(TokenError::Malformed);
    }

    Ok(())
}

/// Decode an Ed25519 public key from its PEM wrapper into raw key bytes.
///
/// # Errors
///
/// Returns `base64::DecodeError` if the body is not valid base64.
pub fn decode_ed25519_public_key_pem(pem: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let b64: String = pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();

    base64::engine::general_purpose::STANDARD.decode(b64)
}
