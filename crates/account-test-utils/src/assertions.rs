//! Custom test assertions for expressive tests
//!
//! Provides trait-based assertions for issued tokens.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use common::jwt::TokenKind;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct JwtHeader {
    alg: String,
    typ: String,
    #[serde(default)]
    kid: Option<String>,
}

fn segments(token: &str) -> Vec<&str> {
    let parts: Vec<&str> = token.split('.').collect();
    assert_eq!(
        parts.len(),
        3,
        "JWT must have 3 parts (header.payload.signature), got {}",
        parts.len()
    );
    parts
}

fn header(token: &str) -> JwtHeader {
    let raw = URL_SAFE_NO_PAD
        .decode(segments(token)[0])
        .expect("Invalid JWT header encoding");
    serde_json::from_slice(&raw).expect("Failed to parse JWT header")
}

fn payload(token: &str) -> Value {
    let raw = URL_SAFE_NO_PAD
        .decode(segments(token)[1])
        .expect("Invalid JWT payload encoding");
    serde_json::from_slice(&raw).expect("Failed to parse JWT claims")
}

/// Custom assertions for issued tokens
///
/// # Example
/// ```rust,ignore
/// session.access_token
///     .assert_valid_jwt()
///     .assert_kind(TokenKind::Access)
///     .assert_for_subject(&account_id.to_string());
/// ```
pub trait TokenAssertions {
    /// Assert the token is a compact EdDSA JWT with a key id.
    fn assert_valid_jwt(&self) -> &Self;

    /// Assert the key id belongs to `kind`.
    fn assert_kind(&self, kind: TokenKind) -> &Self;

    fn assert_signed_by(&self, key_id: &str) -> &Self;

    /// Assert `exp - now` is within 5 seconds of `seconds`.
    fn assert_expires_in(&self, seconds: u64) -> &Self;

    fn assert_for_subject(&self, subject: &str) -> &Self;

    /// Assert the payload carries `claim` with the string value `expected`.
    fn assert_claim(&self, claim: &str, expected: &str) -> &Self;
}

impl TokenAssertions for str {
    fn assert_valid_jwt(&self) -> &Self {
        let header = header(self);
        assert_eq!(header.alg, "EdDSA", "Expected EdDSA algorithm");
        assert_eq!(header.typ, "JWT", "Expected JWT type");
        assert!(header.kid.is_some(), "Expected a key id in the header");

        let claims = payload(self);
        for required in ["sub", "iat", "exp"] {
            assert!(
                claims.get(required).is_some(),
                "Token is missing required claim '{required}'"
            );
        }

        self
    }

    fn assert_kind(&self, kind: TokenKind) -> &Self {
        let kid = header(self).kid.unwrap_or_default();
        let prefix = format!("{}-", kind.as_str());
        assert!(
            kid.starts_with(&prefix),
            "Expected a {kind} key id, got '{kid}'"
        );
        self
    }

    fn assert_signed_by(&self, key_id: &str) -> &Self {
        let kid = header(self).kid;
        assert_eq!(
            kid.as_deref(),
            Some(key_id),
            "Expected key_id '{key_id}', got {kid:?}"
        );
        self
    }

    fn assert_expires_in(&self, seconds: u64) -> &Self {
        let exp = payload(self)
            .get("exp")
            .and_then(Value::as_i64)
            .expect("Token has no numeric exp");
        let expires_in = exp - chrono::Utc::now().timestamp();

        assert!(
            (expires_in - seconds as i64).abs() <= 5,
            "Expected token to expire in {seconds} seconds, but expires in {expires_in} seconds"
        );
        self
    }

    fn assert_for_subject(&self, subject: &str) -> &Self {
        self.assert_claim("sub", subject)
    }

    fn assert_claim(&self, claim: &str, expected: &str) -> &Self {
        let claims = payload(self);
        let actual = claims.get(claim).and_then(Value::as_str);
        assert_eq!(
            actual,
            Some(expected),
            "Expected claim '{claim}' to be '{expected}', got {actual:?}"
        );
        self
    }
}

impl TokenAssertions for String {
    fn assert_valid_jwt(&self) -> &Self {
        self.as_str().assert_valid_jwt();
        self
    }

    fn assert_kind(&self, kind: TokenKind) -> &Self {
        self.as_str().assert_kind(kind);
        self
    }

    fn assert_signed_by(&self, key_id: &str) -> &Self {
        self.as_str().assert_signed_by(key_id);
        self
    }

    fn assert_expires_in(&self, seconds: u64) -> &Self {
        self.as_str().assert_expires_in(seconds);
        self
    }

    fn assert_for_subject(&self, subject: &str) -> &Self {
        self.as_str().assert_for_subject(subject);
        self
    }

    fn assert_claim(&self, claim: &str, expected: &str) -> &Self {
        self.as_str().assert_claim(claim, expected);
        self
    }
}
