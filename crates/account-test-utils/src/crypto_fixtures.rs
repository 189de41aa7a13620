//! Deterministic cryptographic fixtures for testing
//!
//! Every key is derived from a one-byte seed, so the same seed always yields
//! the same key pair and therefore the same key ids.

use account_service::services::token_service::TokenIssuer;
use base64::engine::general_purpose;
use base64::Engine;
use common::jwt::{TokenKind, DEFAULT_CLOCK_SKEW};
use ring::signature::{Ed25519KeyPair, KeyPair};
use secrecy::SecretBox;
use std::time::Duration;
use thiserror::Error;

use crate::test_ids::{TEST_ACCESS_KEY_SEED, TEST_EMAIL_KEY_SEED, TEST_REFRESH_KEY_SEED};

/// Access token lifetime used by test issuers.
pub const TEST_ACCESS_TTL: Duration = Duration::from_secs(900);

/// Refresh token lifetime used by test issuers.
pub const TEST_REFRESH_TTL: Duration = Duration::from_secs(86_400);

/// Email-verification token lifetime used by test issuers.
pub const TEST_EMAIL_TTL: Duration = Duration::from_secs(3600);

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

/// Deterministic Ed25519 signing key.
///
/// # Returns
/// * `Ok((public_key_pem, private_key_pkcs8))`
pub fn test_signing_key(seed: u8) -> Result<(String, Vec<u8>), FixtureError> {
    let seed_bytes = seed_bytes(seed);

    let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
        .map_err(|e| FixtureError::Crypto(format!("Failed to derive test keypair: {e:?}")))?;

    let public_key_pem = format!(
        "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----",
        general_purpose::STANDARD.encode(key_pair.public_key().as_ref())
    );

    Ok((public_key_pem, pkcs8_v1(&seed_bytes)))
}

/// Deterministic PKCS#8 private key wrapped the way `Config` holds it.
pub fn test_secret_key(seed: u8) -> SecretBox<Vec<u8>> {
    let (_, pkcs8) = test_signing_key(seed).expect("test key derivation never fails");
    SecretBox::new(Box::new(pkcs8))
}

/// Base64 of the deterministic PKCS#8 key, as read from the environment.
pub fn test_signing_key_base64(seed: u8) -> String {
    let (_, pkcs8) = test_signing_key(seed).expect("test key derivation never fails");
    general_purpose::STANDARD.encode(pkcs8)
}

/// Token issuer with all three kinds configured from fixed seeds.
pub fn test_token_issuer() -> TokenIssuer {
    TokenIssuer::new(DEFAULT_CLOCK_SKEW)
        .with_kind(TokenKind::Access, test_secret_key(TEST_ACCESS_KEY_SEED), TEST_ACCESS_TTL)
        .and_then(|issuer| {
            issuer.with_kind(
                TokenKind::Refresh,
                test_secret_key(TEST_REFRESH_KEY_SEED),
                TEST_REFRESH_TTL,
            )
        })
        .and_then(|issuer| {
            issuer.with_kind(
                TokenKind::EmailVerification,
                test_secret_key(TEST_EMAIL_KEY_SEED),
                TEST_EMAIL_TTL,
            )
        })
        .expect("fixture keys are valid Ed25519 keys")
}

/// Deterministic 32-byte HMAC key for login code hashing.
pub fn test_code_hash_key() -> Vec<u8> {
    (0u8..32).map(|i| i.wrapping_mul(7).wrapping_add(3)).collect()
}

fn seed_bytes(seed: u8) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = seed.wrapping_mul(i as u8 + 1).wrapping_add(i as u8);
    }
    bytes[0] = seed;
    bytes
}

/// PKCS#8 v1 document (RFC 5208) around a raw Ed25519 seed.
fn pkcs8_v1(seed: &[u8; 32]) -> Vec<u8> {
    let mut der = Vec::with_capacity(48);
    // SEQUENCE, 46 bytes
    der.extend_from_slice(&[0x30, 0x2e]);
    // version INTEGER 0
    der.extend_from_slice(&[0x02, 0x01, 0x00]);
    // AlgorithmIdentifier { OID 1.3.101.112 }
    der.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    // privateKey OCTET STRING { OCTET STRING seed }
    der.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    der.extend_from_slice(seed);
    der
}
