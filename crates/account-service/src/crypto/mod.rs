//! Cryptographic helpers: signing keys, password hashing, random codes.

use crate::config::BCRYPT_COST_RANGE;
use crate::errors::AccountError;
use crate::models::SyncCode;
use base64::{engine::general_purpose, Engine as _};
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::{
    hmac,
    rand::{SecureRandom, SystemRandom},
    signature::{Ed25519KeyPair, KeyPair},
};
use serde::Serialize;
use tracing::instrument;

/// Random bytes behind every login code. Encodes to 43 URL-safe characters.
pub const LOGIN_CODE_BYTES: usize = 32;

const SYNC_CODE_BYTES: usize = 16;

/// Precomputed bcrypt hash (cost 12) of a value no caller knows.
///
/// Verified against when a credential lookup misses, so a miss costs the same
/// as a wrong password.
pub const DUMMY_BCRYPT_HASH: &str = "$2b$12$LQv3c1yqBWVHxkd0LHAkCOYz6TtxMQJqhN8/LewY5GyYqExt7YD3a";

/// Generate an Ed25519 key pair using CSPRNG
///
/// Returns (public_key_pem, private_key_pkcs8)
#[instrument(skip_all)]
pub fn generate_signing_key() -> Result<(String, Vec<u8>), AccountError> {
    let rng = SystemRandom::new();

    let pkcs8_bytes = Ed25519KeyPair::generate_pkcs8(&rng)
        .map_err(|e| AccountError::InternalFailure(format!("Keypair generation failed: {e}")))?;

    let public_key_pem = public_key_pem_from_pkcs8(pkcs8_bytes.as_ref())?;

    Ok((public_key_pem, pkcs8_bytes.as_ref().to_vec()))
}

/// Raw 32-byte public key of a PKCS#8 Ed25519 private key.
pub fn public_key_from_pkcs8(private_key_pkcs8: &[u8]) -> Result<Vec<u8>, AccountError> {
    let key_pair = Ed25519KeyPair::from_pkcs8_maybe_unchecked(private_key_pkcs8)
        .map_err(|e| AccountError::InternalFailure(format!("Invalid private key format: {e}")))?;
    Ok(key_pair.public_key().as_ref().to_vec())
}

/// PEM wrapper (base64 body) around the raw public key of a PKCS#8 private key.
pub fn public_key_pem_from_pkcs8(private_key_pkcs8: &[u8]) -> Result<String, AccountError> {
    let public_key_bytes = public_key_from_pkcs8(private_key_pkcs8)?;
    Ok(format!(
        "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----",
        general_purpose::STANDARD.encode(public_key_bytes)
    ))
}

/// Sign a claim set with an Ed25519 private key.
#[instrument(skip_all)]
pub fn sign_jwt<C: Serialize>(
    claims: &C,
    private_key_pkcs8: &[u8],
    key_id: &str,
) -> Result<String, AccountError> {
    let encoding_key = EncodingKey::from_ed_der(private_key_pkcs8);

    let mut header = Header::new(Algorithm::EdDSA);
    header.typ = Some("JWT".to_string());
    header.kid = Some(key_id.to_string());

    encode(&header, claims, &encoding_key)
        .map_err(|e| AccountError::InternalFailure(format!("JWT signing operation failed: {e}")))
}

/// Hash a password with bcrypt.
#[instrument(skip_all)]
pub fn hash_password(password: &SecretString, cost: u32) -> Result<String, AccountError> {
    if !BCRYPT_COST_RANGE.contains(&cost) {
        return Err(AccountError::InternalFailure(format!(
            "Invalid bcrypt cost: {} (must be {}-{})",
            cost,
            BCRYPT_COST_RANGE.start(),
            BCRYPT_COST_RANGE.end()
        )));
    }

    bcrypt::hash(password.expose_secret(), cost)
        .map_err(|e| AccountError::InternalFailure(format!("Password hashing failed: {e}")))
}

/// Verify a password against a bcrypt hash.
#[instrument(skip_all)]
pub fn verify_password(password: &SecretString, hash: &str) -> Result<bool, AccountError> {
    bcrypt::verify(password.expose_secret(), hash)
        .map_err(|e| AccountError::InternalFailure(format!("Password verification failed: {e}")))
}

/// Generate cryptographically secure random bytes
pub fn generate_random_bytes(len: usize) -> Result<Vec<u8>, AccountError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes).map_err(|e| {
        AccountError::InternalFailure(format!("Random bytes generation failed: {e}"))
    })?;
    Ok(bytes)
}

/// Random single-use login code, URL-safe so it survives redirects.
pub fn generate_login_code() -> Result<SecretString, AccountError> {
    let bytes = generate_random_bytes(LOGIN_CODE_BYTES)?;
    Ok(SecretString::from(
        general_purpose::URL_SAFE_NO_PAD.encode(bytes),
    ))
}

/// Fresh sync code for a lifecycle transition.
pub fn generate_sync_code() -> Result<SyncCode, AccountError> {
    Ok(SyncCode::new(hex::encode(generate_random_bytes(
        SYNC_CODE_BYTES,
    )?)))
}

/// Keyed hash for stored login codes.
///
/// The subject is bound into the MAC, so a hash copied between subjects never
/// matches.
pub struct LoginCodeHasher {
    key: hmac::Key,
}

impl LoginCodeHasher {
    #[must_use]
    pub fn new(key: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, key),
        }
    }

    /// Hex-encoded HMAC-SHA256 over subject and code.
    #[must_use]
    pub fn hash(&self, subject: &str, code: &str) -> String {
        let tag = hmac::sign(&self.key, &Self::message(subject, code));
        hex::encode(tag.as_ref())
    }

    /// Constant-time comparison against a stored hash.
    #[must_use]
    pub fn verify(&self, subject: &str, code: &str, stored_hash: &str) -> bool {
        let Ok(expected) = hex::decode(stored_hash) else {
            return false;
        };
        hmac::verify(&self.key, &Self::message(subject, code), &expected).is_ok()
    }

    fn message(subject: &str, code: &str) -> Vec<u8> {
        let mut message = Vec::with_capacity(subject.len() + code.len() + 1);
        message.extend_from_slice(subject.as_bytes());
        message.push(0);
        message.extend_from_slice(code.as_bytes());
        message
    }
}
