//! Observability for the account service
//!
//! # Privacy by Default
//!
//! All instrumentation uses `#[instrument(skip_all)]` and explicit safe field allow-listing.
//! Fields are categorized as:
//! - **SAFE**: Can be logged in plaintext (enums, operation names, counts)
//! - **HASHED**: Must be SHA-256 hashed for correlation (account ids, emails)
//! - **NEVER**: Must never appear in logs (passwords, provider tokens, login codes, keys)

pub mod metrics;

use crate::errors::AccountError;
use sha2::{Digest, Sha256};

/// Hash a field value for correlation in logs (SHA-256, first 8 hex chars)
///
/// Used for account ids and emails, which need correlation across log
/// entries but should not be stored in plaintext.
///
/// # Privacy
///
/// This is NOT cryptographically secure for secrets - it's a one-way hash
/// for correlation purposes only.
pub fn hash_for_correlation(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let result = hasher.finalize();
    // Take first 8 hex chars (32 bits) - enough for correlation, limits reversibility
    hex::encode(result.get(..4).unwrap_or_default())
}

/// Error categories for metrics labels (bounded cardinality)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed input
    Validation,
    /// Failed credential, code or token verification
    Authentication,
    /// Conflicts and missing records
    State,
    /// Storage, cache, network or signing failures
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::State => "state",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl From<&AccountError> for ErrorCategory {
    fn from(err: &AccountError) -> Self {
        match err {
            AccountError::InvalidInput(_) => ErrorCategory::Validation,
            AccountError::Unauthorized(_) => ErrorCategory::Authentication,
            AccountError::Conflict(_) | AccountError::NotFound(_) => ErrorCategory::State,
            AccountError::InternalFailure(_) => ErrorCategory::Internal,
        }
    }
}
