use common::jwt::TokenError;
use thiserror::Error;

/// Error taxonomy surfaced by every account operation.
///
/// Only `InternalFailure` is worth retrying. The other variants describe the
/// request itself and will fail the same way again.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal failure: {0}")]
    InternalFailure(String),
}

impl AccountError {
    /// Whether the caller may retry the whole operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, AccountError::InternalFailure(_))
    }

    /// Prefix the message with the fan-out branch that produced it.
    #[must_use]
    pub fn in_step(self, step: &str) -> Self {
        match self {
            AccountError::InvalidInput(m) => AccountError::InvalidInput(format!("{step}: {m}")),
            AccountError::Unauthorized(m) => AccountError::Unauthorized(format!("{step}: {m}")),
            AccountError::Conflict(m) => AccountError::Conflict(format!("{step}: {m}")),
            AccountError::NotFound(m) => AccountError::NotFound(format!("{step}: {m}")),
            AccountError::InternalFailure(m) => {
                AccountError::InternalFailure(format!("{step}: {m}"))
            }
        }
    }

    /// Message without the variant prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            AccountError::InvalidInput(m)
            | AccountError::Unauthorized(m)
            | AccountError::Conflict(m)
            | AccountError::NotFound(m)
            | AccountError::InternalFailure(m) => m,
        }
    }
}

impl From<TokenError> for AccountError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Internal(msg) => AccountError::InternalFailure(msg),
            other => AccountError::Unauthorized(other.to_string()),
        }
    }
}
