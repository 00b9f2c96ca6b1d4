//! Protocol errors

use leasegate_auth::AuthError;
use leasegate_crypto::CryptoError;
use leasegate_ledger::LedgerError;
use leasegate_types::{ErrorKind, TypeError};
use thiserror::Error;

/// Errors raised by the budget control protocol
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Cryptographic failure: {0}")]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Provider key not found: {0}")]
    ProviderKeyNotFound(String),

    #[error("Provider key {0} is disabled")]
    ProviderKeyDisabled(String),
}

impl ControlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControlError::Auth(e) => e.kind(),
            ControlError::Crypto(e) => e.kind(),
            ControlError::Ledger(e) => e.kind(),
            ControlError::Validation(_) | ControlError::ProviderKeyDisabled(_) => {
                ErrorKind::Validation
            }
            ControlError::ProviderKeyNotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::Auth(e) => e.error_code(),
            ControlError::Crypto(CryptoError::DecryptionFailed) => "DECRYPTION_FAILED",
            ControlError::Crypto(CryptoError::MalformedEnvelope(_)) => "MALFORMED_ENVELOPE",
            ControlError::Crypto(CryptoError::UnsupportedVersion(_)) => "UNSUPPORTED_VERSION",
            ControlError::Crypto(_) => "CRYPTO_ERROR",
            ControlError::Ledger(e) => match e {
                LedgerError::NotFound { entity: "agent", .. } => "AGENT_NOT_FOUND",
                LedgerError::NotFound { entity: "lease", .. } => "LEASE_NOT_FOUND",
                LedgerError::NotFound { entity: "budget request", .. } => "REQUEST_NOT_FOUND",
                LedgerError::NotFound { .. } => "NOT_FOUND",
                LedgerError::Duplicate(_) => "DUPLICATE",
                LedgerError::InsufficientBudget { .. } => "INSUFFICIENT_BUDGET",
                LedgerError::BudgetMismatch { .. } => "INVALID_CLAIM",
                LedgerError::LeaseClosed { .. } => "LEASE_CLOSED",
                LedgerError::LeaseExpired { .. } => "LEASE_EXPIRED",
                LedgerError::ProviderMismatch { .. } => "PROVIDER_MISMATCH",
                LedgerError::RequestConflict { .. } => "REQUEST_CONFLICT",
                LedgerError::Forbidden(_) => "FORBIDDEN",
                LedgerError::InvalidInput(_) => "VALIDATION_ERROR",
                _ => "STORAGE_ERROR",
            },
            ControlError::Validation(_) => "VALIDATION_ERROR",
            ControlError::ProviderKeyNotFound(_) => "PROVIDER_KEY_NOT_FOUND",
            ControlError::ProviderKeyDisabled(_) => "PROVIDER_KEY_DISABLED",
        }
    }

    /// Storage failure that might succeed if retried later
    pub fn is_transient(&self) -> bool {
        matches!(self, ControlError::Ledger(e) if e.is_transient())
    }
}

impl From<TypeError> for ControlError {
    fn from(err: TypeError) -> Self {
        ControlError::Validation(err.to_string())
    }
}

pub type ControlResult<T> = Result<T, ControlError>;
