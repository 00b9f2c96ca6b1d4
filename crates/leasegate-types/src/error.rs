//! Error types for LeaseGate
//!
//! [`ErrorKind`] is the stable, caller-visible classification every crate's
//! error maps onto. [`TypeError`] covers failures of the domain types
//! themselves (parsing, arithmetic, state transitions).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable error classification exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Identity claim missing, invalid, expired, or lacking a permission
    Authentication,
    /// Not enough budget remaining
    Budget,
    /// Operation not valid for the lease's current state
    LeaseState,
    /// Encryption or decryption failure
    Crypto,
    /// State machine conflict (e.g. deciding a decided request)
    Conflict,
    /// Referenced entity does not exist
    NotFound,
    /// Malformed or out-of-range input
    Validation,
    /// Persistence failure
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Authentication => "authentication",
            ErrorKind::Budget => "budget",
            ErrorKind::LeaseState => "lease_state",
            ErrorKind::Crypto => "crypto",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain type errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    // ========================================================================
    // Parsing Errors
    // ========================================================================
    #[error("Invalid id '{value}': {reason}")]
    InvalidId { value: String, reason: String },

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    // ========================================================================
    // Amount Errors
    // ========================================================================
    #[error("Amount overflow during arithmetic operation")]
    AmountOverflow,

    #[error("Invalid {field}: {reason}")]
    InvalidAmount { field: String, reason: String },

    #[error("Budget invariant violated: {0}")]
    BudgetInvariant(String),

    // ========================================================================
    // State Errors
    // ========================================================================
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
}

impl TypeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TypeError::InvalidTransition { .. } => ErrorKind::Conflict,
            TypeError::BudgetInvariant(_) => ErrorKind::Storage,
            _ => ErrorKind::Validation,
        }
    }
}
