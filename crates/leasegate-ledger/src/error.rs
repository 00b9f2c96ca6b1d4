//! Ledger error types

use leasegate_types::{CloseReason, ErrorKind, Micros, Provider, RequestStatus, TypeError};
use thiserror::Error;

/// SQLite primary result codes that indicate lock contention
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Ledger operation errors
#[derive(Debug, Error)]
pub enum LedgerError {
    // =========================================================================
    // Infrastructure
    // =========================================================================
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    // =========================================================================
    // Lookup
    // =========================================================================
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Duplicate: {0}")]
    Duplicate(String),

    // =========================================================================
    // Budget
    // =========================================================================
    #[error("Insufficient budget: requested {requested}, available {available}")]
    InsufficientBudget { requested: Micros, available: Micros },

    #[error("Budget id does not match agent {agent_id}")]
    BudgetMismatch { agent_id: String },

    // =========================================================================
    // Lease State
    // =========================================================================
    #[error("Lease {lease_id} is closed ({reason})")]
    LeaseClosed { lease_id: String, reason: CloseReason },

    #[error("Lease {lease_id} has expired")]
    LeaseExpired { lease_id: String },

    #[error("Lease {lease_id} was issued for {expected}, not {actual}")]
    ProviderMismatch {
        lease_id: String,
        expected: Provider,
        actual: Provider,
    },

    // =========================================================================
    // Requests
    // =========================================================================
    #[error("Request {request_id} is already {current}")]
    RequestConflict {
        request_id: String,
        current: RequestStatus,
    },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::Duplicate(_) | LedgerError::RequestConflict { .. } => ErrorKind::Conflict,
            LedgerError::InsufficientBudget { .. } => ErrorKind::Budget,
            LedgerError::BudgetMismatch { .. } | LedgerError::Forbidden(_) => {
                ErrorKind::Authentication
            }
            LedgerError::LeaseClosed { .. } | LedgerError::LeaseExpired { .. } => {
                ErrorKind::LeaseState
            }
            LedgerError::ProviderMismatch { .. } | LedgerError::InvalidInput(_) => {
                ErrorKind::Validation
            }
            LedgerError::Connection(_)
            | LedgerError::Migration(_)
            | LedgerError::Query(_)
            | LedgerError::Constraint(_)
            | LedgerError::Corrupt(_) => ErrorKind::Storage,
        }
    }

    /// Lock contention or pool exhaustion; safe to retry the whole operation
    pub fn is_transient(&self) -> bool {
        match self {
            LedgerError::Query(err) => is_transient_sqlx(err),
            _ => false,
        }
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => {
            let primary = db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            matches!(primary, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED))
                || db.message().contains("database is locked")
        }
        _ => false,
    }
}

/// Classify database-level failures that carry domain meaning
pub(crate) fn classify(err: sqlx::Error, context: &str) -> LedgerError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return LedgerError::Duplicate(context.to_string());
        }
        if db.is_check_violation() || db.is_foreign_key_violation() {
            return LedgerError::Constraint(format!("{}: {}", context, db.message()));
        }
    }
    LedgerError::Query(err)
}

impl From<TypeError> for LedgerError {
    fn from(err: TypeError) -> Self {
        LedgerError::Corrupt(err.to_string())
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
