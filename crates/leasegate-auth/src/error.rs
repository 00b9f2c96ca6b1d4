//! Authentication error types
//!
//! Messages are safe for external exposure: they never echo token contents.

use leasegate_types::ErrorKind;
use thiserror::Error;

/// Result type alias for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    // =========================================================================
    // Token Errors
    // =========================================================================
    #[error("Identity token is missing")]
    MissingToken,

    #[error("Identity token exceeds {max} characters")]
    TokenTooLong { max: usize },

    /// Malformed, badly signed, or otherwise unverifiable
    #[error("Invalid identity token")]
    InvalidToken,

    #[error("Identity token has expired")]
    TokenExpired,

    #[error("Identity token issuer is not trusted")]
    InvalidIssuer,

    /// Token verified but a claim is unusable
    #[error("Invalid identity claim: {0}")]
    InvalidClaim(String),

    #[error("Identity lacks permission '{0}'")]
    MissingPermission(String),

    // =========================================================================
    // Operator Errors
    // =========================================================================
    #[error("Operator credential required")]
    OperatorRequired,

    #[error("Invalid operator credential")]
    InvalidOperatorCredential,

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal authentication error")]
    Internal(String),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Internal(_) => ErrorKind::Storage,
            _ => ErrorKind::Authentication,
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "MISSING_TOKEN",
            AuthError::TokenTooLong { .. } => "TOKEN_TOO_LONG",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::InvalidIssuer => "INVALID_ISSUER",
            AuthError::InvalidClaim(_) => "INVALID_CLAIM",
            AuthError::MissingPermission(_) => "MISSING_PERMISSION",
            AuthError::OperatorRequired => "OPERATOR_REQUIRED",
            AuthError::InvalidOperatorCredential => "INVALID_OPERATOR_CREDENTIAL",
            AuthError::Internal(_) => "AUTH_INTERNAL",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
        match err.kind() {
            JwtErrorKind::ExpiredSignature => AuthError::TokenExpired,
            JwtErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            JwtErrorKind::MissingRequiredClaim(claim) => {
                AuthError::InvalidClaim(format!("missing required claim '{}'", claim))
            }
            _ => AuthError::InvalidToken,
        }
    }
}
