//! API error handling
//!
//! Every failure leaves the API as `{code, kind, msg}` with a status derived
//! from the error kind. Storage and crypto details are logged, never echoed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use leasegate_auth::AuthError;
use leasegate_core::ControlError;
use leasegate_types::{ErrorKind, TypeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Control(#[from] ControlError),

    /// Body or query could not be parsed
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Body or query parsed but failed field validation
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Control(e) => e.kind(),
            Self::BadRequest(_) | Self::ValidationError(_) => ErrorKind::Validation,
        }
    }

    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Control(e) => e.code(),
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::ValidationError(_) => "VALIDATION_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.error_code() {
            "LEASE_EXPIRED" => return StatusCode::GONE,
            "FORBIDDEN" => return StatusCode::FORBIDDEN,
            _ => {}
        }
        match self.kind() {
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::Budget => StatusCode::FORBIDDEN,
            ErrorKind::LeaseState | ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Crypto => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Storage => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message safe to show a caller
    fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Storage => "Storage temporarily unavailable".to_string(),
            ErrorKind::Crypto => "Credential processing failed".to_string(),
            _ => self.to_string(),
        }
    }
}

/// API error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable error code, e.g. `INSUFFICIENT_BUDGET`
    pub code: String,
    /// Error classification, e.g. `budget`
    pub kind: ErrorKind,
    /// Human-readable message
    pub msg: String,
}

impl From<&ApiError> for ErrorResponse {
    fn from(err: &ApiError) -> Self {
        Self {
            code: err.error_code().to_string(),
            kind: err.kind(),
            msg: err.public_message(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self.kind() {
            ErrorKind::Storage => tracing::error!(error = %self, "Storage error"),
            ErrorKind::Crypto => {
                tracing::error!(error = %self, security_event = true, "Crypto error")
            }
            _ => tracing::debug!(error = %self, status = status.as_u16(), "Request failed"),
        }

        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Control(ControlError::Auth(err))
    }
}

impl From<TypeError> for ApiError {
    fn from(err: TypeError) -> Self {
        Self::ValidationError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(format_validation_errors(&err))
    }
}

/// Flatten field errors into `field: message` pairs
pub fn format_validation_errors(err: &validator::ValidationErrors) -> String {
    let mut messages: Vec<String> = err
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |e| {
                format!(
                    "{}: {}",
                    field,
                    e.message.as_ref().map(|m| m.as_ref()).unwrap_or("invalid")
                )
            })
        })
        .collect();
    messages.sort();
    messages.join(", ")
}
