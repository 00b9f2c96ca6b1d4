//! Custom Axum Extractors
//!
//! Request extractors for operator authentication and validated input.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::error::{format_validation_errors, ApiError};
use crate::state::AppState;

fn error_response(error: ApiError) -> Response {
    error.into_response()
}

// =============================================================================
// Operator Extractor
// =============================================================================

/// Proof that the request carried the operator bearer token
#[derive(Debug, Clone, Copy)]
pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        state
            .admin
            .check_header(header)
            .map(|_| AdminAuth)
            .map_err(|e| error_response(ApiError::from(e)))
    }
}

// =============================================================================
// Validated Query Extractor
// =============================================================================

/// Query extractor with validation
pub struct ValidatedQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned + validator::Validate,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| error_response(ApiError::BadRequest(e.body_text())))?;

        value.validate().map_err(|e| {
            error_response(ApiError::ValidationError(format_validation_errors(&e)))
        })?;

        Ok(ValidatedQuery(value))
    }
}

// =============================================================================
// Validated JSON Extractor
// =============================================================================

/// JSON extractor with validation
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + validator::Validate,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| error_response(ApiError::BadRequest(e.body_text())))?;

        value.validate().map_err(|e| {
            error_response(ApiError::ValidationError(format_validation_errors(&e)))
        })?;

        Ok(ValidatedJson(value))
    }
}
