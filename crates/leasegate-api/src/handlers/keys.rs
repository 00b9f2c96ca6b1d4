//! Provider key handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use leasegate_crypto::SecretString;
use leasegate_types::{ProviderKeyId, ProviderKeyInfo};
use std::sync::Arc;

use crate::dto::{AddProviderKeyBody, SetKeyEnabledBody};
use crate::error::ApiResult;
use crate::extractors::{AdminAuth, ValidatedJson};
use crate::state::AppState;

/// Seal and store a provider credential; only metadata comes back
pub async fn add_provider_key(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    ValidatedJson(body): ValidatedJson<AddProviderKeyBody>,
) -> ApiResult<(StatusCode, Json<ProviderKeyInfo>)> {
    let AddProviderKeyBody {
        provider,
        secret,
        description,
    } = body;
    let info = state
        .control
        .provider_keys()
        .add(provider.parse()?, SecretString::new(secret), description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(info)))
}

pub async fn list_provider_keys(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> ApiResult<Json<Vec<ProviderKeyInfo>>> {
    Ok(Json(state.control.provider_keys().list().await?))
}

pub async fn set_provider_key_enabled(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(key_id): Path<String>,
    ValidatedJson(body): ValidatedJson<SetKeyEnabledBody>,
) -> ApiResult<Json<ProviderKeyInfo>> {
    let key_id = ProviderKeyId::parse(&key_id)?;
    Ok(Json(
        state
            .control
            .provider_keys()
            .set_enabled(&key_id, body.enabled)
            .await?,
    ))
}
