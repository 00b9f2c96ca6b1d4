//! Budget protocol handlers: handshake, usage, return, refresh, rollover

use axum::{
    extract::{Path, State},
    Json,
};
use leasegate_core::{ControlError, HandshakeRequest, LeaseRefreshRequest, SweepReport, UsageInput};
use leasegate_ledger::LedgerError;
use leasegate_types::{
    AgentId, BudgetLease, LeaseId, Micros, ProviderKeyId, UsageDiscrepancy, UsageEvent,
};
use std::sync::Arc;
use tracing::debug;
use validator::Validate;

use crate::dto::{
    operator_or_default, BudgetRefreshBody, BudgetRefreshResponse, BudgetReturnBody,
    BudgetReturnResponse, HandshakeBody, HandshakeResponse, LeaseRefreshBody,
    LeaseRefreshResponse, RevokeBody, UsageReportBody, UsageReportResponse,
};
use crate::error::ApiResult;
use crate::extractors::{AdminAuth, ValidatedJson};
use crate::state::AppState;

/// A lease id that cannot be parsed names no lease
fn parse_lease_id(raw: &str) -> ApiResult<LeaseId> {
    LeaseId::parse(raw)
        .map_err(|_| ControlError::Ledger(LedgerError::not_found("lease", raw)).into())
}

/// Exchange an identity claim for a wrapped credential and a budget lease
pub async fn handshake(
    State(state): State<Arc<AppState>>,
    ValidatedJson(body): ValidatedJson<HandshakeBody>,
) -> ApiResult<Json<HandshakeResponse>> {
    let request = HandshakeRequest {
        token: body.ic_token,
        provider: body.provider.parse()?,
        provider_key_id: body
            .provider_key_id
            .as_deref()
            .map(ProviderKeyId::parse)
            .transpose()?,
        amount: body.requested_budget.map(Micros),
    };

    let grant = state.control.leases().handshake(request).await?;
    Ok(Json(grant.into()))
}

/// Close a lease and reserve a fresh one for the same agent and credential
pub async fn refresh_lease(
    State(state): State<Arc<AppState>>,
    Path(lease_id): Path<String>,
    ValidatedJson(body): ValidatedJson<LeaseRefreshBody>,
) -> ApiResult<Json<LeaseRefreshResponse>> {
    let request = LeaseRefreshRequest {
        token: body.ic_token,
        current_lease_id: parse_lease_id(&lease_id)?,
        amount: body.requested_budget.map(Micros),
    };

    let refresh = state.control.leases().refresh_lease(request).await?;
    Ok(Json(refresh.into()))
}

/// Charge one LLM call against its lease
pub async fn report_usage(
    State(state): State<Arc<AppState>>,
    ValidatedJson(body): ValidatedJson<UsageReportBody>,
) -> ApiResult<Json<UsageReportResponse>> {
    let lease_id = parse_lease_id(&body.lease_id)?;
    if let Some(request_id) = body.request_id.as_deref() {
        debug!(lease_id = %lease_id, request_id = request_id, "Usage report received");
    }

    let receipt = state
        .control
        .reconciler()
        .report_usage(UsageInput {
            lease_id,
            provider: body.provider.parse()?,
            model: body.model,
            tokens: body.tokens,
            cost: Micros(body.cost_microdollars),
        })
        .await?;
    Ok(Json(receipt.into()))
}

/// Close a lease and credit back what it did not spend
pub async fn return_lease(
    State(state): State<Arc<AppState>>,
    ValidatedJson(body): ValidatedJson<BudgetReturnBody>,
) -> ApiResult<Json<BudgetReturnResponse>> {
    let lease_id = parse_lease_id(&body.lease_id)?;
    let receipt = state
        .control
        .reconciler()
        .return_lease(&lease_id, Micros(body.spent_microdollars))
        .await?;
    Ok(Json(receipt.into()))
}

pub async fn refresh_budget(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    ValidatedJson(body): ValidatedJson<BudgetRefreshBody>,
) -> ApiResult<Json<BudgetRefreshResponse>> {
    let agent_id = AgentId::parse(&body.agent_id)?;
    let receipt = state
        .control
        .reconciler()
        .refresh_budget(
            &agent_id,
            Micros(body.additional_budget),
            operator_or_default(body.modifier_id.as_deref()),
            body.reason.as_deref().unwrap_or(""),
        )
        .await?;

    Ok(Json(BudgetRefreshResponse {
        agent_id: receipt.agent_id.into_string(),
        total_allocated: receipt.total_allocated.value(),
        budget_remaining: receipt.budget_remaining.value(),
    }))
}

/// Reclaim every lease past its expiry
pub async fn sweep(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> ApiResult<Json<SweepReport>> {
    Ok(Json(state.control.reconciler().reclaim_expired().await?))
}

pub async fn get_lease(
    State(state): State<Arc<AppState>>,
    Path(lease_id): Path<String>,
) -> ApiResult<Json<BudgetLease>> {
    let lease_id = parse_lease_id(&lease_id)?;
    Ok(Json(state.control.leases().get(&lease_id).await?))
}

pub async fn lease_usage(
    State(state): State<Arc<AppState>>,
    Path(lease_id): Path<String>,
) -> ApiResult<Json<Vec<UsageEvent>>> {
    let lease_id = parse_lease_id(&lease_id)?;
    Ok(Json(state.control.leases().usage(&lease_id).await?))
}

pub async fn lease_discrepancies(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(lease_id): Path<String>,
) -> ApiResult<Json<Vec<UsageDiscrepancy>>> {
    let lease_id = parse_lease_id(&lease_id)?;
    Ok(Json(state.control.leases().discrepancies(&lease_id).await?))
}

pub async fn revoke_lease(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(lease_id): Path<String>,
    body: Option<Json<RevokeBody>>,
) -> ApiResult<Json<BudgetReturnResponse>> {
    let lease_id = parse_lease_id(&lease_id)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate()?;
    let receipt = state
        .control
        .reconciler()
        .revoke_lease(&lease_id, operator_or_default(body.operator_id.as_deref()))
        .await?;
    Ok(Json(receipt.into()))
}
