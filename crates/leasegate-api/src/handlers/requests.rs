//! Budget request workflow handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use leasegate_core::BudgetRequestInput;
use leasegate_ledger::RequestFilter;
use leasegate_types::{AgentId, BudgetRequest, Micros, RequestId};
use std::sync::Arc;

use crate::dto::{
    ApprovalResponse, CancelBody, CreateBudgetRequestBody, DecisionBody, RequestListQuery,
};
use crate::error::ApiResult;
use crate::extractors::{AdminAuth, ValidatedJson, ValidatedQuery};
use crate::state::AppState;

pub async fn create_request(
    State(state): State<Arc<AppState>>,
    ValidatedJson(body): ValidatedJson<CreateBudgetRequestBody>,
) -> ApiResult<(StatusCode, Json<BudgetRequest>)> {
    let request = state
        .control
        .requests()
        .create(BudgetRequestInput {
            agent_id: AgentId::parse(&body.agent_id)?,
            requester_id: body.requester_id,
            amount: Micros(body.requested_amount),
            justification: body.justification,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    ValidatedQuery(query): ValidatedQuery<RequestListQuery>,
) -> ApiResult<Json<Vec<BudgetRequest>>> {
    let filter = RequestFilter {
        agent_id: query.agent_id.as_deref().map(AgentId::parse).transpose()?,
        status: query.status.as_deref().map(str::parse).transpose()?,
        limit: query.limit,
    };
    Ok(Json(state.control.requests().list(&filter).await?))
}

pub async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> ApiResult<Json<BudgetRequest>> {
    let request_id = RequestId::parse(&request_id)?;
    Ok(Json(state.control.requests().get(&request_id).await?))
}

/// Approve a pending request and raise the agent's allocation
pub async fn approve_request(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(request_id): Path<String>,
    ValidatedJson(body): ValidatedJson<DecisionBody>,
) -> ApiResult<Json<ApprovalResponse>> {
    let request_id = RequestId::parse(&request_id)?;
    let approved = state
        .control
        .requests()
        .approve(&request_id, &body.approver_id)
        .await?;
    Ok(Json(approved.into()))
}

pub async fn reject_request(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(request_id): Path<String>,
    ValidatedJson(body): ValidatedJson<DecisionBody>,
) -> ApiResult<Json<BudgetRequest>> {
    let request_id = RequestId::parse(&request_id)?;
    Ok(Json(
        state
            .control
            .requests()
            .reject(&request_id, &body.approver_id, body.note.as_deref())
            .await?,
    ))
}

/// Withdraw a pending request; only its requester may
pub async fn cancel_request(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
    ValidatedJson(body): ValidatedJson<CancelBody>,
) -> ApiResult<Json<BudgetRequest>> {
    let request_id = RequestId::parse(&request_id)?;
    Ok(Json(
        state
            .control
            .requests()
            .cancel(&request_id, &body.requester_id)
            .await?,
    ))
}
