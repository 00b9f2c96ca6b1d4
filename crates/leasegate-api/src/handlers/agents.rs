//! Agent registration and budget status handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use leasegate_core::{AgentRegistration, BudgetStatus};
use leasegate_types::{AgentBudget, AgentId, BudgetHistoryEntry, BudgetLease, Micros};
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

use crate::dto::{
    operator_or_default, HistoryQuery, IssueTokenBody, LeaseListQuery, RegisterAgentBody,
    TokenResponse, ZeroBudgetBody,
};
use crate::error::ApiResult;
use crate::extractors::{AdminAuth, ValidatedJson, ValidatedQuery};
use crate::state::AppState;

/// Create an agent with a fresh budget and return its identity claim
pub async fn register_agent(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    ValidatedJson(body): ValidatedJson<RegisterAgentBody>,
) -> ApiResult<(StatusCode, Json<AgentRegistration>)> {
    let registration = state
        .control
        .agents()
        .register(
            Micros(body.initial_allocation),
            operator_or_default(body.modifier_id.as_deref()),
            body.token_lifetime_secs.map(Duration::from_secs),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(agent_id): Path<String>,
    body: Option<Json<IssueTokenBody>>,
) -> ApiResult<Json<TokenResponse>> {
    let agent_id = AgentId::parse(&agent_id)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate()?;
    let token = state
        .control
        .agents()
        .issue_token(&agent_id, body.token_lifetime_secs.map(Duration::from_secs))
        .await?;
    Ok(Json(TokenResponse {
        agent_id: agent_id.into_string(),
        ic_token: token,
    }))
}

pub async fn budget_status(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<BudgetStatus>> {
    let agent_id = AgentId::parse(&agent_id)?;
    Ok(Json(state.control.agents().budget_status(&agent_id).await?))
}

/// Newest allocation changes first
pub async fn budget_history(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    ValidatedQuery(query): ValidatedQuery<HistoryQuery>,
) -> ApiResult<Json<Vec<BudgetHistoryEntry>>> {
    let agent_id = AgentId::parse(&agent_id)?;
    Ok(Json(
        state.control.agents().history(&agent_id, query.limit).await?,
    ))
}

pub async fn list_leases(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    ValidatedQuery(query): ValidatedQuery<LeaseListQuery>,
) -> ApiResult<Json<Vec<BudgetLease>>> {
    let agent_id = AgentId::parse(&agent_id)?;
    Ok(Json(
        state
            .control
            .agents()
            .list_leases(&agent_id, query.open_only, query.limit)
            .await?,
    ))
}

/// Drop the unspent, unreserved part of an agent's allocation
pub async fn zero_budget(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(agent_id): Path<String>,
    body: Option<Json<ZeroBudgetBody>>,
) -> ApiResult<Json<AgentBudget>> {
    let agent_id = AgentId::parse(&agent_id)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate()?;
    let budget = state
        .control
        .reconciler()
        .zero_budget(
            &agent_id,
            operator_or_default(body.modifier_id.as_deref()),
            body.reason.as_deref().unwrap_or("budget zeroed"),
        )
        .await?;
    Ok(Json(budget))
}
