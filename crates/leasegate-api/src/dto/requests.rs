//! Budget request DTOs

use leasegate_ledger::ApprovedRequest;
use leasegate_types::BudgetRequest;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBudgetRequestBody {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub agent_id: String,
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub requester_id: String,
    #[validate(range(min = 1, message = "must be positive"))]
    pub requested_amount: i64,
    /// Trimmed and length-checked by the workflow
    #[validate(length(max = 2000, message = "must be at most 2000 characters"))]
    pub justification: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DecisionBody {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub approver_id: String,
    #[serde(default)]
    #[validate(length(max = 500, message = "must be at most 500 characters"))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CancelBody {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub requester_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RequestListQuery {
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1, max = 500, message = "must be between 1 and 500"))]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalResponse {
    pub request: BudgetRequest,
    pub total_allocated: i64,
    pub budget_remaining: i64,
}

impl From<ApprovedRequest> for ApprovalResponse {
    fn from(approved: ApprovedRequest) -> Self {
        Self {
            request: approved.request,
            total_allocated: approved.budget.total_allocated.value(),
            budget_remaining: approved.budget.budget_remaining.value(),
        }
    }
}
