//! Budget request workflow
//!
//! ```text
//! Pending ──approve──▶ Approved
//!    │ ────reject───▶ Rejected
//!    └─────cancel───▶ Cancelled
//! ```
//!
//! Every terminal state is final. Approval raises the agent's allocation by
//! the requested increase in the same transaction as the status change.

use leasegate_ledger::{ApprovedRequest, NewBudgetRequest, RequestFilter};
use leasegate_types::*;
use std::sync::Arc;

use crate::error::{ControlError, ControlResult};
use crate::ControlContext;

/// Longest requester or approver id accepted
const MAX_ACTOR_LEN: usize = 100;

/// Longest decision note accepted
const MAX_NOTE_LEN: usize = 500;

#[derive(Debug, Clone)]
pub struct BudgetRequestInput {
    pub agent_id: AgentId,
    pub requester_id: String,
    pub amount: Micros,
    pub justification: String,
}

/// Budget increase requests
pub struct RequestWorkflow {
    ctx: Arc<ControlContext>,
}

impl RequestWorkflow {
    pub(crate) fn new(ctx: Arc<ControlContext>) -> Self {
        Self { ctx }
    }

    pub async fn create(&self, input: BudgetRequestInput) -> ControlResult<BudgetRequest> {
        input.amount.ensure_positive("amount")?;
        let requester_id = actor("requester_id", &input.requester_id)?;
        let justification = normalize_justification(&input.justification)?;

        let new = NewBudgetRequest {
            agent_id: input.agent_id,
            requester_id: requester_id.to_string(),
            amount: input.amount,
            justification,
        };
        Ok(self
            .ctx
            .ledger
            .requests()
            .create(&new, self.ctx.clock.now())
            .await?)
    }

    pub async fn get(&self, request_id: &RequestId) -> ControlResult<BudgetRequest> {
        Ok(self.ctx.ledger.requests().get(request_id).await?)
    }

    pub async fn list(&self, filter: &RequestFilter) -> ControlResult<Vec<BudgetRequest>> {
        Ok(self.ctx.ledger.requests().list(filter).await?)
    }

    pub async fn approve(&self, request_id: &RequestId, approver_id: &str) -> ControlResult<ApprovedRequest> {
        let approver_id = actor("approver_id", approver_id)?;
        Ok(self
            .ctx
            .ledger
            .requests()
            .approve(request_id, approver_id, self.ctx.clock.now())
            .await?)
    }

    pub async fn reject(
        &self,
        request_id: &RequestId,
        approver_id: &str,
        note: Option<&str>,
    ) -> ControlResult<BudgetRequest> {
        let approver_id = actor("approver_id", approver_id)?;
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        if let Some(note) = note {
            if note.chars().count() > MAX_NOTE_LEN {
                return Err(ControlError::Validation(format!(
                    "note exceeds {} characters",
                    MAX_NOTE_LEN
                )));
            }
        }
        Ok(self
            .ctx
            .ledger
            .requests()
            .reject(request_id, approver_id, note, self.ctx.clock.now())
            .await?)
    }

    pub async fn cancel(&self, request_id: &RequestId, requester_id: &str) -> ControlResult<BudgetRequest> {
        let requester_id = actor("requester_id", requester_id)?;
        Ok(self
            .ctx
            .ledger
            .requests()
            .cancel(request_id, requester_id, self.ctx.clock.now())
            .await?)
    }
}

fn actor<'a>(field: &str, value: &'a str) -> ControlResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ControlError::Validation(format!("{} must not be empty", field)));
    }
    if value.chars().count() > MAX_ACTOR_LEN {
        return Err(ControlError::Validation(format!(
            "{} exceeds {} characters",
            field, MAX_ACTOR_LEN
        )));
    }
    Ok(value)
}
