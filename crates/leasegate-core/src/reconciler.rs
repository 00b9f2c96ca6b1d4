//! Usage reconciliation: charging reported spend, returning leases,
//! refreshing budgets

use leasegate_ledger::{ClosedLease, UsageReport};
use leasegate_types::*;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::error::{ControlError, ControlResult};
use crate::ControlContext;

/// Longest model name accepted in a usage report
pub const MAX_MODEL_LEN: usize = 100;

/// One usage report from an agent
#[derive(Debug, Clone)]
pub struct UsageInput {
    pub lease_id: LeaseId,
    pub provider: Provider,
    pub model: String,
    pub tokens: i64,
    pub cost: Micros,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageReceipt {
    pub lease_id: LeaseId,
    pub charged: Micros,
    pub unbilled: Micros,
    pub lease_spent: Micros,
    pub lease_remaining: Micros,
    pub budget_remaining: Micros,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReturnReceipt {
    pub lease_id: LeaseId,
    pub status: LeaseStatus,
    pub spent: Micros,
    pub returned: Micros,
    pub budget_remaining: Micros,
}

impl From<ClosedLease> for ReturnReceipt {
    fn from(closed: ClosedLease) -> Self {
        Self {
            lease_id: closed.lease.lease_id,
            status: closed.lease.status,
            spent: closed.lease.spent,
            returned: closed.returned,
            budget_remaining: closed.budget_remaining,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReceipt {
    pub agent_id: AgentId,
    pub total_allocated: Micros,
    pub budget_remaining: Micros,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub reclaimed: usize,
    pub returned: Micros,
}

/// Reconciles reported spend with reserved budget
pub struct UsageReconciler {
    ctx: Arc<ControlContext>,
}

impl UsageReconciler {
    pub(crate) fn new(ctx: Arc<ControlContext>) -> Self {
        Self { ctx }
    }

    /// Charge one reported call against its lease
    pub async fn report_usage(&self, input: UsageInput) -> ControlResult<UsageReceipt> {
        let model = input.model.trim();
        if model.is_empty() {
            return Err(ControlError::Validation("model must not be empty".to_string()));
        }
        if model.chars().count() > MAX_MODEL_LEN {
            return Err(ControlError::Validation(format!(
                "model exceeds {} characters",
                MAX_MODEL_LEN
            )));
        }
        input.cost.ensure_non_negative("cost")?;
        if input.tokens < 0 {
            return Err(ControlError::Validation("tokens must be non-negative".to_string()));
        }

        let report = UsageReport {
            lease_id: input.lease_id,
            provider: input.provider,
            model: model.to_string(),
            tokens: input.tokens,
            cost: input.cost,
        };
        let outcome = self
            .ctx
            .ledger
            .leases()
            .apply_usage(&report, self.ctx.clock.now())
            .await?;

        Ok(UsageReceipt {
            lease_id: outcome.lease.lease_id.clone(),
            charged: outcome.event.charged,
            unbilled: outcome.unbilled,
            lease_spent: outcome.lease.spent,
            lease_remaining: outcome.lease.remaining(),
            budget_remaining: outcome.budget_remaining,
        })
    }

    /// Close a lease with the agent's final spend and credit back the rest
    pub async fn return_lease(&self, lease_id: &LeaseId, spent: Micros) -> ControlResult<ReturnReceipt> {
        spent.ensure_non_negative("spent")?;
        let closed = self
            .ctx
            .ledger
            .leases()
            .close(lease_id, Some(spent), CloseReason::Returned, self.ctx.clock.now())
            .await?;
        Ok(closed.into())
    }

    /// Operator close; the recorded spend stands
    pub async fn revoke_lease(&self, lease_id: &LeaseId, operator: &str) -> ControlResult<ReturnReceipt> {
        let closed = self
            .ctx
            .ledger
            .leases()
            .close(lease_id, None, CloseReason::Revoked, self.ctx.clock.now())
            .await?;
        info!(lease_id = %lease_id, operator = operator, "Lease revoked");
        Ok(closed.into())
    }

    /// Raise an agent's allocation. Trusted callers only.
    pub async fn refresh_budget(
        &self,
        agent_id: &AgentId,
        additional: Micros,
        modifier: &str,
        reason: &str,
    ) -> ControlResult<RefreshReceipt> {
        additional.ensure_positive("additional")?;
        let modifier = non_empty("modifier", modifier)?;
        let reason = if reason.trim().is_empty() { "budget refresh" } else { reason.trim() };

        let (budget, _) = self
            .ctx
            .ledger
            .budgets()
            .credit_allocation(agent_id, additional, modifier, reason, self.ctx.clock.now())
            .await?;

        Ok(RefreshReceipt {
            agent_id: budget.agent_id,
            total_allocated: budget.total_allocated,
            budget_remaining: budget.budget_remaining,
        })
    }

    /// Drop whatever the agent has not yet spent or reserved
    pub async fn zero_budget(&self, agent_id: &AgentId, modifier: &str, reason: &str) -> ControlResult<AgentBudget> {
        let modifier = non_empty("modifier", modifier)?;
        Ok(self
            .ctx
            .ledger
            .budgets()
            .zero(agent_id, modifier, reason, self.ctx.clock.now())
            .await?)
    }

    /// Close every lease past its expiry
    pub async fn reclaim_expired(&self) -> ControlResult<SweepReport> {
        let closed = self
            .ctx
            .ledger
            .leases()
            .reclaim_expired(self.ctx.clock.now())
            .await?;

        let returned = closed.iter().fold(Micros::ZERO, |acc, c| acc + c.returned);
        Ok(SweepReport {
            reclaimed: closed.len(),
            returned,
        })
    }
}

fn non_empty<'a>(field: &str, value: &'a str) -> ControlResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ControlError::Validation(format!("{} must not be empty", field)));
    }
    Ok(value)
}
