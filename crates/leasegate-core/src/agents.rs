//! Agent registration and budget status

use leasegate_auth::PERMISSION_LLM_CALL;
use leasegate_types::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::ControlResult;
use crate::ControlContext;

/// A newly registered agent and its identity token
#[derive(Debug, Clone, Serialize)]
pub struct AgentRegistration {
    pub agent_id: AgentId,
    pub budget_id: BudgetId,
    pub total_allocated: Micros,
    /// Identity claim carrying `llm:call`
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetStatus {
    #[serde(flatten)]
    pub budget: AgentBudget,
    pub open_leases: usize,
    /// Reserved by open leases and not yet spent
    pub open_exposure: Micros,
}

pub struct AgentService {
    ctx: Arc<ControlContext>,
}

impl AgentService {
    pub(crate) fn new(ctx: Arc<ControlContext>) -> Self {
        Self { ctx }
    }

    /// Create an agent with a fresh budget and issue its identity claim
    pub async fn register(
        &self,
        initial_allocation: Micros,
        modifier: &str,
        token_lifetime: Option<Duration>,
    ) -> ControlResult<AgentRegistration> {
        initial_allocation.ensure_non_negative("initial_allocation")?;

        let agent_id = AgentId::new();
        let budget_id = BudgetId::new();
        let budget = self
            .ctx
            .ledger
            .budgets()
            .create(&agent_id, &budget_id, initial_allocation, modifier, self.ctx.clock.now())
            .await?;
        let token = self.ctx.verifier.issue(
            &agent_id,
            &budget_id,
            &[PERMISSION_LLM_CALL],
            token_lifetime,
        )?;

        info!(
            agent_id = %agent_id,
            allocated = initial_allocation.value(),
            modifier = modifier,
            "Agent registered"
        );

        Ok(AgentRegistration {
            agent_id,
            budget_id,
            total_allocated: budget.total_allocated,
            token,
        })
    }

    /// Issue a new identity claim for an existing agent
    pub async fn issue_token(&self, agent_id: &AgentId, lifetime: Option<Duration>) -> ControlResult<String> {
        let budget = self.ctx.ledger.budgets().get(agent_id).await?;
        Ok(self
            .ctx
            .verifier
            .issue(agent_id, &budget.budget_id, &[PERMISSION_LLM_CALL], lifetime)?)
    }

    pub async fn budget_status(&self, agent_id: &AgentId) -> ControlResult<BudgetStatus> {
        let budget = self.ctx.ledger.budgets().get(agent_id).await?;
        let leases = self.ctx.ledger.leases();
        let open = leases.list_for_agent(agent_id, true, u32::MAX).await?;
        let open_exposure = leases.open_exposure(agent_id).await?;

        Ok(BudgetStatus {
            budget,
            open_leases: open.len(),
            open_exposure,
        })
    }

    pub async fn list_leases(
        &self,
        agent_id: &AgentId,
        open_only: bool,
        limit: u32,
    ) -> ControlResult<Vec<BudgetLease>> {
        self.ctx.ledger.budgets().get(agent_id).await?;
        Ok(self
            .ctx
            .ledger
            .leases()
            .list_for_agent(agent_id, open_only, limit)
            .await?)
    }

    pub async fn history(&self, agent_id: &AgentId, limit: u32) -> ControlResult<Vec<BudgetHistoryEntry>> {
        self.ctx.ledger.budgets().get(agent_id).await?;
        Ok(self.ctx.ledger.budgets().history(agent_id, limit).await?)
    }
}
