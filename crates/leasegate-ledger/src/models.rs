//! Database models - mapped from SQLite tables
//!
//! Rows use primitive column types; conversion into the domain records of
//! `leasegate-types` validates every id, enum and timestamp and reports a
//! [`LedgerError::Corrupt`] if a row does not parse.

use chrono::{DateTime, Utc};
use leasegate_types::*;
use sqlx::FromRow;

use crate::error::{LedgerError, LedgerResult};

pub(crate) const BUDGET_COLUMNS: &str =
    "agent_id, budget_id, total_allocated, total_spent, budget_remaining, created_at, updated_at";

pub(crate) const LEASE_COLUMNS: &str = "lease_id, agent_id, provider, provider_key_id, granted, spent, \
     status, close_reason, envelope_digest, created_at, expires_at, closed_at";

pub(crate) const REQUEST_COLUMNS: &str = "request_id, agent_id, requester_id, current_budget, \
     requested_budget, justification, status, decided_by, decision_note, created_at, updated_at";

pub(crate) const PROVIDER_KEY_COLUMNS: &str =
    "key_id, provider, description, sealed_secret, is_enabled, created_at, last_used_at";

pub(crate) const HISTORY_COLUMNS: &str = "id, agent_id, kind, old_allocated, new_allocated, change, \
     modifier_id, reason, related_request_id, created_at";

pub(crate) const USAGE_COLUMNS: &str =
    "id, lease_id, agent_id, provider, model, tokens, reported_cost, charged, created_at";

pub(crate) const DISCREPANCY_COLUMNS: &str =
    "lease_id, agent_id, reported, unbilled, reason, created_at";

pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub fn from_millis(ms: i64) -> LedgerResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| LedgerError::Corrupt(format!("timestamp {} out of range", ms)))
}

fn from_millis_opt(ms: Option<i64>) -> LedgerResult<Option<DateTime<Utc>>> {
    ms.map(from_millis).transpose()
}

// ============================================================================
// Budget Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbAgentBudget {
    pub agent_id: String,
    pub budget_id: String,
    pub total_allocated: i64,
    pub total_spent: i64,
    pub budget_remaining: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<DbAgentBudget> for AgentBudget {
    type Error = LedgerError;

    fn try_from(row: DbAgentBudget) -> LedgerResult<Self> {
        let budget = AgentBudget {
            agent_id: AgentId::parse(&row.agent_id)?,
            budget_id: BudgetId::parse(&row.budget_id)?,
            total_allocated: Micros(row.total_allocated),
            total_spent: Micros(row.total_spent),
            budget_remaining: Micros(row.budget_remaining),
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        };
        budget.check_invariant()?;
        Ok(budget)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbHistoryEntry {
    pub id: String,
    pub agent_id: String,
    pub kind: String,
    pub old_allocated: i64,
    pub new_allocated: i64,
    pub change: i64,
    pub modifier_id: String,
    pub reason: String,
    pub related_request_id: Option<String>,
    pub created_at: i64,
}

impl TryFrom<DbHistoryEntry> for BudgetHistoryEntry {
    type Error = LedgerError;

    fn try_from(row: DbHistoryEntry) -> LedgerResult<Self> {
        Ok(BudgetHistoryEntry {
            id: HistoryId::parse(&row.id)?,
            agent_id: AgentId::parse(&row.agent_id)?,
            kind: row.kind.parse()?,
            old_allocated: Micros(row.old_allocated),
            new_allocated: Micros(row.new_allocated),
            change: Micros(row.change),
            modifier_id: row.modifier_id,
            reason: row.reason,
            related_request_id: row
                .related_request_id
                .as_deref()
                .map(RequestId::parse)
                .transpose()?,
            created_at: from_millis(row.created_at)?,
        })
    }
}

// ============================================================================
// Lease Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbLease {
    pub lease_id: String,
    pub agent_id: String,
    pub provider: String,
    pub provider_key_id: String,
    pub granted: i64,
    pub spent: i64,
    pub status: String,
    pub close_reason: Option<String>,
    pub envelope_digest: String,
    pub created_at: i64,
    pub expires_at: Option<i64>,
    pub closed_at: Option<i64>,
}

impl TryFrom<DbLease> for BudgetLease {
    type Error = LedgerError;

    fn try_from(row: DbLease) -> LedgerResult<Self> {
        Ok(BudgetLease {
            lease_id: LeaseId::parse(&row.lease_id)?,
            agent_id: AgentId::parse(&row.agent_id)?,
            provider: row.provider.parse()?,
            provider_key_id: ProviderKeyId::parse(&row.provider_key_id)?,
            granted: Micros(row.granted),
            spent: Micros(row.spent),
            status: LeaseStatus::from_columns(&row.status, row.close_reason.as_deref())?,
            envelope_digest: row.envelope_digest,
            created_at: from_millis(row.created_at)?,
            expires_at: from_millis_opt(row.expires_at)?,
            closed_at: from_millis_opt(row.closed_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUsageEvent {
    pub id: String,
    pub lease_id: String,
    pub agent_id: String,
    pub provider: String,
    pub model: String,
    pub tokens: i64,
    pub reported_cost: i64,
    pub charged: i64,
    pub created_at: i64,
}

impl TryFrom<DbUsageEvent> for UsageEvent {
    type Error = LedgerError;

    fn try_from(row: DbUsageEvent) -> LedgerResult<Self> {
        Ok(UsageEvent {
            id: UsageEventId::parse(&row.id)?,
            lease_id: LeaseId::parse(&row.lease_id)?,
            agent_id: AgentId::parse(&row.agent_id)?,
            provider: row.provider.parse()?,
            model: row.model,
            tokens: row.tokens,
            reported_cost: Micros(row.reported_cost),
            charged: Micros(row.charged),
            created_at: from_millis(row.created_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbDiscrepancy {
    pub lease_id: String,
    pub agent_id: String,
    pub reported: i64,
    pub unbilled: i64,
    pub reason: String,
    pub created_at: i64,
}

impl TryFrom<DbDiscrepancy> for UsageDiscrepancy {
    type Error = LedgerError;

    fn try_from(row: DbDiscrepancy) -> LedgerResult<Self> {
        Ok(UsageDiscrepancy {
            lease_id: LeaseId::parse(&row.lease_id)?,
            agent_id: AgentId::parse(&row.agent_id)?,
            reported: Micros(row.reported),
            unbilled: Micros(row.unbilled),
            reason: row.reason,
            created_at: from_millis(row.created_at)?,
        })
    }
}

// ============================================================================
// Request Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbBudgetRequest {
    pub request_id: String,
    pub agent_id: String,
    pub requester_id: String,
    pub current_budget: i64,
    pub requested_budget: i64,
    pub justification: String,
    pub status: String,
    pub decided_by: Option<String>,
    pub decision_note: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<DbBudgetRequest> for BudgetRequest {
    type Error = LedgerError;

    fn try_from(row: DbBudgetRequest) -> LedgerResult<Self> {
        Ok(BudgetRequest {
            request_id: RequestId::parse(&row.request_id)?,
            agent_id: AgentId::parse(&row.agent_id)?,
            requester_id: row.requester_id,
            current_budget: Micros(row.current_budget),
            requested_budget: Micros(row.requested_budget),
            justification: row.justification,
            status: row.status.parse()?,
            decided_by: row.decided_by,
            decision_note: row.decision_note,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

// ============================================================================
// Provider Key Models
// ============================================================================

/// Stored provider credential, still sealed
#[derive(Debug, Clone, FromRow)]
pub struct DbProviderKey {
    pub key_id: String,
    pub provider: String,
    pub description: Option<String>,
    pub sealed_secret: String,
    pub is_enabled: bool,
    pub created_at: i64,
    pub last_used_at: Option<i64>,
}

impl DbProviderKey {
    pub fn info(&self) -> LedgerResult<ProviderKeyInfo> {
        Ok(ProviderKeyInfo {
            key_id: ProviderKeyId::parse(&self.key_id)?,
            provider: self.provider.parse()?,
            description: self.description.clone(),
            enabled: self.is_enabled,
            created_at: from_millis(self.created_at)?,
            last_used_at: from_millis_opt(self.last_used_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_row_checks_invariant() {
        let row = DbAgentBudget {
            agent_id: "agent_1".into(),
            budget_id: "budget_1".into(),
            total_allocated: 100,
            total_spent: 30,
            budget_remaining: 60,
            created_at: 0,
            updated_at: 0,
        };
        assert!(matches!(AgentBudget::try_from(row), Err(LedgerError::Corrupt(_))));
    }

    #[test]
    fn test_lease_row_parses() {
        let row = DbLease {
            lease_id: "lease_1".into(),
            agent_id: "agent_1".into(),
            provider: "anthropic".into(),
            provider_key_id: "pkey_1".into(),
            granted: 10,
            spent: 4,
            status: "closed".into(),
            close_reason: Some("revoked".into()),
            envelope_digest: "abc".into(),
            created_at: 1_700_000_000_000,
            expires_at: None,
            closed_at: Some(1_700_000_001_000),
        };
        let lease = BudgetLease::try_from(row).unwrap();
        assert_eq!(lease.status, LeaseStatus::Closed(CloseReason::Revoked));
        assert_eq!(lease.provider, Provider::Anthropic);
        assert_eq!(lease.remaining(), Micros(6));
    }
}
