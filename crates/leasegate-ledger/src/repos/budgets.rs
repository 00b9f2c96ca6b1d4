//! Agent budget repository

use chrono::{DateTime, Utc};
use leasegate_types::*;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{classify, LedgerError, LedgerResult};
use crate::models::*;
use crate::repos::leases::{close_in_tx, open_leases_in_tx};
use crate::retry::{with_retry, RetryConfig};

/// Allocation increase applied inside an open transaction
pub(crate) struct AllocationChange<'a> {
    pub agent_id: &'a AgentId,
    pub additional: Micros,
    pub modifier_id: &'a str,
    pub reason: &'a str,
    pub related_request_id: Option<&'a RequestId>,
    pub now: DateTime<Utc>,
}

/// Take the write lock on a budget row and return its current state.
///
/// The touch is the first statement of every budget transaction, so no
/// other writer can interleave between this read and the following update.
pub(crate) async fn lock_budget(
    conn: &mut SqliteConnection,
    agent_id: &AgentId,
    now: DateTime<Utc>,
) -> LedgerResult<AgentBudget> {
    let sql = format!(
        "UPDATE agent_budgets SET updated_at = ?1 WHERE agent_id = ?2 RETURNING {}",
        BUDGET_COLUMNS
    );
    let row = sqlx::query_as::<_, DbAgentBudget>(&sql)
        .bind(to_millis(now))
        .bind(agent_id.as_str())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| LedgerError::not_found("agent", agent_id))?;

    AgentBudget::try_from(row)
}

/// Move `amount` between spent and remaining. Positive amounts credit the
/// budget back, negative amounts charge it.
pub(crate) async fn shift_spend(
    conn: &mut SqliteConnection,
    agent_id: &AgentId,
    credit: Micros,
    now: DateTime<Utc>,
) -> LedgerResult<Micros> {
    let remaining: i64 = sqlx::query_scalar(
        r#"
        UPDATE agent_budgets
        SET budget_remaining = budget_remaining + ?1,
            total_spent = total_spent - ?1,
            updated_at = ?2
        WHERE agent_id = ?3
        RETURNING budget_remaining
        "#,
    )
    .bind(credit.value())
    .bind(to_millis(now))
    .bind(agent_id.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| classify(e, "shift spend"))?
    .ok_or_else(|| LedgerError::not_found("agent", agent_id))?;

    Ok(Micros(remaining))
}

pub(crate) async fn insert_history(
    conn: &mut SqliteConnection,
    entry: &BudgetHistoryEntry,
) -> LedgerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO budget_history (id, agent_id, kind, old_allocated, new_allocated, change,
                                    modifier_id, reason, related_request_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(entry.id.as_str())
    .bind(entry.agent_id.as_str())
    .bind(entry.kind.as_str())
    .bind(entry.old_allocated.value())
    .bind(entry.new_allocated.value())
    .bind(entry.change.value())
    .bind(&entry.modifier_id)
    .bind(&entry.reason)
    .bind(entry.related_request_id.as_ref().map(|id| id.as_str()))
    .bind(to_millis(entry.created_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| classify(e, "budget history"))?;

    Ok(())
}

fn history_entry(
    agent_id: &AgentId,
    old: Micros,
    new: Micros,
    modifier_id: &str,
    reason: &str,
    related_request_id: Option<&RequestId>,
    now: DateTime<Utc>,
) -> BudgetHistoryEntry {
    BudgetHistoryEntry {
        id: HistoryId::new(),
        agent_id: agent_id.clone(),
        kind: HistoryKind::classify(old, new),
        old_allocated: old,
        new_allocated: new,
        change: new - old,
        modifier_id: modifier_id.to_string(),
        reason: reason.to_string(),
        related_request_id: related_request_id.cloned(),
        created_at: now,
    }
}

/// Raise allocation and remaining by the same amount and record history
pub(crate) async fn credit_allocation_in_tx(
    conn: &mut SqliteConnection,
    change: &AllocationChange<'_>,
) -> LedgerResult<(AgentBudget, BudgetHistoryEntry)> {
    change
        .additional
        .ensure_positive("additional")
        .map_err(|e| LedgerError::InvalidInput(e.to_string()))?;

    let current = lock_budget(conn, change.agent_id, change.now).await?;
    let new_allocated = current
        .total_allocated
        .checked_add(change.additional)
        .map_err(|e| LedgerError::InvalidInput(e.to_string()))?;
    let new_remaining = current
        .budget_remaining
        .checked_add(change.additional)
        .map_err(|e| LedgerError::InvalidInput(e.to_string()))?;

    let sql = format!(
        r#"
        UPDATE agent_budgets
        SET total_allocated = ?1, budget_remaining = ?2, updated_at = ?3
        WHERE agent_id = ?4
        RETURNING {}
        "#,
        BUDGET_COLUMNS
    );
    let row = sqlx::query_as::<_, DbAgentBudget>(&sql)
        .bind(new_allocated.value())
        .bind(new_remaining.value())
        .bind(to_millis(change.now))
        .bind(change.agent_id.as_str())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| classify(e, "credit allocation"))?;
    let budget = AgentBudget::try_from(row)?;

    let entry = history_entry(
        change.agent_id,
        current.total_allocated,
        budget.total_allocated,
        change.modifier_id,
        change.reason,
        change.related_request_id,
        change.now,
    );
    insert_history(conn, &entry).await?;

    Ok((budget, entry))
}

/// Agent budget repository
pub struct BudgetRepo {
    pool: SqlitePool,
    retry: RetryConfig,
}

impl BudgetRepo {
    pub fn new(pool: SqlitePool, retry: RetryConfig) -> Self {
        Self { pool, retry }
    }

    /// Create a budget row with `initial` allocated and nothing spent
    pub async fn create(
        &self,
        agent_id: &AgentId,
        budget_id: &BudgetId,
        initial: Micros,
        modifier_id: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<AgentBudget> {
        initial
            .ensure_non_negative("initial_allocation")
            .map_err(|e| LedgerError::InvalidInput(e.to_string()))?;

        with_retry(&self.retry, "budget.create", move || {
            self.create_once(agent_id, budget_id, initial, modifier_id, now)
        })
        .await
    }

    async fn create_once(
        &self,
        agent_id: &AgentId,
        budget_id: &BudgetId,
        initial: Micros,
        modifier_id: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<AgentBudget> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO agent_budgets (agent_id, budget_id, total_allocated, total_spent,
                                       budget_remaining, created_at, updated_at)
            VALUES (?1, ?2, ?3, 0, ?3, ?4, ?4)
            RETURNING {}
            "#,
            BUDGET_COLUMNS
        );
        let row = sqlx::query_as::<_, DbAgentBudget>(&sql)
            .bind(agent_id.as_str())
            .bind(budget_id.as_str())
            .bind(initial.value())
            .bind(to_millis(now))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify(e, &format!("agent {}", agent_id)))?;
        let budget = AgentBudget::try_from(row)?;

        if initial.is_positive() {
            let entry = history_entry(
                agent_id,
                Micros::ZERO,
                initial,
                modifier_id,
                "initial allocation",
                None,
                now,
            );
            insert_history(&mut tx, &entry).await?;
        }

        tx.commit().await?;

        info!(
            agent_id = %agent_id,
            budget_id = %budget_id,
            allocated = initial.value(),
            "Agent budget created"
        );
        Ok(budget)
    }

    pub async fn find(&self, agent_id: &AgentId) -> LedgerResult<Option<AgentBudget>> {
        let sql = format!("SELECT {} FROM agent_budgets WHERE agent_id = ?1", BUDGET_COLUMNS);
        let row = sqlx::query_as::<_, DbAgentBudget>(&sql)
            .bind(agent_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(AgentBudget::try_from).transpose()
    }

    pub async fn get(&self, agent_id: &AgentId) -> LedgerResult<AgentBudget> {
        self.find(agent_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("agent", agent_id))
    }

    /// Raise allocation and remaining by `additional` and write a history row
    pub async fn credit_allocation(
        &self,
        agent_id: &AgentId,
        additional: Micros,
        modifier_id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<(AgentBudget, BudgetHistoryEntry)> {
        with_retry(&self.retry, "budget.credit_allocation", move || async move {
            let mut tx = self.pool.begin().await?;
            let change = AllocationChange {
                agent_id,
                additional,
                modifier_id,
                reason,
                related_request_id: None,
                now,
            };
            let result = credit_allocation_in_tx(&mut tx, &change).await?;
            tx.commit().await?;
            Ok(result)
        })
        .await
        .map(|(budget, entry)| {
            info!(
                agent_id = %agent_id,
                additional = additional.value(),
                allocated = budget.total_allocated.value(),
                remaining = budget.budget_remaining.value(),
                modifier = modifier_id,
                "Budget allocation raised"
            );
            (budget, entry)
        })
    }

    /// Drop the unspent remainder: allocation becomes the spent total.
    ///
    /// Open leases are revoked first, keeping their recorded spend, so no
    /// later return can credit a reservation back into a zeroed budget.
    pub async fn zero(
        &self,
        agent_id: &AgentId,
        modifier_id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<AgentBudget> {
        with_retry(&self.retry, "budget.zero", move || {
            self.zero_once(agent_id, modifier_id, reason, now)
        })
        .await
    }

    async fn zero_once(
        &self,
        agent_id: &AgentId,
        modifier_id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<AgentBudget> {
        let mut tx = self.pool.begin().await?;
        let current = lock_budget(&mut tx, agent_id, now).await?;

        let open = open_leases_in_tx(&mut tx, agent_id).await?;
        for lease in &open {
            close_in_tx(&mut tx, lease, None, CloseReason::Revoked, now).await?;
        }

        let sql = format!(
            r#"
            UPDATE agent_budgets
            SET total_allocated = total_spent, budget_remaining = 0, updated_at = ?1
            WHERE agent_id = ?2
            RETURNING {}
            "#,
            BUDGET_COLUMNS
        );
        let row = sqlx::query_as::<_, DbAgentBudget>(&sql)
            .bind(to_millis(now))
            .bind(agent_id.as_str())
            .fetch_one(&mut *tx)
            .await?;
        let budget = AgentBudget::try_from(row)?;

        if budget.total_allocated != current.total_allocated {
            let entry = history_entry(
                agent_id,
                current.total_allocated,
                budget.total_allocated,
                modifier_id,
                reason,
                None,
                now,
            );
            insert_history(&mut tx, &entry).await?;
        }

        tx.commit().await?;

        info!(
            agent_id = %agent_id,
            dropped = (current.total_allocated - budget.total_allocated).value(),
            revoked = open.len(),
            "Budget zeroed"
        );
        Ok(budget)
    }

    /// Allocation changes, newest first
    pub async fn history(
        &self,
        agent_id: &AgentId,
        limit: u32,
    ) -> LedgerResult<Vec<BudgetHistoryEntry>> {
        let sql = format!(
            "SELECT {} FROM budget_history WHERE agent_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            HISTORY_COLUMNS
        );
        let rows = sqlx::query_as::<_, DbHistoryEntry>(&sql)
            .bind(agent_id.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        debug!(agent_id = %agent_id, count = rows.len(), "Loaded budget history");
        rows.into_iter().map(BudgetHistoryEntry::try_from).collect()
    }

    /// Budgets whose stored totals do not add up; empty on a healthy ledger
    pub async fn find_inconsistent(&self) -> LedgerResult<Vec<AgentId>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT agent_id FROM agent_budgets
            WHERE total_allocated != total_spent + budget_remaining OR budget_remaining < 0
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        ids.iter()
            .map(|id| AgentId::parse(id).map_err(LedgerError::from))
            .collect()
    }
}
