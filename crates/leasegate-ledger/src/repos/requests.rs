//! Budget request repository

use chrono::{DateTime, Utc};
use leasegate_types::*;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::error::{classify, LedgerError, LedgerResult};
use crate::models::*;
use crate::repos::budgets::{credit_allocation_in_tx, lock_budget, AllocationChange};
use crate::retry::{with_retry, RetryConfig};

/// Input to [`RequestRepo::create`]
#[derive(Debug, Clone)]
pub struct NewBudgetRequest {
    pub agent_id: AgentId,
    pub requester_id: String,
    pub amount: Micros,
    /// Already trimmed and length-checked
    pub justification: String,
}

/// Filter for [`RequestRepo::list`]
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub agent_id: Option<AgentId>,
    pub status: Option<RequestStatus>,
    pub limit: Option<u32>,
}

/// An approved request and the budget it raised
#[derive(Debug, Clone)]
pub struct ApprovedRequest {
    pub request: BudgetRequest,
    pub budget: AgentBudget,
    pub history: BudgetHistoryEntry,
}

const DEFAULT_LIST_LIMIT: u32 = 100;

/// Move a pending request to `target`; any other state is a conflict
async fn decide(
    conn: &mut SqliteConnection,
    request_id: &RequestId,
    target: RequestStatus,
    decided_by: &str,
    note: Option<&str>,
    requester_only: bool,
    now: DateTime<Utc>,
) -> LedgerResult<BudgetRequest> {
    RequestStatus::Pending
        .transition(target)
        .map_err(|e| LedgerError::InvalidInput(e.to_string()))?;

    let sql = format!(
        r#"
        UPDATE budget_requests
        SET status = ?1, decided_by = ?2, decision_note = ?3, updated_at = ?4
        WHERE request_id = ?5 AND status = 'pending' AND (?6 = 0 OR requester_id = ?2)
        RETURNING {}
        "#,
        REQUEST_COLUMNS
    );
    let row = sqlx::query_as::<_, DbBudgetRequest>(&sql)
        .bind(target.as_str())
        .bind(decided_by)
        .bind(note)
        .bind(to_millis(now))
        .bind(request_id.as_str())
        .bind(requester_only)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| classify(e, "decide request"))?;

    if let Some(row) = row {
        return BudgetRequest::try_from(row);
    }

    let current: Option<(String, String)> = sqlx::query_as(
        "SELECT status, requester_id FROM budget_requests WHERE request_id = ?1",
    )
    .bind(request_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    match current {
        None => Err(LedgerError::not_found("budget request", request_id)),
        Some((status, requester)) => {
            let status: RequestStatus = status.parse()?;
            if status.transition(target).is_err() {
                Err(LedgerError::RequestConflict {
                    request_id: request_id.to_string(),
                    current: status,
                })
            } else if requester_only && requester != decided_by {
                Err(LedgerError::Forbidden(format!(
                    "only the requester may cancel {}",
                    request_id
                )))
            } else {
                Err(LedgerError::Corrupt(format!(
                    "request {} is pending but could not be updated",
                    request_id
                )))
            }
        }
    }
}

/// Budget request repository
pub struct RequestRepo {
    pool: SqlitePool,
    retry: RetryConfig,
}

impl RequestRepo {
    pub fn new(pool: SqlitePool, retry: RetryConfig) -> Self {
        Self { pool, retry }
    }

    /// Record a pending request against the agent's current allocation
    pub async fn create(
        &self,
        new: &NewBudgetRequest,
        now: DateTime<Utc>,
    ) -> LedgerResult<BudgetRequest> {
        new.amount
            .ensure_positive("amount")
            .map_err(|e| LedgerError::InvalidInput(e.to_string()))?;

        with_retry(&self.retry, "request.create", move || self.create_once(new, now)).await
    }

    async fn create_once(
        &self,
        new: &NewBudgetRequest,
        now: DateTime<Utc>,
    ) -> LedgerResult<BudgetRequest> {
        let mut tx = self.pool.begin().await?;
        let budget = lock_budget(&mut tx, &new.agent_id, now).await?;

        let current = budget.total_allocated;
        let requested = current
            .checked_add(new.amount)
            .map_err(|e| LedgerError::InvalidInput(e.to_string()))?;

        let request_id = RequestId::new();
        let now_ms = to_millis(now);
        let sql = format!(
            r#"
            INSERT INTO budget_requests (request_id, agent_id, requester_id, current_budget,
                                         requested_budget, justification, status, created_at,
                                         updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?7)
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        );
        let row = sqlx::query_as::<_, DbBudgetRequest>(&sql)
            .bind(request_id.as_str())
            .bind(new.agent_id.as_str())
            .bind(&new.requester_id)
            .bind(current.value())
            .bind(requested.value())
            .bind(&new.justification)
            .bind(now_ms)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify(e, "budget request"))?;
        let request = BudgetRequest::try_from(row)?;

        tx.commit().await?;

        info!(
            request_id = %request.request_id,
            agent_id = %request.agent_id,
            current = current.value(),
            requested = requested.value(),
            "Budget request created"
        );
        Ok(request)
    }

    pub async fn find(&self, request_id: &RequestId) -> LedgerResult<Option<BudgetRequest>> {
        let sql = format!(
            "SELECT {} FROM budget_requests WHERE request_id = ?1",
            REQUEST_COLUMNS
        );
        let row = sqlx::query_as::<_, DbBudgetRequest>(&sql)
            .bind(request_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(BudgetRequest::try_from).transpose()
    }

    pub async fn get(&self, request_id: &RequestId) -> LedgerResult<BudgetRequest> {
        self.find(request_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("budget request", request_id))
    }

    /// Requests matching `filter`, newest first
    pub async fn list(&self, filter: &RequestFilter) -> LedgerResult<Vec<BudgetRequest>> {
        let sql = format!(
            r#"
            SELECT {} FROM budget_requests
            WHERE (?1 IS NULL OR agent_id = ?1) AND (?2 IS NULL OR status = ?2)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?3
            "#,
            REQUEST_COLUMNS
        );
        let rows = sqlx::query_as::<_, DbBudgetRequest>(&sql)
            .bind(filter.agent_id.as_ref().map(|id| id.as_str()))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT) as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(BudgetRequest::try_from).collect()
    }

    /// Approve a pending request and raise the budget by its increase.
    ///
    /// The status change, the allocation change and the history row commit
    /// together.
    pub async fn approve(
        &self,
        request_id: &RequestId,
        approver_id: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<ApprovedRequest> {
        with_retry(&self.retry, "request.approve", move || async move {
            let mut tx = self.pool.begin().await?;
            let request = decide(
                &mut tx,
                request_id,
                RequestStatus::Approved,
                approver_id,
                None,
                false,
                now,
            )
            .await?;

            let change = AllocationChange {
                agent_id: &request.agent_id,
                additional: request.increase(),
                modifier_id: approver_id,
                reason: "budget request approved",
                related_request_id: Some(&request.request_id),
                now,
            };
            let (budget, history) = credit_allocation_in_tx(&mut tx, &change).await?;
            tx.commit().await?;

            info!(
                request_id = %request.request_id,
                agent_id = %request.agent_id,
                approver = approver_id,
                increase = request.increase().value(),
                allocated = budget.total_allocated.value(),
                "Budget request approved"
            );
            Ok(ApprovedRequest {
                request,
                budget,
                history,
            })
        })
        .await
    }

    pub async fn reject(
        &self,
        request_id: &RequestId,
        approver_id: &str,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> LedgerResult<BudgetRequest> {
        with_retry(&self.retry, "request.reject", move || async move {
            let mut tx = self.pool.begin().await?;
            let request = decide(
                &mut tx,
                request_id,
                RequestStatus::Rejected,
                approver_id,
                note,
                false,
                now,
            )
            .await?;
            tx.commit().await?;

            info!(request_id = %request_id, approver = approver_id, "Budget request rejected");
            Ok(request)
        })
        .await
    }

    /// Withdraw a pending request; only its requester may do so
    pub async fn cancel(
        &self,
        request_id: &RequestId,
        requester_id: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<BudgetRequest> {
        with_retry(&self.retry, "request.cancel", move || async move {
            let mut tx = self.pool.begin().await?;
            let request = decide(
                &mut tx,
                request_id,
                RequestStatus::Cancelled,
                requester_id,
                None,
                true,
                now,
            )
            .await?;
            tx.commit().await?;

            info!(request_id = %request_id, requester = requester_id, "Budget request cancelled");
            Ok(request)
        })
        .await
    }
}
