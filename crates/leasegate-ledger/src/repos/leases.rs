//! Lease repository
//!
//! Every lease operation runs as one transaction that starts by writing the
//! lease or budget row it depends on. The budget identity
//! `total_allocated == total_spent + budget_remaining` holds after each of
//! them: granting moves money from remaining to spent, closing moves the
//! unspent part back.
//!
//! A lease closed by its expiry reports [`LedgerError::LeaseExpired`] to
//! every later operation, whether a sweep or a usage report closed it.

use chrono::{DateTime, Utc};
use leasegate_types::*;
use sqlx::{SqliteConnection, SqlitePool};
use std::cmp::{max, min};
use tracing::{debug, info, warn};

use crate::error::{classify, LedgerError, LedgerResult};
use crate::models::*;
use crate::repos::budgets::{lock_budget, shift_spend};
use crate::retry::{with_retry, RetryConfig};

/// Input to [`LeaseRepo::open`]
#[derive(Debug, Clone)]
pub struct NewLease {
    pub lease_id: LeaseId,
    pub agent_id: AgentId,
    /// Budget id from the identity claim; must match the stored one
    pub budget_id: BudgetId,
    pub provider: Provider,
    pub provider_key_id: ProviderKeyId,
    pub amount: Micros,
    pub envelope_digest: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A granted lease and the budget left after the grant
#[derive(Debug, Clone)]
pub struct OpenedLease {
    pub lease: BudgetLease,
    pub budget_remaining: Micros,
}

/// Input to [`LeaseRepo::apply_usage`]
#[derive(Debug, Clone)]
pub struct UsageReport {
    pub lease_id: LeaseId,
    pub provider: Provider,
    pub model: String,
    pub tokens: i64,
    pub cost: Micros,
}

/// Result of charging one usage report
#[derive(Debug, Clone)]
pub struct UsageOutcome {
    pub lease: BudgetLease,
    pub event: UsageEvent,
    pub budget_remaining: Micros,
    /// Reported cost that could not be charged
    pub unbilled: Micros,
}

/// A lease after closing and the amount credited back
#[derive(Debug, Clone)]
pub struct ClosedLease {
    pub lease: BudgetLease,
    pub returned: Micros,
    pub budget_remaining: Micros,
}

/// Result of [`LeaseRepo::rollover`]
#[derive(Debug, Clone)]
pub struct RolledLease {
    /// The previous lease, closed as `Refreshed`
    pub closed: ClosedLease,
    /// The replacement; its `budget_remaining` is the final balance
    pub opened: OpenedLease,
}

const OVERAGE_REASON: &str = "usage exceeded lease grant and remaining budget";
const RETURN_REASON: &str = "returned spend exceeded lease grant";

async fn lock_lease(
    conn: &mut SqliteConnection,
    lease_id: &LeaseId,
    now: DateTime<Utc>,
) -> LedgerResult<BudgetLease> {
    let sql = format!(
        "UPDATE budget_leases SET updated_at = ?1 WHERE lease_id = ?2 RETURNING {}",
        LEASE_COLUMNS
    );
    let row = sqlx::query_as::<_, DbLease>(&sql)
        .bind(to_millis(now))
        .bind(lease_id.as_str())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| LedgerError::not_found("lease", lease_id))?;

    BudgetLease::try_from(row)
}

/// Fail unless the lease is open; an expired close stays `LeaseExpired`
fn ensure_open(lease: &BudgetLease) -> LedgerResult<()> {
    match lease.status {
        LeaseStatus::Open => Ok(()),
        LeaseStatus::Closed(CloseReason::Expired) => Err(LedgerError::LeaseExpired {
            lease_id: lease.lease_id.to_string(),
        }),
        LeaseStatus::Closed(reason) => Err(LedgerError::LeaseClosed {
            lease_id: lease.lease_id.to_string(),
            reason,
        }),
    }
}

async fn insert_discrepancy(
    conn: &mut SqliteConnection,
    record: &UsageDiscrepancy,
) -> LedgerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO usage_discrepancies (lease_id, agent_id, reported, unbilled, reason, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(record.lease_id.as_str())
    .bind(record.agent_id.as_str())
    .bind(record.reported.value())
    .bind(record.unbilled.value())
    .bind(&record.reason)
    .bind(to_millis(record.created_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| classify(e, "usage discrepancy"))?;

    warn!(
        lease_id = %record.lease_id,
        agent_id = %record.agent_id,
        reported = record.reported.value(),
        unbilled = record.unbilled.value(),
        reason = %record.reason,
        "Usage clamped, unbilled spend recorded"
    );
    Ok(())
}

/// Close an open lease the caller has already locked.
///
/// The final spend is the larger of the reported and the recorded spend,
/// capped at the grant. Whatever the lease did not use is credited back.
pub(crate) async fn close_in_tx(
    conn: &mut SqliteConnection,
    lease: &BudgetLease,
    reported: Option<Micros>,
    reason: CloseReason,
    now: DateTime<Utc>,
) -> LedgerResult<ClosedLease> {
    let reported = reported.unwrap_or(lease.spent);
    let mut final_spent = max(reported, lease.spent);

    if final_spent > lease.granted {
        let record = UsageDiscrepancy {
            lease_id: lease.lease_id.clone(),
            agent_id: lease.agent_id.clone(),
            reported,
            unbilled: final_spent - lease.granted,
            reason: RETURN_REASON.to_string(),
            created_at: now,
        };
        insert_discrepancy(conn, &record).await?;
        final_spent = lease.granted;
    }

    let returned = lease.granted - final_spent;
    let budget_remaining = shift_spend(conn, &lease.agent_id, returned, now).await?;

    let (status, close_reason) = LeaseStatus::Closed(reason).to_columns();
    let sql = format!(
        r#"
        UPDATE budget_leases
        SET spent = ?1, status = ?2, close_reason = ?3, closed_at = ?4, updated_at = ?4
        WHERE lease_id = ?5 AND status = 'open'
        RETURNING {}
        "#,
        LEASE_COLUMNS
    );
    let row = sqlx::query_as::<_, DbLease>(&sql)
        .bind(final_spent.value())
        .bind(status)
        .bind(close_reason)
        .bind(to_millis(now))
        .bind(lease.lease_id.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| classify(e, "close lease"))?
        .ok_or_else(|| LedgerError::LeaseClosed {
            lease_id: lease.lease_id.to_string(),
            reason,
        })?;
    let closed = BudgetLease::try_from(row)?;

    info!(
        lease_id = %closed.lease_id,
        agent_id = %closed.agent_id,
        reason = %reason,
        spent = final_spent.value(),
        returned = returned.value(),
        "Lease closed"
    );

    Ok(ClosedLease {
        lease: closed,
        returned,
        budget_remaining,
    })
}

/// Debit `new.amount` and insert the open lease; on error the caller drops
/// its transaction
async fn insert_lease_in_tx(
    conn: &mut SqliteConnection,
    new: &NewLease,
    now: DateTime<Utc>,
) -> LedgerResult<OpenedLease> {
    let now_ms = to_millis(now);

    let remaining: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE agent_budgets
        SET budget_remaining = budget_remaining - ?1,
            total_spent = total_spent + ?1,
            updated_at = ?2
        WHERE agent_id = ?3 AND budget_id = ?4 AND budget_remaining >= ?1
        RETURNING budget_remaining
        "#,
    )
    .bind(new.amount.value())
    .bind(now_ms)
    .bind(new.agent_id.as_str())
    .bind(new.budget_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(remaining) = remaining else {
        return Err(diagnose_debit(conn, new).await?);
    };

    let (status, close_reason) = LeaseStatus::Open.to_columns();
    let sql = format!(
        r#"
        INSERT INTO budget_leases (lease_id, agent_id, provider, provider_key_id, granted, spent,
                                   status, close_reason, envelope_digest, created_at,
                                   expires_at, closed_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?9, ?10, NULL, ?9)
        RETURNING {}
        "#,
        LEASE_COLUMNS
    );
    let row = sqlx::query_as::<_, DbLease>(&sql)
        .bind(new.lease_id.as_str())
        .bind(new.agent_id.as_str())
        .bind(new.provider.as_str())
        .bind(new.provider_key_id.as_str())
        .bind(new.amount.value())
        .bind(status)
        .bind(close_reason)
        .bind(&new.envelope_digest)
        .bind(now_ms)
        .bind(new.expires_at.map(to_millis))
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| classify(e, &format!("lease {}", new.lease_id)))?;

    Ok(OpenedLease {
        lease: BudgetLease::try_from(row)?,
        budget_remaining: Micros(remaining),
    })
}

/// Explain why the conditional debit matched nothing
async fn diagnose_debit(conn: &mut SqliteConnection, new: &NewLease) -> LedgerResult<LedgerError> {
    let row: Option<(String, i64)> = sqlx::query_as(
        "SELECT budget_id, budget_remaining FROM agent_budgets WHERE agent_id = ?1",
    )
    .bind(new.agent_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(match row {
        None => LedgerError::not_found("agent", &new.agent_id),
        Some((budget_id, _)) if budget_id != new.budget_id.as_str() => {
            warn!(
                agent_id = %new.agent_id,
                claimed_budget = %new.budget_id,
                "Budget id in claim does not match agent"
            );
            LedgerError::BudgetMismatch {
                agent_id: new.agent_id.to_string(),
            }
        }
        Some((_, available)) => {
            debug!(
                agent_id = %new.agent_id,
                requested = new.amount.value(),
                available = available,
                "Lease refused, insufficient budget"
            );
            LedgerError::InsufficientBudget {
                requested: new.amount,
                available: Micros(available),
            }
        }
    })
}

/// Open leases of one agent, oldest first
pub(crate) async fn open_leases_in_tx(
    conn: &mut SqliteConnection,
    agent_id: &AgentId,
) -> LedgerResult<Vec<BudgetLease>> {
    let sql = format!(
        "SELECT {} FROM budget_leases WHERE agent_id = ?1 AND status = 'open' ORDER BY created_at, rowid",
        LEASE_COLUMNS
    );
    let rows = sqlx::query_as::<_, DbLease>(&sql)
        .bind(agent_id.as_str())
        .fetch_all(&mut *conn)
        .await?;

    rows.into_iter().map(BudgetLease::try_from).collect()
}

/// Lease repository
pub struct LeaseRepo {
    pool: SqlitePool,
    retry: RetryConfig,
}

impl LeaseRepo {
    pub fn new(pool: SqlitePool, retry: RetryConfig) -> Self {
        Self { pool, retry }
    }

    // =========================================================================
    // Grant
    // =========================================================================

    /// Reserve `amount` from the agent's budget and record an open lease.
    ///
    /// The debit is a single conditional update; if it matches no row the
    /// transaction is rolled back and the cause is reported.
    pub async fn open(&self, new: &NewLease, now: DateTime<Utc>) -> LedgerResult<OpenedLease> {
        new.amount
            .ensure_positive("amount")
            .map_err(|e| LedgerError::InvalidInput(e.to_string()))?;

        with_retry(&self.retry, "lease.open", move || self.open_once(new, now)).await
    }

    async fn open_once(&self, new: &NewLease, now: DateTime<Utc>) -> LedgerResult<OpenedLease> {
        let mut tx = self.pool.begin().await?;
        let opened = insert_lease_in_tx(&mut tx, new, now).await?;
        tx.commit().await?;

        info!(
            lease_id = %opened.lease.lease_id,
            agent_id = %opened.lease.agent_id,
            provider = %opened.lease.provider,
            granted = opened.lease.granted.value(),
            remaining = opened.budget_remaining.value(),
            "Lease granted"
        );
        Ok(opened)
    }

    /// Close `current` and open `new` in its place, in one transaction.
    ///
    /// The unspent part of the old lease is credited before the new amount
    /// is debited. If the debit fails nothing changes: the old lease stays
    /// open and the budget is untouched. An expired lease is reclaimed and
    /// reported as [`LedgerError::LeaseExpired`] instead.
    pub async fn rollover(
        &self,
        current: &LeaseId,
        new: &NewLease,
        now: DateTime<Utc>,
    ) -> LedgerResult<RolledLease> {
        new.amount
            .ensure_positive("amount")
            .map_err(|e| LedgerError::InvalidInput(e.to_string()))?;

        with_retry(&self.retry, "lease.rollover", move || {
            self.rollover_once(current, new, now)
        })
        .await
    }

    async fn rollover_once(
        &self,
        current: &LeaseId,
        new: &NewLease,
        now: DateTime<Utc>,
    ) -> LedgerResult<RolledLease> {
        let mut tx = self.pool.begin().await?;
        let lease = lock_lease(&mut tx, current, now).await?;
        ensure_open(&lease)?;

        if lease.agent_id != new.agent_id {
            return Err(LedgerError::Forbidden(format!(
                "lease {} belongs to another agent",
                current
            )));
        }

        if lease.is_expired_at(now) {
            close_in_tx(&mut tx, &lease, None, CloseReason::Expired, now).await?;
            tx.commit().await?;
            return Err(LedgerError::LeaseExpired {
                lease_id: lease.lease_id.to_string(),
            });
        }

        let closed = close_in_tx(&mut tx, &lease, None, CloseReason::Refreshed, now).await?;
        let opened = insert_lease_in_tx(&mut tx, new, now).await?;
        tx.commit().await?;

        info!(
            previous = %closed.lease.lease_id,
            lease_id = %opened.lease.lease_id,
            agent_id = %opened.lease.agent_id,
            returned = closed.returned.value(),
            granted = opened.lease.granted.value(),
            remaining = opened.budget_remaining.value(),
            "Lease refreshed"
        );
        Ok(RolledLease { closed, opened })
    }

    // =========================================================================
    // Usage
    // =========================================================================

    /// Charge a usage report against an open lease.
    ///
    /// Cost within the grant is charged to the lease alone. Overage is drawn
    /// from the remaining budget and added to the grant; anything beyond
    /// that is not charged and recorded as a discrepancy. An expired lease
    /// is closed and credited before [`LedgerError::LeaseExpired`] is
    /// returned.
    pub async fn apply_usage(
        &self,
        report: &UsageReport,
        now: DateTime<Utc>,
    ) -> LedgerResult<UsageOutcome> {
        report
            .cost
            .ensure_non_negative("cost")
            .map_err(|e| LedgerError::InvalidInput(e.to_string()))?;
        if report.tokens < 0 {
            return Err(LedgerError::InvalidInput("tokens must be non-negative".into()));
        }

        with_retry(&self.retry, "lease.apply_usage", move || {
            self.apply_usage_once(report, now)
        })
        .await
    }

    async fn apply_usage_once(
        &self,
        report: &UsageReport,
        now: DateTime<Utc>,
    ) -> LedgerResult<UsageOutcome> {
        let mut tx = self.pool.begin().await?;
        let lease = lock_lease(&mut tx, &report.lease_id, now).await?;
        ensure_open(&lease)?;

        if lease.provider != report.provider {
            return Err(LedgerError::ProviderMismatch {
                lease_id: lease.lease_id.to_string(),
                expected: lease.provider,
                actual: report.provider,
            });
        }

        if lease.is_expired_at(now) {
            close_in_tx(&mut tx, &lease, None, CloseReason::Expired, now).await?;
            tx.commit().await?;
            return Err(LedgerError::LeaseExpired {
                lease_id: lease.lease_id.to_string(),
            });
        }

        let budget = lock_budget(&mut tx, &lease.agent_id, now).await?;

        let within = min(report.cost, lease.remaining());
        let overage = report.cost - within;
        let draw = min(overage, budget.budget_remaining);
        let unbilled = overage - draw;
        let charged = within + draw;

        let budget_remaining = if draw.is_positive() {
            shift_spend(&mut tx, &lease.agent_id, Micros(-draw.value()), now).await?
        } else {
            budget.budget_remaining
        };

        let sql = format!(
            r#"
            UPDATE budget_leases
            SET spent = spent + ?1, granted = granted + ?2, updated_at = ?3
            WHERE lease_id = ?4
            RETURNING {}
            "#,
            LEASE_COLUMNS
        );
        let row = sqlx::query_as::<_, DbLease>(&sql)
            .bind(charged.value())
            .bind(draw.value())
            .bind(to_millis(now))
            .bind(lease.lease_id.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify(e, "apply usage"))?;
        let updated = BudgetLease::try_from(row)?;

        let event = UsageEvent {
            id: UsageEventId::new(),
            lease_id: lease.lease_id.clone(),
            agent_id: lease.agent_id.clone(),
            provider: report.provider,
            model: report.model.clone(),
            tokens: report.tokens,
            reported_cost: report.cost,
            charged,
            created_at: now,
        };
        sqlx::query(
            r#"
            INSERT INTO usage_events (id, lease_id, agent_id, provider, model, tokens,
                                      reported_cost, charged, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(event.id.as_str())
        .bind(event.lease_id.as_str())
        .bind(event.agent_id.as_str())
        .bind(event.provider.as_str())
        .bind(&event.model)
        .bind(event.tokens)
        .bind(event.reported_cost.value())
        .bind(event.charged.value())
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await
        .map_err(|e| classify(e, "usage event"))?;

        if unbilled.is_positive() {
            let record = UsageDiscrepancy {
                lease_id: lease.lease_id.clone(),
                agent_id: lease.agent_id.clone(),
                reported: report.cost,
                unbilled,
                reason: OVERAGE_REASON.to_string(),
                created_at: now,
            };
            insert_discrepancy(&mut tx, &record).await?;
        }

        tx.commit().await?;

        debug!(
            lease_id = %updated.lease_id,
            cost = report.cost.value(),
            charged = charged.value(),
            overage_drawn = draw.value(),
            lease_spent = updated.spent.value(),
            "Usage recorded"
        );

        Ok(UsageOutcome {
            lease: updated,
            event,
            budget_remaining,
            unbilled,
        })
    }

    // =========================================================================
    // Close
    // =========================================================================

    /// Close an open lease and credit back what it did not use.
    ///
    /// `reported` is the caller's final spend; `None` keeps the recorded
    /// spend. A lease returned after its expiry closes as `Expired`.
    pub async fn close(
        &self,
        lease_id: &LeaseId,
        reported: Option<Micros>,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> LedgerResult<ClosedLease> {
        if let Some(spent) = reported {
            spent
                .ensure_non_negative("spent")
                .map_err(|e| LedgerError::InvalidInput(e.to_string()))?;
        }

        with_retry(&self.retry, "lease.close", move || async move {
            let mut tx = self.pool.begin().await?;
            let lease = lock_lease(&mut tx, lease_id, now).await?;
            ensure_open(&lease)?;

            let reason = if reason == CloseReason::Returned && lease.is_expired_at(now) {
                CloseReason::Expired
            } else {
                reason
            };
            let closed = close_in_tx(&mut tx, &lease, reported, reason, now).await?;
            tx.commit().await?;
            Ok(closed)
        })
        .await
    }

    /// Close every open lease whose expiry has passed
    pub async fn reclaim_expired(&self, now: DateTime<Utc>) -> LedgerResult<Vec<ClosedLease>> {
        let candidates: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT lease_id FROM budget_leases
            WHERE status = 'open' AND expires_at IS NOT NULL AND expires_at <= ?1
            ORDER BY expires_at
            "#,
        )
        .bind(to_millis(now))
        .fetch_all(&self.pool)
        .await?;

        let mut reclaimed = Vec::with_capacity(candidates.len());
        for id in candidates {
            let lease_id = LeaseId::parse(&id)?;
            let lease_id = &lease_id;
            let closed = with_retry(&self.retry, "lease.reclaim", move || {
                self.reclaim_one(lease_id, now)
            })
            .await?;
            if let Some(closed) = closed {
                reclaimed.push(closed);
            }
        }

        if !reclaimed.is_empty() {
            info!(count = reclaimed.len(), "Expired leases reclaimed");
        }
        Ok(reclaimed)
    }

    /// Close one lease if it is still open and expired once locked
    async fn reclaim_one(
        &self,
        lease_id: &LeaseId,
        now: DateTime<Utc>,
    ) -> LedgerResult<Option<ClosedLease>> {
        let mut tx = self.pool.begin().await?;
        let lease = lock_lease(&mut tx, lease_id, now).await?;
        if !lease.is_open() || !lease.is_expired_at(now) {
            return Ok(None);
        }
        let closed = close_in_tx(&mut tx, &lease, None, CloseReason::Expired, now).await?;
        tx.commit().await?;
        Ok(Some(closed))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn find(&self, lease_id: &LeaseId) -> LedgerResult<Option<BudgetLease>> {
        let sql = format!("SELECT {} FROM budget_leases WHERE lease_id = ?1", LEASE_COLUMNS);
        let row = sqlx::query_as::<_, DbLease>(&sql)
            .bind(lease_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(BudgetLease::try_from).transpose()
    }

    pub async fn get(&self, lease_id: &LeaseId) -> LedgerResult<BudgetLease> {
        self.find(lease_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("lease", lease_id))
    }

    /// Leases of one agent, newest first
    pub async fn list_for_agent(
        &self,
        agent_id: &AgentId,
        open_only: bool,
        limit: u32,
    ) -> LedgerResult<Vec<BudgetLease>> {
        let sql = format!(
            r#"
            SELECT {} FROM budget_leases
            WHERE agent_id = ?1 AND (?2 = 0 OR status = 'open')
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?3
            "#,
            LEASE_COLUMNS
        );
        let rows = sqlx::query_as::<_, DbLease>(&sql)
            .bind(agent_id.as_str())
            .bind(open_only)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(BudgetLease::try_from).collect()
    }

    /// Usage reports of one lease, oldest first
    pub async fn usage_events(&self, lease_id: &LeaseId) -> LedgerResult<Vec<UsageEvent>> {
        let sql = format!(
            "SELECT {} FROM usage_events WHERE lease_id = ?1 ORDER BY created_at, rowid",
            USAGE_COLUMNS
        );
        let rows = sqlx::query_as::<_, DbUsageEvent>(&sql)
            .bind(lease_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(UsageEvent::try_from).collect()
    }

    /// Clamped spend recorded against one lease, oldest first
    pub async fn discrepancies(&self, lease_id: &LeaseId) -> LedgerResult<Vec<UsageDiscrepancy>> {
        let sql = format!(
            "SELECT {} FROM usage_discrepancies WHERE lease_id = ?1 ORDER BY id",
            DISCREPANCY_COLUMNS
        );
        let rows = sqlx::query_as::<_, DbDiscrepancy>(&sql)
            .bind(lease_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(UsageDiscrepancy::try_from).collect()
    }

    /// Reserved but not yet spent, summed over open leases of one agent
    pub async fn open_exposure(&self, agent_id: &AgentId) -> LedgerResult<Micros> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(granted - spent), 0) FROM budget_leases WHERE agent_id = ?1 AND status = 'open'",
        )
        .bind(agent_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(Micros(total))
    }
}
