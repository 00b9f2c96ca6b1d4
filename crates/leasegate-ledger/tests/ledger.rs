//! Ledger store integration tests against an in-memory SQLite database

use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::future::join_all;
use leasegate_ledger::*;
use leasegate_types::*;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

struct Fixture {
    ledger: Ledger,
    agent: AgentId,
    budget: BudgetId,
    key: ProviderKeyId,
}

impl Fixture {
    async fn new(initial: i64) -> Self {
        let ledger = Ledger::in_memory().await.unwrap();
        let agent = AgentId::new();
        let budget = BudgetId::new();
        ledger
            .budgets()
            .create(&agent, &budget, Micros(initial), "admin", t0())
            .await
            .unwrap();
        let key = ProviderKeyId::new();
        ledger
            .provider_keys()
            .insert(&key, Provider::OpenAi, Some("primary"), "sealed1:test", t0())
            .await
            .unwrap();
        Self {
            ledger,
            agent,
            budget,
            key,
        }
    }

    fn lease(&self, amount: i64, expires_at: Option<DateTime<Utc>>) -> NewLease {
        NewLease {
            lease_id: LeaseId::new(),
            agent_id: self.agent.clone(),
            budget_id: self.budget.clone(),
            provider: Provider::OpenAi,
            provider_key_id: self.key.clone(),
            amount: Micros(amount),
            envelope_digest: "digest".to_string(),
            expires_at,
        }
    }

    async fn open(&self, amount: i64) -> OpenedLease {
        self.ledger.leases().open(&self.lease(amount, None), t0()).await.unwrap()
    }

    async fn report(&self, lease_id: &LeaseId, cost: i64) -> LedgerResult<UsageOutcome> {
        let report = UsageReport {
            lease_id: lease_id.clone(),
            provider: Provider::OpenAi,
            model: "gpt-4o".to_string(),
            tokens: 1200,
            cost: Micros(cost),
        };
        self.ledger.leases().apply_usage(&report, t0()).await
    }

    async fn budget(&self) -> AgentBudget {
        self.ledger.budgets().get(&self.agent).await.unwrap()
    }
}

// ============================================================================
// Budgets
// ============================================================================

#[tokio::test]
async fn test_create_budget_writes_history() {
    let fx = Fixture::new(100_000_000).await;
    let budget = fx.budget().await;
    assert_eq!(budget.total_allocated, Micros(100_000_000));
    assert_eq!(budget.budget_remaining, Micros(100_000_000));
    assert_eq!(budget.total_spent, Micros::ZERO);

    let history = fx.ledger.budgets().history(&fx.agent, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, HistoryKind::Increase);
    assert_eq!(history[0].new_allocated, Micros(100_000_000));
}

#[tokio::test]
async fn test_duplicate_agent_is_rejected() {
    let fx = Fixture::new(10).await;
    let result = fx
        .ledger
        .budgets()
        .create(&fx.agent, &BudgetId::new(), Micros(10), "admin", t0())
        .await;
    assert!(matches!(result, Err(LedgerError::Duplicate(_))));
}

#[tokio::test]
async fn test_credit_allocation_and_zero() {
    let fx = Fixture::new(50).await;
    let opened = fx.open(30).await;
    fx.report(&opened.lease.lease_id, 12).await.unwrap();

    let (budget, entry) = fx
        .ledger
        .budgets()
        .credit_allocation(&fx.agent, Micros(25), "admin", "top up", t0())
        .await
        .unwrap();
    assert_eq!(budget.total_allocated, Micros(75));
    assert_eq!(budget.budget_remaining, Micros(45));
    assert_eq!(entry.change, Micros(25));

    let zeroed = fx.ledger.budgets().zero(&fx.agent, "admin", "freeze", t0()).await.unwrap();
    assert_eq!(zeroed.budget_remaining, Micros::ZERO);
    assert_eq!(zeroed.total_allocated, Micros(12));
    assert_eq!(zeroed.total_spent, Micros(12));

    let history = fx.ledger.budgets().history(&fx.agent, 10).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].kind, HistoryKind::Decrease);
}

#[tokio::test]
async fn test_zero_revokes_open_leases() {
    let fx = Fixture::new(100).await;
    let first = fx.open(30).await;
    let second = fx.open(20).await;
    fx.report(&first.lease.lease_id, 5).await.unwrap();

    let zeroed = fx.ledger.budgets().zero(&fx.agent, "admin", "freeze", t0()).await.unwrap();
    assert_eq!(zeroed.total_allocated, Micros(5));
    assert_eq!(zeroed.total_spent, Micros(5));
    assert_eq!(zeroed.budget_remaining, Micros::ZERO);

    for id in [&first.lease.lease_id, &second.lease.lease_id] {
        let lease = fx.ledger.leases().get(id).await.unwrap();
        assert_eq!(lease.status, LeaseStatus::Closed(CloseReason::Revoked));
    }
    assert_eq!(fx.ledger.leases().open_exposure(&fx.agent).await.unwrap(), Micros::ZERO);

    let late = fx
        .ledger
        .leases()
        .close(&second.lease.lease_id, Some(Micros(0)), CloseReason::Returned, t0())
        .await;
    assert!(matches!(
        late,
        Err(LedgerError::LeaseClosed {
            reason: CloseReason::Revoked,
            ..
        })
    ));

    let budget = fx.budget().await;
    assert_eq!(budget.budget_remaining, Micros::ZERO);
    assert!(budget.check_invariant().is_ok());
}

#[tokio::test]
async fn test_credit_allocation_rejects_non_positive() {
    let fx = Fixture::new(50).await;
    let result = fx
        .ledger
        .budgets()
        .credit_allocation(&fx.agent, Micros(0), "admin", "nothing", t0())
        .await;
    assert!(matches!(result, Err(LedgerError::InvalidInput(_))));
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_open_lease_debits_budget() {
    let fx = Fixture::new(100_000_000).await;
    let opened = fx.open(10_000_000).await;

    assert_eq!(opened.budget_remaining, Micros(90_000_000));
    assert_eq!(opened.lease.granted, Micros(10_000_000));
    assert!(opened.lease.is_open());

    let budget = fx.budget().await;
    assert_eq!(budget.total_spent, Micros(10_000_000));
    assert!(budget.check_invariant().is_ok());
}

#[tokio::test]
async fn test_open_lease_insufficient_budget() {
    let fx = Fixture::new(5_000_000).await;
    let result = fx.ledger.leases().open(&fx.lease(10_000_000, None), t0()).await;

    match result {
        Err(LedgerError::InsufficientBudget { requested, available }) => {
            assert_eq!(requested, Micros(10_000_000));
            assert_eq!(available, Micros(5_000_000));
        }
        other => panic!("expected insufficient budget, got {:?}", other),
    }

    let budget = fx.budget().await;
    assert_eq!(budget.budget_remaining, Micros(5_000_000));
    let leases = fx.ledger.leases().list_for_agent(&fx.agent, false, 10).await.unwrap();
    assert!(leases.is_empty());
}

#[tokio::test]
async fn test_open_lease_budget_mismatch_and_unknown_agent() {
    let fx = Fixture::new(100).await;

    let mut wrong_budget = fx.lease(10, None);
    wrong_budget.budget_id = BudgetId::new();
    assert!(matches!(
        fx.ledger.leases().open(&wrong_budget, t0()).await,
        Err(LedgerError::BudgetMismatch { .. })
    ));

    let mut unknown = fx.lease(10, None);
    unknown.agent_id = AgentId::new();
    let err = fx.ledger.leases().open(&unknown, t0()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_concurrent_opens_never_overdraw() {
    let fx = Fixture::new(100).await;
    let requests: Vec<NewLease> = (0..10).map(|_| fx.lease(20, None)).collect();
    let repo = fx.ledger.leases();

    let results = join_all(requests.iter().map(|new| repo.open(new, t0()))).await;
    let granted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(granted, 5);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, LedgerError::InsufficientBudget { .. })));

    let budget = fx.budget().await;
    assert_eq!(budget.budget_remaining, Micros::ZERO);
    assert_eq!(budget.total_spent, Micros(100));
}

// ============================================================================
// Usage
// ============================================================================

#[tokio::test]
async fn test_usage_within_lease_leaves_budget_unchanged() {
    let fx = Fixture::new(100_000_000).await;
    let opened = fx.open(10_000_000).await;

    let outcome = fx.report(&opened.lease.lease_id, 3_000_000).await.unwrap();
    assert_eq!(outcome.budget_remaining, Micros(90_000_000));
    assert_eq!(outcome.lease.spent, Micros(3_000_000));
    assert_eq!(outcome.lease.remaining(), Micros(7_000_000));
    assert_eq!(outcome.unbilled, Micros::ZERO);
    assert_eq!(outcome.event.charged, Micros(3_000_000));

    let events = fx.ledger.leases().usage_events(&opened.lease.lease_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].model, "gpt-4o");
}

#[tokio::test]
async fn test_usage_overage_draws_from_budget() {
    let fx = Fixture::new(20).await;
    let opened = fx.open(10).await;

    let outcome = fx.report(&opened.lease.lease_id, 14).await.unwrap();
    assert_eq!(outcome.lease.granted, Micros(14));
    assert_eq!(outcome.lease.spent, Micros(14));
    assert_eq!(outcome.budget_remaining, Micros(6));
    assert_eq!(outcome.unbilled, Micros::ZERO);

    let budget = fx.budget().await;
    assert_eq!(budget.total_spent, Micros(14));
    assert!(budget.check_invariant().is_ok());
}

#[tokio::test]
async fn test_usage_beyond_budget_is_clamped_and_recorded() {
    let fx = Fixture::new(12).await;
    let opened = fx.open(10).await;

    let outcome = fx.report(&opened.lease.lease_id, 20).await.unwrap();
    assert_eq!(outcome.budget_remaining, Micros::ZERO);
    assert_eq!(outcome.lease.spent, Micros(12));
    assert_eq!(outcome.unbilled, Micros(8));

    let budget = fx.budget().await;
    assert_eq!(budget.total_spent, Micros(12));
    assert_eq!(budget.total_allocated, Micros(12));

    let records = fx.ledger.leases().discrepancies(&opened.lease.lease_id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].unbilled, Micros(8));
    assert_eq!(records[0].reported, Micros(20));
}

#[tokio::test]
async fn test_usage_provider_mismatch() {
    let fx = Fixture::new(100).await;
    let opened = fx.open(10).await;

    let report = UsageReport {
        lease_id: opened.lease.lease_id.clone(),
        provider: Provider::Anthropic,
        model: "claude".to_string(),
        tokens: 1,
        cost: Micros(1),
    };
    let result = fx.ledger.leases().apply_usage(&report, t0()).await;
    assert!(matches!(result, Err(LedgerError::ProviderMismatch { .. })));
}

#[tokio::test]
async fn test_usage_on_expired_lease_reclaims_it() {
    let fx = Fixture::new(100).await;
    let new = fx.lease(40, Some(t0() + Duration::minutes(5)));
    let opened = fx.ledger.leases().open(&new, t0()).await.unwrap();

    let report = UsageReport {
        lease_id: opened.lease.lease_id.clone(),
        provider: Provider::OpenAi,
        model: "gpt-4o".to_string(),
        tokens: 10,
        cost: Micros(5),
    };
    let later = t0() + Duration::minutes(6);
    let result = fx.ledger.leases().apply_usage(&report, later).await;
    assert!(matches!(result, Err(LedgerError::LeaseExpired { .. })));

    let lease = fx.ledger.leases().get(&opened.lease.lease_id).await.unwrap();
    assert_eq!(lease.status, LeaseStatus::Closed(CloseReason::Expired));
    assert_eq!(fx.budget().await.budget_remaining, Micros(100));

    let again = fx.ledger.leases().apply_usage(&report, later).await;
    assert!(matches!(again, Err(LedgerError::LeaseExpired { .. })));
    assert_eq!(fx.budget().await.budget_remaining, Micros(100));
}

// ============================================================================
// Close
// ============================================================================

#[tokio::test]
async fn test_return_credits_unused_once() {
    let fx = Fixture::new(100_000_000).await;
    let opened = fx.open(10_000_000).await;
    let lease_id = opened.lease.lease_id.clone();

    let closed = fx
        .ledger
        .leases()
        .close(&lease_id, Some(Micros(4_000_000)), CloseReason::Returned, t0())
        .await
        .unwrap();
    assert_eq!(closed.returned, Micros(6_000_000));
    assert_eq!(closed.budget_remaining, Micros(96_000_000));
    assert_eq!(closed.lease.status, LeaseStatus::Closed(CloseReason::Returned));

    let again = fx
        .ledger
        .leases()
        .close(&lease_id, Some(Micros(0)), CloseReason::Returned, t0())
        .await;
    assert!(matches!(
        again,
        Err(LedgerError::LeaseClosed {
            reason: CloseReason::Returned,
            ..
        })
    ));
    assert_eq!(fx.budget().await.budget_remaining, Micros(96_000_000));
}

#[tokio::test]
async fn test_return_keeps_larger_recorded_spend() {
    let fx = Fixture::new(100).await;
    let opened = fx.open(50).await;
    fx.report(&opened.lease.lease_id, 30).await.unwrap();

    let closed = fx
        .ledger
        .leases()
        .close(&opened.lease.lease_id, Some(Micros(10)), CloseReason::Returned, t0())
        .await
        .unwrap();
    assert_eq!(closed.lease.spent, Micros(30));
    assert_eq!(closed.returned, Micros(20));
    assert_eq!(fx.budget().await.total_spent, Micros(30));
}

#[tokio::test]
async fn test_return_over_grant_is_clamped() {
    let fx = Fixture::new(100).await;
    let opened = fx.open(50).await;

    let closed = fx
        .ledger
        .leases()
        .close(&opened.lease.lease_id, Some(Micros(70)), CloseReason::Returned, t0())
        .await
        .unwrap();
    assert_eq!(closed.returned, Micros::ZERO);
    assert_eq!(closed.lease.spent, Micros(50));

    let records = fx.ledger.leases().discrepancies(&opened.lease.lease_id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].unbilled, Micros(20));
}

#[tokio::test]
async fn test_late_return_closes_as_expired() {
    let fx = Fixture::new(100).await;
    let opened = fx
        .ledger
        .leases()
        .open(&fx.lease(40, Some(t0() + Duration::seconds(30))), t0())
        .await
        .unwrap();

    let closed = fx
        .ledger
        .leases()
        .close(
            &opened.lease.lease_id,
            Some(Micros(10)),
            CloseReason::Returned,
            t0() + Duration::minutes(1),
        )
        .await
        .unwrap();
    assert_eq!(closed.lease.status, LeaseStatus::Closed(CloseReason::Expired));
    assert_eq!(closed.returned, Micros(30));
}

#[tokio::test]
async fn test_reclaim_expired_sweeps_only_expired() {
    let fx = Fixture::new(100).await;
    let short = fx
        .ledger
        .leases()
        .open(&fx.lease(20, Some(t0() + Duration::minutes(1))), t0())
        .await
        .unwrap();
    let long = fx
        .ledger
        .leases()
        .open(&fx.lease(30, Some(t0() + Duration::hours(1))), t0())
        .await
        .unwrap();
    let unbounded = fx.open(10).await;

    let reclaimed = fx
        .ledger
        .leases()
        .reclaim_expired(t0() + Duration::minutes(2))
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].lease.lease_id, short.lease.lease_id);
    assert_eq!(reclaimed[0].returned, Micros(20));

    let open = fx.ledger.leases().list_for_agent(&fx.agent, true, 10).await.unwrap();
    let ids: Vec<_> = open.iter().map(|l| l.lease_id.clone()).collect();
    assert!(ids.contains(&long.lease.lease_id));
    assert!(ids.contains(&unbounded.lease.lease_id));
    assert_eq!(fx.ledger.leases().open_exposure(&fx.agent).await.unwrap(), Micros(40));

    let swept = fx.report(&short.lease.lease_id, 1).await;
    assert!(matches!(swept, Err(LedgerError::LeaseExpired { .. })));
}

// ============================================================================
// Rollover
// ============================================================================

#[tokio::test]
async fn test_rollover_closes_old_and_opens_new() {
    let fx = Fixture::new(100).await;
    let opened = fx.open(40).await;
    fx.report(&opened.lease.lease_id, 15).await.unwrap();

    let rolled = fx
        .ledger
        .leases()
        .rollover(&opened.lease.lease_id, &fx.lease(50, None), t0())
        .await
        .unwrap();
    assert_eq!(rolled.closed.lease.status, LeaseStatus::Closed(CloseReason::Refreshed));
    assert_eq!(rolled.closed.returned, Micros(25));
    assert_eq!(rolled.opened.lease.status, LeaseStatus::Open);
    assert_eq!(rolled.opened.lease.granted, Micros(50));
    assert_eq!(rolled.opened.budget_remaining, Micros(35));

    let budget = fx.budget().await;
    assert_eq!(budget.total_spent, Micros(65));
    assert!(budget.check_invariant().is_ok());
}

#[tokio::test]
async fn test_rollover_without_budget_changes_nothing() {
    let fx = Fixture::new(100).await;
    let opened = fx.open(40).await;

    let result = fx
        .ledger
        .leases()
        .rollover(&opened.lease.lease_id, &fx.lease(101, None), t0())
        .await;
    assert!(matches!(result, Err(LedgerError::InsufficientBudget { .. })));

    let lease = fx.ledger.leases().get(&opened.lease.lease_id).await.unwrap();
    assert_eq!(lease.status, LeaseStatus::Open);
    let budget = fx.budget().await;
    assert_eq!(budget.budget_remaining, Micros(60));
    assert_eq!(budget.total_spent, Micros(40));
}

#[tokio::test]
async fn test_rollover_rejects_other_agent_and_expired_lease() {
    let fx = Fixture::new(100).await;
    let opened = fx
        .ledger
        .leases()
        .open(&fx.lease(40, Some(t0() + Duration::minutes(1))), t0())
        .await
        .unwrap();

    let mut foreign = fx.lease(10, None);
    foreign.agent_id = AgentId::new();
    let result = fx.ledger.leases().rollover(&opened.lease.lease_id, &foreign, t0()).await;
    assert!(matches!(result, Err(LedgerError::Forbidden(_))));

    let later = t0() + Duration::minutes(2);
    let result = fx
        .ledger
        .leases()
        .rollover(&opened.lease.lease_id, &fx.lease(10, None), later)
        .await;
    assert!(matches!(result, Err(LedgerError::LeaseExpired { .. })));

    let lease = fx.ledger.leases().get(&opened.lease.lease_id).await.unwrap();
    assert_eq!(lease.status, LeaseStatus::Closed(CloseReason::Expired));
    assert_eq!(fx.budget().await.budget_remaining, Micros(100));
    assert_eq!(fx.ledger.leases().list_for_agent(&fx.agent, true, 10).await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_unknown_lease_is_not_found() {
    let fx = Fixture::new(100).await;
    let result = fx
        .ledger
        .leases()
        .close(&LeaseId::new(), None, CloseReason::Revoked, t0())
        .await;
    assert!(matches!(result, Err(LedgerError::NotFound { entity: "lease", .. })));
}

// ============================================================================
// Requests
// ============================================================================

fn request(fx: &Fixture, amount: i64) -> NewBudgetRequest {
    NewBudgetRequest {
        agent_id: fx.agent.clone(),
        requester_id: "user_alice".to_string(),
        amount: Micros(amount),
        justification: "Need more budget for the nightly evaluation run".to_string(),
    }
}

#[tokio::test]
async fn test_request_approval_raises_budget() {
    let fx = Fixture::new(100).await;
    fx.open(40).await;

    let created = fx.ledger.requests().create(&request(&fx, 50), t0()).await.unwrap();
    assert_eq!(created.status, RequestStatus::Pending);
    assert_eq!(created.current_budget, Micros(100));
    assert_eq!(created.requested_budget, Micros(150));

    let approved = fx
        .ledger
        .requests()
        .approve(&created.request_id, "admin_bob", t0())
        .await
        .unwrap();
    assert_eq!(approved.request.status, RequestStatus::Approved);
    assert_eq!(approved.request.decided_by.as_deref(), Some("admin_bob"));
    assert_eq!(approved.budget.total_allocated, Micros(150));
    assert_eq!(approved.budget.budget_remaining, Micros(110));
    assert_eq!(approved.history.related_request_id, Some(created.request_id.clone()));

    let again = fx.ledger.requests().approve(&created.request_id, "admin_bob", t0()).await;
    assert!(matches!(
        again,
        Err(LedgerError::RequestConflict {
            current: RequestStatus::Approved,
            ..
        })
    ));
    assert_eq!(fx.budget().await.total_allocated, Micros(150));
}

#[tokio::test]
async fn test_request_reject_and_cancel() {
    let fx = Fixture::new(100).await;
    let first = fx.ledger.requests().create(&request(&fx, 10), t0()).await.unwrap();
    let second = fx.ledger.requests().create(&request(&fx, 20), t0()).await.unwrap();

    let rejected = fx
        .ledger
        .requests()
        .reject(&first.request_id, "admin_bob", Some("not this quarter"), t0())
        .await
        .unwrap();
    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_eq!(rejected.decision_note.as_deref(), Some("not this quarter"));

    let forbidden = fx.ledger.requests().cancel(&second.request_id, "user_mallory", t0()).await;
    assert!(matches!(forbidden, Err(LedgerError::Forbidden(_))));

    let cancelled = fx
        .ledger
        .requests()
        .cancel(&second.request_id, "user_alice", t0())
        .await
        .unwrap();
    assert_eq!(cancelled.status, RequestStatus::Cancelled);

    let approve_cancelled = fx.ledger.requests().approve(&second.request_id, "admin_bob", t0()).await;
    assert!(matches!(approve_cancelled, Err(LedgerError::RequestConflict { .. })));
    assert_eq!(fx.budget().await.total_allocated, Micros(100));

    let missing = fx.ledger.requests().approve(&RequestId::new(), "admin_bob", t0()).await;
    assert_eq!(missing.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_request_listing_filters() {
    let fx = Fixture::new(100).await;
    let first = fx.ledger.requests().create(&request(&fx, 10), t0()).await.unwrap();
    fx.ledger.requests().create(&request(&fx, 20), t0()).await.unwrap();
    fx.ledger.requests().reject(&first.request_id, "admin", None, t0()).await.unwrap();

    let pending = fx
        .ledger
        .requests()
        .list(&RequestFilter {
            status: Some(RequestStatus::Pending),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);

    let all = fx
        .ledger
        .requests()
        .list(&RequestFilter {
            agent_id: Some(fx.agent.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}

// ============================================================================
// Provider Keys
// ============================================================================

#[tokio::test]
async fn test_provider_key_selection() {
    let fx = Fixture::new(100).await;
    let repo = fx.ledger.provider_keys();

    let later = ProviderKeyId::new();
    repo.insert(&later, Provider::OpenAi, None, "sealed1:other", t0() + Duration::seconds(1))
        .await
        .unwrap();

    let first = repo.first_enabled(Provider::OpenAi).await.unwrap().unwrap();
    assert_eq!(first.key_id, fx.key.as_str());

    repo.set_enabled(&fx.key, false).await.unwrap();
    let first = repo.first_enabled(Provider::OpenAi).await.unwrap().unwrap();
    assert_eq!(first.key_id, later.as_str());

    assert!(repo.first_enabled(Provider::Anthropic).await.unwrap().is_none());

    repo.touch_last_used(&later, t0()).await.unwrap();
    let listed = repo.list().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(!listed[0].enabled);
    assert_eq!(listed[1].last_used_at, Some(t0()));
}
