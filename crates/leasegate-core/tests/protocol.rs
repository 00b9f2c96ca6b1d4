//! End-to-end protocol scenarios: handshake, usage, return, requests

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use leasegate_auth::{AuthError, IdentityConfig, IdentityVerifier};
use leasegate_core::*;
use leasegate_crypto::{CredentialEncryptor, CredentialVault, CryptoError, RootKey, SecretString, WrappedCredential};
use leasegate_ledger::{Ledger, LedgerConfig, RequestFilter};
use leasegate_types::*;

const PROVIDER_SECRET: &str = "sk-test-0123456789abcdefghijklmnop";
const SIGNING_SECRET: &str = "test-signing-secret-at-least-32-bytes";

struct Harness {
    control: BudgetControl,
    clock: Arc<ManualClock>,
    agent: AgentRegistration,
    key: ProviderKeyInfo,
}

impl Harness {
    async fn new(allocation: i64) -> Self {
        Self::with(LedgerConfig::in_memory(), allocation, LeasePolicy::default()).await
    }

    async fn with(config: LedgerConfig, allocation: i64, policy: LeasePolicy) -> Self {
        let ledger = Ledger::connect(&config).await.unwrap();
        let verifier = IdentityVerifier::new(IdentityConfig {
            secret: SIGNING_SECRET.to_string(),
            ..Default::default()
        });
        let encryptor = CredentialEncryptor::new(&RootKey::from_bytes([7u8; 32])).unwrap();
        let vault = CredentialVault::new(&RootKey::from_bytes([9u8; 32])).unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let control = BudgetControl::with_clock(ledger, verifier, encryptor, vault, policy, clock.clone());
        let key = control
            .provider_keys()
            .add(Provider::OpenAi, SecretString::new(PROVIDER_SECRET), Some("primary"))
            .await
            .unwrap();
        let agent = control
            .agents()
            .register(Micros(allocation), "admin", None)
            .await
            .unwrap();

        Self {
            control,
            clock,
            agent,
            key,
        }
    }

    fn handshake_request(&self, amount: Option<i64>) -> HandshakeRequest {
        HandshakeRequest {
            token: self.agent.token.clone(),
            provider: Provider::OpenAi,
            provider_key_id: None,
            amount: amount.map(Micros),
        }
    }

    async fn handshake(&self, amount: Option<i64>) -> ControlResult<LeaseGrant> {
        self.control.leases().handshake(self.handshake_request(amount)).await
    }

    async fn report(&self, lease_id: &LeaseId, cost: i64) -> ControlResult<UsageReceipt> {
        self.control
            .reconciler()
            .report_usage(UsageInput {
                lease_id: lease_id.clone(),
                provider: Provider::OpenAi,
                model: "gpt-4o-mini".to_string(),
                tokens: 1500,
                cost: Micros(cost),
            })
            .await
    }

    async fn status(&self) -> BudgetStatus {
        self.control.agents().budget_status(&self.agent.agent_id).await.unwrap()
    }
}

/// A file-backed ledger so concurrent transactions use separate connections
struct TempDb(PathBuf);

impl TempDb {
    fn new() -> Self {
        Self(std::env::temp_dir().join(format!("leasegate-test-{}.db", uuid::Uuid::new_v4())))
    }

    fn config(&self) -> LedgerConfig {
        LedgerConfig {
            url: format!("sqlite://{}", self.0.display()),
            max_connections: 8,
            ..Default::default()
        }
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.0.display(), suffix));
        }
    }
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_handshake_grants_default_amount() {
    let h = Harness::new(100_000_000).await;
    let grant = h.handshake(None).await.unwrap();

    assert_eq!(grant.granted, Micros(10_000_000));
    assert_eq!(grant.budget_remaining, Micros(90_000_000));
    assert_eq!(grant.provider_key_id, h.key.key_id);
    assert!(grant.expires_at.is_some());

    let credential = h.control.encryptor().unwrap(&grant.wrapped_credential).unwrap();
    assert_eq!(credential.expose_secret(), PROVIDER_SECRET);

    let lease = h.control.leases().get(&grant.lease_id).await.unwrap();
    assert!(lease.is_open());
    assert_eq!(lease.envelope_digest, grant.wrapped_credential.digest());

    let keys = h.control.provider_keys().list().await.unwrap();
    assert!(keys[0].last_used_at.is_some());
}

#[tokio::test]
async fn test_handshake_insufficient_budget_changes_nothing() {
    let h = Harness::new(5_000_000).await;
    let err = h.handshake(Some(10_000_000)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Budget);
    assert_eq!(err.code(), "INSUFFICIENT_BUDGET");

    let status = h.status().await;
    assert_eq!(status.budget.budget_remaining, Micros(5_000_000));
    assert_eq!(status.open_leases, 0);
}

#[tokio::test]
async fn test_handshake_rejects_amount_over_maximum() {
    let h = Harness::new(500_000_000).await;
    let err = h.handshake(Some(100_000_001)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(h.status().await.budget.budget_remaining, Micros(500_000_000));
}

#[tokio::test]
async fn test_handshake_rejects_expired_claim() {
    let h = Harness::new(100_000_000).await;

    let now = Utc::now().timestamp();
    let claims = serde_json::json!({
        "agent_id": h.agent.agent_id.as_str(),
        "budget_id": h.agent.budget_id.as_str(),
        "permissions": ["llm:call"],
        "iat": now - 7200,
        "exp": now - 3600,
        "iss": "leasegate",
    });
    let expired = jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(SIGNING_SECRET.as_bytes()),
    )
    .unwrap();

    let mut request = h.handshake_request(None);
    request.token = expired;
    let err = h.control.leases().handshake(request).await.unwrap_err();

    assert!(matches!(err, ControlError::Auth(AuthError::TokenExpired)));
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(h.status().await.budget.budget_remaining, Micros(100_000_000));
}

#[tokio::test]
async fn test_handshake_requires_permission() {
    let h = Harness::new(100_000_000).await;
    let token = h
        .control
        .verifier()
        .issue(&h.agent.agent_id, &h.agent.budget_id, &[], None)
        .unwrap();

    let mut request = h.handshake_request(None);
    request.token = token;
    let err = h.control.leases().handshake(request).await.unwrap_err();
    assert!(matches!(err, ControlError::Auth(AuthError::MissingPermission(_))));
}

#[tokio::test]
async fn test_handshake_with_foreign_budget_id_is_unauthenticated() {
    let h = Harness::new(100_000_000).await;
    let token = h
        .control
        .verifier()
        .issue(&h.agent.agent_id, &BudgetId::new(), &["llm:call"], None)
        .unwrap();

    let mut request = h.handshake_request(None);
    request.token = token;
    let err = h.control.leases().handshake(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(err.code(), "INVALID_CLAIM");
    assert_eq!(h.status().await.budget.budget_remaining, Micros(100_000_000));
}

#[tokio::test]
async fn test_handshake_key_selection_errors() {
    let h = Harness::new(100_000_000).await;

    let mut request = h.handshake_request(None);
    request.provider = Provider::Anthropic;
    let err = h.control.leases().handshake(request).await.unwrap_err();
    assert!(matches!(err, ControlError::ProviderKeyNotFound(_)));

    let mut request = h.handshake_request(None);
    request.provider_key_id = Some(ProviderKeyId::new());
    let err = h.control.leases().handshake(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    h.control
        .provider_keys()
        .set_enabled(&h.key.key_id, false)
        .await
        .unwrap();
    let mut request = h.handshake_request(None);
    request.provider_key_id = Some(h.key.key_id.clone());
    let err = h.control.leases().handshake(request).await.unwrap_err();
    assert!(matches!(err, ControlError::ProviderKeyDisabled(_)));

    assert_eq!(h.status().await.budget.budget_remaining, Micros(100_000_000));
}

#[tokio::test]
async fn test_tampered_envelope_fails_decryption() {
    let h = Harness::new(100_000_000).await;
    let grant = h.handshake(None).await.unwrap();

    let raw = grant.wrapped_credential.as_str();
    let (version, payload) = raw.split_once(':').unwrap();
    let mut bytes = payload.as_bytes().to_vec();
    let middle = bytes.len() / 2;
    bytes[middle] = if bytes[middle] == b'A' { b'B' } else { b'A' };
    let tampered = format!("{}:{}", version, String::from_utf8(bytes).unwrap());

    let envelope = WrappedCredential::parse(&tampered).unwrap();
    let err = h.control.encryptor().unwrap(&envelope).unwrap_err();
    assert!(matches!(err, CryptoError::DecryptionFailed));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_handshakes_exactly_one_succeeds() {
    let db = TempDb::new();
    let h = Harness::with(db.config(), 100_000_000, LeasePolicy::default()).await;

    let first = h.control.leases();
    let second = h.control.leases();
    let (a, b) = tokio::join!(
        first.handshake(h.handshake_request(Some(60_000_000))),
        second.handshake(h.handshake_request(Some(60_000_000))),
    );

    let outcomes = [a, b];
    let granted = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(granted, 1);
    let refused = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(refused.kind(), ErrorKind::Budget);

    let status = h.status().await;
    assert_eq!(status.budget.budget_remaining, Micros(40_000_000));
    assert_eq!(status.budget.total_spent, Micros(60_000_000));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_handshakes_never_overdraw() {
    let db = TempDb::new();
    let h = Harness::with(db.config(), 100_000_000, LeasePolicy::default()).await;

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let control = h.control.clone();
        let request = h.handshake_request(Some(10_000_000));
        tasks.push(tokio::spawn(async move { control.leases().handshake(request).await }));
    }

    let mut granted = 0;
    for task in futures::future::join_all(tasks).await {
        match task.unwrap() {
            Ok(_) => granted += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::Budget, "unexpected error: {}", err),
        }
    }
    assert_eq!(granted, 10);

    let status = h.status().await;
    assert_eq!(status.budget.budget_remaining, Micros::ZERO);
    assert_eq!(status.open_leases, 10);
    assert_eq!(status.open_exposure, Micros(100_000_000));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reports_and_returns_on_one_lease() {
    let db = TempDb::new();
    let h = Harness::with(db.config(), 200_000_000, LeasePolicy::default()).await;
    let grant = h.handshake(Some(10_000_000)).await.unwrap();

    let mut reports = Vec::new();
    for _ in 0..16 {
        let control = h.control.clone();
        let lease_id = grant.lease_id.clone();
        reports.push(tokio::spawn(async move {
            control
                .reconciler()
                .report_usage(UsageInput {
                    lease_id,
                    provider: Provider::OpenAi,
                    model: "gpt-4o".to_string(),
                    tokens: 900,
                    cost: Micros(9_000_000),
                })
                .await
        }));
    }
    let mut returns = Vec::new();
    for _ in 0..8 {
        let control = h.control.clone();
        let lease_id = grant.lease_id.clone();
        returns.push(tokio::spawn(async move {
            control.reconciler().return_lease(&lease_id, Micros::ZERO).await
        }));
    }

    for task in futures::future::join_all(reports).await {
        if let Err(err) = task.unwrap() {
            assert_eq!(err.code(), "LEASE_CLOSED", "unexpected error: {}", err);
        }
    }
    let mut closed = Vec::new();
    for task in futures::future::join_all(returns).await {
        match task.unwrap() {
            Ok(receipt) => closed.push(receipt),
            Err(err) => assert_eq!(err.code(), "LEASE_CLOSED", "unexpected error: {}", err),
        }
    }
    assert_eq!(closed.len(), 1);

    let lease = h.control.leases().get(&grant.lease_id).await.unwrap();
    assert_eq!(lease.status, LeaseStatus::Closed(CloseReason::Returned));
    assert_eq!(closed[0].spent, lease.spent);

    let status = h.status().await;
    assert_eq!(status.open_leases, 0);
    assert!(status.budget.check_invariant().is_ok());
    assert_eq!(status.budget.total_spent, lease.spent);
    assert_eq!(status.budget.budget_remaining, Micros(200_000_000) - lease.spent);
    assert!(h.control.ledger().budgets().find_inconsistent().await.unwrap().is_empty());
}

// ============================================================================
// Lease rollover
// ============================================================================

fn refresh_request(token: &str, lease_id: &LeaseId, amount: Option<i64>) -> LeaseRefreshRequest {
    LeaseRefreshRequest {
        token: token.to_string(),
        current_lease_id: lease_id.clone(),
        amount: amount.map(Micros),
    }
}

#[tokio::test]
async fn test_refresh_lease_rolls_over_unspent_budget() {
    let h = Harness::new(100_000_000).await;
    let grant = h.handshake(Some(10_000_000)).await.unwrap();
    h.report(&grant.lease_id, 4_000_000).await.unwrap();

    let refresh = h
        .control
        .leases()
        .refresh_lease(refresh_request(&h.agent.token, &grant.lease_id, Some(20_000_000)))
        .await
        .unwrap();
    assert_eq!(refresh.previous_lease_id, grant.lease_id);
    assert_eq!(refresh.returned, Micros(6_000_000));
    assert_ne!(refresh.grant.lease_id, grant.lease_id);
    assert_eq!(refresh.grant.granted, Micros(20_000_000));
    assert_eq!(refresh.grant.budget_remaining, Micros(76_000_000));
    assert_eq!(refresh.grant.provider_key_id, grant.provider_key_id);

    let credential = h.control.encryptor().unwrap(&refresh.grant.wrapped_credential).unwrap();
    assert_eq!(credential.expose_secret(), PROVIDER_SECRET);

    let old = h.control.leases().get(&grant.lease_id).await.unwrap();
    assert_eq!(old.status, LeaseStatus::Closed(CloseReason::Refreshed));
    assert_eq!(old.spent, Micros(4_000_000));

    let err = h.report(&grant.lease_id, 1).await.unwrap_err();
    assert_eq!(err.code(), "LEASE_CLOSED");

    let status = h.status().await;
    assert_eq!(status.open_leases, 1);
    assert_eq!(status.budget.total_spent, Micros(24_000_000));
    assert!(status.budget.check_invariant().is_ok());
}

#[tokio::test]
async fn test_refresh_lease_without_budget_changes_nothing() {
    let h = Harness::new(30_000_000).await;
    let grant = h.handshake(Some(10_000_000)).await.unwrap();

    let err = h
        .control
        .leases()
        .refresh_lease(refresh_request(&h.agent.token, &grant.lease_id, Some(40_000_000)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INSUFFICIENT_BUDGET");

    let lease = h.control.leases().get(&grant.lease_id).await.unwrap();
    assert_eq!(lease.status, LeaseStatus::Open);
    let status = h.status().await;
    assert_eq!(status.open_leases, 1);
    assert_eq!(status.budget.budget_remaining, Micros(20_000_000));
    assert_eq!(status.budget.total_spent, Micros(10_000_000));
}

#[tokio::test]
async fn test_refresh_lease_requires_holder() {
    let h = Harness::new(100_000_000).await;
    let grant = h.handshake(Some(10_000_000)).await.unwrap();
    let other = h
        .control
        .agents()
        .register(Micros(50_000_000), "admin", None)
        .await
        .unwrap();

    let err = h
        .control
        .leases()
        .refresh_lease(refresh_request(&other.token, &grant.lease_id, None))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");

    let err = h
        .control
        .leases()
        .refresh_lease(refresh_request("not-a-jwt", &grant.lease_id, None))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);

    let err = h
        .control
        .leases()
        .refresh_lease(refresh_request(&h.agent.token, &LeaseId::new(), None))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "LEASE_NOT_FOUND");

    let lease = h.control.leases().get(&grant.lease_id).await.unwrap();
    assert_eq!(lease.status, LeaseStatus::Open);
    assert_eq!(
        h.control.agents().budget_status(&other.agent_id).await.unwrap().budget.total_spent,
        Micros::ZERO
    );
}

#[tokio::test]
async fn test_refresh_of_expired_lease_reclaims_it() {
    let policy = LeasePolicy {
        lease_ttl: Some(std::time::Duration::from_secs(60)),
        ..Default::default()
    };
    let h = Harness::with(LedgerConfig::in_memory(), 100_000_000, policy).await;
    let grant = h.handshake(Some(10_000_000)).await.unwrap();

    h.clock.advance(Duration::minutes(2));
    let err = h
        .control
        .leases()
        .refresh_lease(refresh_request(&h.agent.token, &grant.lease_id, None))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "LEASE_EXPIRED");

    let status = h.status().await;
    assert_eq!(status.open_leases, 0);
    assert_eq!(status.budget.budget_remaining, Micros(100_000_000));
}

#[tokio::test]
async fn test_lease_discrepancies_are_listed() {
    let h = Harness::new(12_000_000).await;
    let grant = h.handshake(Some(10_000_000)).await.unwrap();
    assert!(h.control.leases().discrepancies(&grant.lease_id).await.unwrap().is_empty());

    let receipt = h.report(&grant.lease_id, 20_000_000).await.unwrap();
    assert_eq!(receipt.unbilled, Micros(8_000_000));

    let records = h.control.leases().discrepancies(&grant.lease_id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reported, Micros(20_000_000));
    assert_eq!(records[0].unbilled, Micros(8_000_000));

    let err = h.control.leases().discrepancies(&LeaseId::new()).await.unwrap_err();
    assert_eq!(err.code(), "LEASE_NOT_FOUND");
}

// ============================================================================
// Usage and return
// ============================================================================

#[tokio::test]
async fn test_report_within_lease_then_return() {
    let h = Harness::new(100_000_000).await;
    let grant = h.handshake(None).await.unwrap();

    let receipt = h.report(&grant.lease_id, 3_000_000).await.unwrap();
    assert_eq!(receipt.budget_remaining, Micros(90_000_000));
    assert_eq!(receipt.lease_remaining, Micros(7_000_000));
    assert_eq!(receipt.unbilled, Micros::ZERO);

    let returned = h
        .control
        .reconciler()
        .return_lease(&grant.lease_id, Micros(3_000_000))
        .await
        .unwrap();
    assert_eq!(returned.returned, Micros(7_000_000));
    assert_eq!(returned.budget_remaining, Micros(97_000_000));
    assert_eq!(returned.status, LeaseStatus::Closed(CloseReason::Returned));

    let again = h
        .control
        .reconciler()
        .return_lease(&grant.lease_id, Micros(0))
        .await
        .unwrap_err();
    assert_eq!(again.code(), "LEASE_CLOSED");
    assert_eq!(again.kind(), ErrorKind::LeaseState);

    let status = h.status().await;
    assert_eq!(status.budget.total_spent, Micros(3_000_000));
    assert_eq!(status.budget.budget_remaining, Micros(97_000_000));

    let events = h.control.leases().usage(&grant.lease_id).await.unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_report_validation() {
    let h = Harness::new(100_000_000).await;
    let grant = h.handshake(None).await.unwrap();
    let reconciler = h.control.reconciler();

    let mut input = UsageInput {
        lease_id: grant.lease_id.clone(),
        provider: Provider::OpenAi,
        model: "   ".to_string(),
        tokens: 10,
        cost: Micros(1),
    };
    assert_eq!(
        reconciler.report_usage(input.clone()).await.unwrap_err().kind(),
        ErrorKind::Validation
    );

    input.model = "m".repeat(MAX_MODEL_LEN + 1);
    assert!(reconciler.report_usage(input.clone()).await.is_err());

    input.model = "gpt-4o".to_string();
    input.cost = Micros(-1);
    assert!(reconciler.report_usage(input.clone()).await.is_err());

    input.cost = Micros(1);
    input.provider = Provider::Anthropic;
    let err = reconciler.report_usage(input).await.unwrap_err();
    assert_eq!(err.code(), "PROVIDER_MISMATCH");

    let err = h.report(&LeaseId::new(), 1).await.unwrap_err();
    assert_eq!(err.code(), "LEASE_NOT_FOUND");
}

#[tokio::test]
async fn test_overage_is_clamped_to_budget() {
    let h = Harness::new(12_000_000).await;
    let grant = h.handshake(Some(10_000_000)).await.unwrap();

    let receipt = h.report(&grant.lease_id, 20_000_000).await.unwrap();
    assert_eq!(receipt.charged, Micros(12_000_000));
    assert_eq!(receipt.unbilled, Micros(8_000_000));
    assert_eq!(receipt.budget_remaining, Micros::ZERO);

    let status = h.status().await;
    assert!(status.budget.check_invariant().is_ok());
    assert_eq!(status.budget.total_spent, Micros(12_000_000));
}

#[tokio::test]
async fn test_expired_lease_is_reclaimed_on_report() {
    let policy = LeasePolicy {
        lease_ttl: Some(std::time::Duration::from_secs(60)),
        ..Default::default()
    };
    let h = Harness::with(LedgerConfig::in_memory(), 100_000_000, policy).await;
    let grant = h.handshake(None).await.unwrap();

    h.clock.advance(Duration::minutes(2));
    let err = h.report(&grant.lease_id, 1_000_000).await.unwrap_err();
    assert_eq!(err.code(), "LEASE_EXPIRED");
    assert_eq!(err.kind(), ErrorKind::LeaseState);

    let lease = h.control.leases().get(&grant.lease_id).await.unwrap();
    assert_eq!(lease.status, LeaseStatus::Closed(CloseReason::Expired));
    assert_eq!(h.status().await.budget.budget_remaining, Micros(100_000_000));

    let again = h.report(&grant.lease_id, 1_000_000).await.unwrap_err();
    assert_eq!(again.code(), "LEASE_EXPIRED");
    assert_eq!(h.status().await.budget.budget_remaining, Micros(100_000_000));
}

#[tokio::test]
async fn test_sweep_reclaims_expired_leases() {
    let policy = LeasePolicy {
        lease_ttl: Some(std::time::Duration::from_secs(60)),
        ..Default::default()
    };
    let h = Harness::with(LedgerConfig::in_memory(), 100_000_000, policy).await;
    let first = h.handshake(Some(20_000_000)).await.unwrap();
    h.handshake(Some(30_000_000)).await.unwrap();
    h.report(&first.lease_id, 5_000_000).await.unwrap();

    let none = h.control.reconciler().reclaim_expired().await.unwrap();
    assert_eq!(none.reclaimed, 0);

    h.clock.advance(Duration::seconds(61));
    let report = h.control.reconciler().reclaim_expired().await.unwrap();
    assert_eq!(report.reclaimed, 2);
    assert_eq!(report.returned, Micros(45_000_000));

    let status = h.status().await;
    assert_eq!(status.open_leases, 0);
    assert_eq!(status.budget.total_spent, Micros(5_000_000));

    let err = h.report(&first.lease_id, 1_000_000).await.unwrap_err();
    assert_eq!(err.code(), "LEASE_EXPIRED");
    let err = h
        .control
        .reconciler()
        .return_lease(&first.lease_id, Micros(5_000_000))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "LEASE_EXPIRED");
    assert_eq!(h.status().await.budget.total_spent, Micros(5_000_000));
}

#[tokio::test]
async fn test_revoke_keeps_recorded_spend() {
    let h = Harness::new(100_000_000).await;
    let grant = h.handshake(None).await.unwrap();
    h.report(&grant.lease_id, 4_000_000).await.unwrap();

    let receipt = h
        .control
        .reconciler()
        .revoke_lease(&grant.lease_id, "admin")
        .await
        .unwrap();
    assert_eq!(receipt.status, LeaseStatus::Closed(CloseReason::Revoked));
    assert_eq!(receipt.spent, Micros(4_000_000));
    assert_eq!(receipt.returned, Micros(6_000_000));
}

// ============================================================================
// Budget administration
// ============================================================================

#[tokio::test]
async fn test_refresh_and_zero_budget() {
    let h = Harness::new(10_000_000).await;
    let reconciler = h.control.reconciler();

    let err = reconciler
        .refresh_budget(&h.agent.agent_id, Micros(0), "admin", "nothing")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let receipt = reconciler
        .refresh_budget(&h.agent.agent_id, Micros(5_000_000), "admin", "monthly top-up")
        .await
        .unwrap();
    assert_eq!(receipt.total_allocated, Micros(15_000_000));
    assert_eq!(receipt.budget_remaining, Micros(15_000_000));

    let grant = h.handshake(Some(4_000_000)).await.unwrap();
    h.report(&grant.lease_id, 1_000_000).await.unwrap();
    let zeroed = reconciler
        .zero_budget(&h.agent.agent_id, "admin", "suspended")
        .await
        .unwrap();
    assert_eq!(zeroed.budget_remaining, Micros::ZERO);
    assert_eq!(zeroed.total_allocated, Micros(1_000_000));
    assert_eq!(zeroed.total_spent, Micros(1_000_000));

    let err = reconciler
        .return_lease(&grant.lease_id, Micros(1_000_000))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "LEASE_CLOSED");
    let status = h.status().await;
    assert_eq!(status.budget.budget_remaining, Micros::ZERO);
    assert_eq!(status.open_leases, 0);

    let history = h.control.agents().history(&h.agent.agent_id, 10).await.unwrap();
    assert_eq!(history.len(), 3);

    let err = reconciler
        .refresh_budget(&AgentId::new(), Micros(1), "admin", "x")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "AGENT_NOT_FOUND");
}

#[tokio::test]
async fn test_budget_request_workflow() {
    let h = Harness::new(10_000_000).await;
    let workflow = h.control.requests();

    let short = workflow
        .create(BudgetRequestInput {
            agent_id: h.agent.agent_id.clone(),
            requester_id: "user_alice".to_string(),
            amount: Micros(5_000_000),
            justification: "too short".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(short.kind(), ErrorKind::Validation);

    let request = workflow
        .create(BudgetRequestInput {
            agent_id: h.agent.agent_id.clone(),
            requester_id: "user_alice".to_string(),
            amount: Micros(5_000_000),
            justification: "   Evaluation suite needs another five units   ".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(request.justification, "Evaluation suite needs another five units");
    assert_eq!(request.requested_budget, Micros(15_000_000));

    let approved = workflow.approve(&request.request_id, "admin_bob").await.unwrap();
    assert_eq!(approved.budget.total_allocated, Micros(15_000_000));
    assert_eq!(approved.request.status, RequestStatus::Approved);

    let conflict = workflow
        .reject(&request.request_id, "admin_bob", Some("late"))
        .await
        .unwrap_err();
    assert_eq!(conflict.kind(), ErrorKind::Conflict);

    let pending = workflow
        .list(&RequestFilter {
            status: Some(RequestStatus::Pending),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(pending.is_empty());

    let history = h.control.agents().history(&h.agent.agent_id, 10).await.unwrap();
    assert_eq!(history[0].related_request_id, Some(request.request_id.clone()));
}

#[tokio::test]
async fn test_issue_token_for_existing_agent() {
    let h = Harness::new(1_000_000).await;
    let token = h
        .control
        .agents()
        .issue_token(&h.agent.agent_id, None)
        .await
        .unwrap();
    let identity = h.control.verifier().verify(&token).unwrap();
    assert_eq!(identity.agent_id, h.agent.agent_id);
    assert_eq!(identity.budget_id, h.agent.budget_id);

    let err = h
        .control
        .agents()
        .issue_token(&AgentId::new(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
