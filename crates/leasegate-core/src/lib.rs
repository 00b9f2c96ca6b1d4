//! LeaseGate Protocol Core
//!
//! The budget control protocol between LLM-calling agents and the control
//! plane:
//!
//! 1. **Handshake** ([`LeaseManager`]): an agent presents a signed identity
//!    claim and receives an encrypted provider credential together with a
//!    budget lease reserved from its allocation.
//! 2. **Usage reporting** ([`UsageReconciler`]): the agent reports the cost
//!    of each call; spend is charged against the lease, overage against the
//!    remaining budget.
//! 3. **Return** ([`UsageReconciler::return_lease`]): unspent budget is
//!    credited back exactly once. [`LeaseManager::refresh_lease`] returns and
//!    re-reserves in one step.
//! 4. **Budget requests** ([`RequestWorkflow`]): agents ask for more budget,
//!    operators approve or reject.
//!
//! All money is integer micro-units. All state lives in the ledger; services
//! here are stateless apart from their configuration.

pub mod agents;
pub mod clock;
pub mod config;
pub mod error;
pub mod keys;
pub mod lease_manager;
pub mod reconciler;
pub mod workflow;

use std::sync::Arc;

use leasegate_auth::IdentityVerifier;
use leasegate_crypto::{CredentialEncryptor, CredentialVault};
use leasegate_ledger::{Ledger, LedgerResult};

pub use agents::{AgentRegistration, AgentService, BudgetStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LeasePolicy, DEFAULT_HANDSHAKE_AMOUNT, MAX_HANDSHAKE_AMOUNT};
pub use error::{ControlError, ControlResult};
pub use keys::ProviderKeyService;
pub use lease_manager::{
    HandshakeRequest, LeaseGrant, LeaseManager, LeaseRefresh, LeaseRefreshRequest,
};
pub use reconciler::{
    RefreshReceipt, ReturnReceipt, SweepReport, UsageInput, UsageReceipt, UsageReconciler,
    MAX_MODEL_LEN,
};
pub use workflow::{BudgetRequestInput, RequestWorkflow};

/// Everything the protocol services share
#[derive(Debug)]
pub(crate) struct ControlContext {
    pub ledger: Ledger,
    pub verifier: IdentityVerifier,
    pub encryptor: CredentialEncryptor,
    pub vault: CredentialVault,
    pub policy: LeasePolicy,
    pub clock: Arc<dyn Clock>,
}

/// Entry point to the budget control protocol
#[derive(Debug, Clone)]
pub struct BudgetControl {
    ctx: Arc<ControlContext>,
}

impl BudgetControl {
    pub fn new(
        ledger: Ledger,
        verifier: IdentityVerifier,
        encryptor: CredentialEncryptor,
        vault: CredentialVault,
        policy: LeasePolicy,
    ) -> Self {
        Self::with_clock(ledger, verifier, encryptor, vault, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        ledger: Ledger,
        verifier: IdentityVerifier,
        encryptor: CredentialEncryptor,
        vault: CredentialVault,
        policy: LeasePolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ctx: Arc::new(ControlContext {
                ledger,
                verifier,
                encryptor,
                vault,
                policy,
                clock,
            }),
        }
    }

    pub fn leases(&self) -> LeaseManager {
        LeaseManager::new(self.ctx.clone())
    }

    pub fn reconciler(&self) -> UsageReconciler {
        UsageReconciler::new(self.ctx.clone())
    }

    pub fn requests(&self) -> RequestWorkflow {
        RequestWorkflow::new(self.ctx.clone())
    }

    pub fn agents(&self) -> AgentService {
        AgentService::new(self.ctx.clone())
    }

    pub fn provider_keys(&self) -> ProviderKeyService {
        ProviderKeyService::new(self.ctx.clone())
    }

    pub fn verifier(&self) -> &IdentityVerifier {
        &self.ctx.verifier
    }

    pub fn encryptor(&self) -> &CredentialEncryptor {
        &self.ctx.encryptor
    }

    pub fn policy(&self) -> &LeasePolicy {
        &self.ctx.policy
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ctx.ledger
    }

    pub async fn health_check(&self) -> LedgerResult<()> {
        self.ctx.ledger.health_check().await
    }
}
