//! Handshake: identity claim in, encrypted credential and budget lease out
//!
//! A holder may also roll an open lease over into a fresh one, which returns
//! the unspent reservation and reserves again under a new lease id.

use chrono::{DateTime, Utc};
use leasegate_auth::AuthError;
use leasegate_crypto::{SecretString, WrappedCredential};
use leasegate_ledger::{DbProviderKey, LedgerError, NewLease};
use leasegate_types::*;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ControlError, ControlResult};
use crate::ControlContext;

/// A handshake as presented by an agent
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    pub token: String,
    pub provider: Provider,
    /// Specific credential to lease; the first enabled key otherwise
    pub provider_key_id: Option<ProviderKeyId>,
    /// Amount to reserve; the policy default otherwise
    pub amount: Option<Micros>,
}

/// What a successful handshake hands back
#[derive(Debug, Clone, Serialize)]
pub struct LeaseGrant {
    pub lease_id: LeaseId,
    pub wrapped_credential: WrappedCredential,
    pub provider: Provider,
    pub provider_key_id: ProviderKeyId,
    pub granted: Micros,
    pub budget_remaining: Micros,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Roll an open lease over into a new one
#[derive(Debug, Clone)]
pub struct LeaseRefreshRequest {
    pub token: String,
    pub current_lease_id: LeaseId,
    /// Amount to reserve; the policy default otherwise
    pub amount: Option<Micros>,
}

/// Outcome of a rollover: the closed lease and its replacement
#[derive(Debug, Clone, Serialize)]
pub struct LeaseRefresh {
    pub previous_lease_id: LeaseId,
    /// Unspent part of the previous lease credited back
    pub returned: Micros,
    pub grant: LeaseGrant,
}

fn map_open_error(err: LedgerError) -> ControlError {
    match err {
        LedgerError::BudgetMismatch { .. } => ControlError::Auth(AuthError::InvalidClaim(
            "budget_id does not belong to agent".to_string(),
        )),
        other => ControlError::Ledger(other),
    }
}

/// Grants budget leases
pub struct LeaseManager {
    ctx: Arc<ControlContext>,
}

impl LeaseManager {
    pub(crate) fn new(ctx: Arc<ControlContext>) -> Self {
        Self { ctx }
    }

    /// Verify the claim, reserve budget and hand out the wrapped credential.
    ///
    /// Credential unsealing and wrapping happen before the ledger
    /// transaction; the envelope leaves this function only after the lease
    /// has been committed.
    pub async fn handshake(&self, request: HandshakeRequest) -> ControlResult<LeaseGrant> {
        let identity = self
            .ctx
            .verifier
            .verify_with_permission(&request.token, &self.ctx.policy.required_permission)?;
        let amount = self.ctx.policy.resolve_amount(request.amount)?;

        let key = self
            .select_key(request.provider, request.provider_key_id.as_ref())
            .await?;
        let key_id = ProviderKeyId::parse(&key.key_id)?;

        let wrapped = self.wrap_key(&key_id, &key)?;
        let now = self.ctx.clock.now();

        let new = NewLease {
            lease_id: LeaseId::new(),
            agent_id: identity.agent_id.clone(),
            budget_id: identity.budget_id.clone(),
            provider: request.provider,
            provider_key_id: key_id.clone(),
            amount,
            envelope_digest: wrapped.digest(),
            expires_at: self.expiry_from(now)?,
        };

        let opened = self
            .ctx
            .ledger
            .leases()
            .open(&new, now)
            .await
            .map_err(map_open_error)?;

        if let Err(err) = self.ctx.ledger.provider_keys().touch_last_used(&key_id, now).await {
            warn!(key_id = %key_id, error = %err, "Failed to record provider key use");
        }

        info!(
            agent_id = %identity.agent_id,
            lease_id = %opened.lease.lease_id,
            provider = %request.provider,
            granted = amount.value(),
            remaining = opened.budget_remaining.value(),
            "Handshake completed"
        );

        Ok(LeaseGrant {
            lease_id: opened.lease.lease_id,
            wrapped_credential: wrapped,
            provider: request.provider,
            provider_key_id: key_id,
            granted: opened.lease.granted,
            budget_remaining: opened.budget_remaining,
            expires_at: opened.lease.expires_at,
        })
    }

    /// Close an open lease and grant a new one in its place.
    ///
    /// Only the agent holding the lease may roll it over. The new credential
    /// envelope is built before the ledger transaction; if the new
    /// reservation cannot be made the old lease is left untouched.
    pub async fn refresh_lease(&self, request: LeaseRefreshRequest) -> ControlResult<LeaseRefresh> {
        let identity = self
            .ctx
            .verifier
            .verify_with_permission(&request.token, &self.ctx.policy.required_permission)?;
        let amount = self.ctx.policy.resolve_amount(request.amount)?;

        let current = self.ctx.ledger.leases().get(&request.current_lease_id).await?;
        if current.agent_id != identity.agent_id {
            warn!(
                agent_id = %identity.agent_id,
                lease_id = %current.lease_id,
                "Refresh refused, lease held by another agent"
            );
            return Err(LedgerError::Forbidden(format!(
                "lease {} belongs to another agent",
                current.lease_id
            ))
            .into());
        }

        let key = self
            .select_key(current.provider, Some(&current.provider_key_id))
            .await?;
        let wrapped = self.wrap_key(&current.provider_key_id, &key)?;
        let now = self.ctx.clock.now();

        let new = NewLease {
            lease_id: LeaseId::new(),
            agent_id: identity.agent_id.clone(),
            budget_id: identity.budget_id.clone(),
            provider: current.provider,
            provider_key_id: current.provider_key_id.clone(),
            amount,
            envelope_digest: wrapped.digest(),
            expires_at: self.expiry_from(now)?,
        };

        let rolled = self
            .ctx
            .ledger
            .leases()
            .rollover(&current.lease_id, &new, now)
            .await
            .map_err(map_open_error)?;

        let key_id = &current.provider_key_id;
        if let Err(err) = self.ctx.ledger.provider_keys().touch_last_used(key_id, now).await {
            warn!(key_id = %key_id, error = %err, "Failed to record provider key use");
        }

        info!(
            agent_id = %identity.agent_id,
            previous = %current.lease_id,
            lease_id = %rolled.opened.lease.lease_id,
            returned = rolled.closed.returned.value(),
            granted = amount.value(),
            "Lease refreshed"
        );

        let opened = rolled.opened;
        Ok(LeaseRefresh {
            previous_lease_id: current.lease_id,
            returned: rolled.closed.returned,
            grant: LeaseGrant {
                lease_id: opened.lease.lease_id,
                wrapped_credential: wrapped,
                provider: current.provider,
                provider_key_id: current.provider_key_id,
                granted: opened.lease.granted,
                budget_remaining: opened.budget_remaining,
                expires_at: opened.lease.expires_at,
            },
        })
    }

    fn wrap_key(&self, key_id: &ProviderKeyId, key: &DbProviderKey) -> ControlResult<WrappedCredential> {
        let secret: SecretString = self.ctx.vault.open(key_id, &key.sealed_secret)?;
        Ok(self.ctx.encryptor.wrap(&secret)?)
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> ControlResult<Option<DateTime<Utc>>> {
        match self.ctx.policy.lease_ttl {
            Some(ttl) => {
                let ttl = chrono::Duration::from_std(ttl)
                    .map_err(|e| ControlError::Validation(format!("lease ttl: {}", e)))?;
                Ok(Some(now + ttl))
            }
            None => Ok(None),
        }
    }

    async fn select_key(
        &self,
        provider: Provider,
        key_id: Option<&ProviderKeyId>,
    ) -> ControlResult<DbProviderKey> {
        let repo = self.ctx.ledger.provider_keys();
        let key = match key_id {
            Some(id) => repo
                .find(id)
                .await?
                .ok_or_else(|| ControlError::ProviderKeyNotFound(id.to_string()))?,
            None => repo
                .first_enabled(provider)
                .await?
                .ok_or_else(|| {
                    ControlError::ProviderKeyNotFound(format!("no enabled key for {}", provider))
                })?,
        };

        if key.provider != provider.as_str() {
            return Err(ControlError::Validation(format!(
                "provider key {} belongs to {}, not {}",
                key.key_id, key.provider, provider
            )));
        }
        if !key.is_enabled {
            return Err(ControlError::ProviderKeyDisabled(key.key_id));
        }
        Ok(key)
    }

    /// Lease by id
    pub async fn get(&self, lease_id: &LeaseId) -> ControlResult<BudgetLease> {
        Ok(self.ctx.ledger.leases().get(lease_id).await?)
    }

    /// Usage reports recorded against a lease
    pub async fn usage(&self, lease_id: &LeaseId) -> ControlResult<Vec<UsageEvent>> {
        let leases = self.ctx.ledger.leases();
        leases.get(lease_id).await?;
        Ok(leases.usage_events(lease_id).await?)
    }

    /// Spend reported against a lease that could not be charged
    pub async fn discrepancies(&self, lease_id: &LeaseId) -> ControlResult<Vec<UsageDiscrepancy>> {
        let leases = self.ctx.ledger.leases();
        leases.get(lease_id).await?;
        Ok(leases.discrepancies(lease_id).await?)
    }
}
