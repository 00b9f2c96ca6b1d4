//! Handshake, usage and return DTOs

use chrono::{DateTime, Utc};
use leasegate_core::{LeaseGrant, LeaseRefresh, ReturnReceipt, UsageReceipt};
use leasegate_types::LeaseStatus;
use serde::{Deserialize, Serialize};
use validator::Validate;

// =============================================================================
// Handshake
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HandshakeBody {
    /// Identity claim issued to the agent
    #[validate(length(min = 1, max = 2000, message = "must be 1-2000 characters"))]
    pub ic_token: String,
    #[validate(length(min = 1, max = 50, message = "must be 1-50 characters"))]
    pub provider: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub provider_key_id: Option<String>,
    /// Amount to reserve; the server default when absent
    #[serde(default)]
    #[validate(range(min = 1, max = 100000000, message = "must be between 1 and 100000000"))]
    pub requested_budget: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeResponse {
    /// Wrapped provider credential
    pub ip_token: String,
    pub lease_id: String,
    pub provider: String,
    pub provider_key_id: String,
    pub budget_granted: i64,
    pub budget_remaining: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<LeaseGrant> for HandshakeResponse {
    fn from(grant: LeaseGrant) -> Self {
        Self {
            ip_token: grant.wrapped_credential.as_str().to_string(),
            lease_id: grant.lease_id.into_string(),
            provider: grant.provider.to_string(),
            provider_key_id: grant.provider_key_id.into_string(),
            budget_granted: grant.granted.value(),
            budget_remaining: grant.budget_remaining.value(),
            expires_at: grant.expires_at,
        }
    }
}

// =============================================================================
// Lease rollover
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LeaseRefreshBody {
    /// Identity claim of the agent holding the lease
    #[validate(length(min = 1, max = 2000, message = "must be 1-2000 characters"))]
    pub ic_token: String,
    /// Amount to reserve on the new lease; the server default when absent
    #[serde(default)]
    #[validate(range(min = 1, max = 100000000, message = "must be between 1 and 100000000"))]
    pub requested_budget: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRefreshResponse {
    pub previous_lease_id: String,
    /// Unspent part of the previous lease credited back
    pub returned: i64,
    #[serde(flatten)]
    pub grant: HandshakeResponse,
}

impl From<LeaseRefresh> for LeaseRefreshResponse {
    fn from(refresh: LeaseRefresh) -> Self {
        Self {
            previous_lease_id: refresh.previous_lease_id.into_string(),
            returned: refresh.returned.value(),
            grant: refresh.grant.into(),
        }
    }
}

// =============================================================================
// Usage
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UsageReportBody {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub lease_id: String,
    /// Caller's own correlation id, logged only
    #[serde(default)]
    #[validate(length(max = 100, message = "must be at most 100 characters"))]
    pub request_id: Option<String>,
    #[validate(range(min = 0, message = "must be non-negative"))]
    pub tokens: i64,
    #[validate(range(min = 0, message = "must be non-negative"))]
    pub cost_microdollars: i64,
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub model: String,
    #[validate(length(min = 1, max = 50, message = "must be 1-50 characters"))]
    pub provider: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReportResponse {
    pub success: bool,
    pub lease_id: String,
    pub charged: i64,
    /// Reported cost that could not be billed
    pub unbilled: i64,
    pub lease_remaining: i64,
    pub budget_remaining: i64,
}

impl From<UsageReceipt> for UsageReportResponse {
    fn from(receipt: UsageReceipt) -> Self {
        Self {
            success: true,
            lease_id: receipt.lease_id.into_string(),
            charged: receipt.charged.value(),
            unbilled: receipt.unbilled.value(),
            lease_remaining: receipt.lease_remaining.value(),
            budget_remaining: receipt.budget_remaining.value(),
        }
    }
}

// =============================================================================
// Return / revoke
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BudgetReturnBody {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub lease_id: String,
    #[serde(default)]
    #[validate(range(min = 0, message = "must be non-negative"))]
    pub spent_microdollars: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetReturnResponse {
    pub success: bool,
    pub lease_id: String,
    pub status: LeaseStatus,
    pub spent: i64,
    pub returned: i64,
    pub budget_remaining: i64,
}

impl From<ReturnReceipt> for BudgetReturnResponse {
    fn from(receipt: ReturnReceipt) -> Self {
        Self {
            success: true,
            lease_id: receipt.lease_id.into_string(),
            status: receipt.status,
            spent: receipt.spent.value(),
            returned: receipt.returned.value(),
            budget_remaining: receipt.budget_remaining.value(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RevokeBody {
    #[serde(default)]
    #[validate(length(max = 100, message = "must be at most 100 characters"))]
    pub operator_id: Option<String>,
}

// =============================================================================
// Refresh
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BudgetRefreshBody {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub agent_id: String,
    #[validate(range(min = 1, message = "must be positive"))]
    pub additional_budget: i64,
    #[serde(default)]
    #[validate(length(max = 100, message = "must be at most 100 characters"))]
    pub modifier_id: Option<String>,
    #[serde(default)]
    #[validate(length(max = 500, message = "must be at most 500 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetRefreshResponse {
    pub agent_id: String,
    pub total_allocated: i64,
    pub budget_remaining: i64,
}

/// Operator id recorded when the body names none
pub(crate) fn operator_or_default(id: Option<&str>) -> &str {
    id.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("admin")
}
