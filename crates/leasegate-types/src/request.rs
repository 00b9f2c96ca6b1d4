//! Budget increase requests
//!
//! ```text
//! Pending ──approve──▶ Approved
//!    │ ────reject───▶ Rejected
//!    └─────cancel───▶ Cancelled
//! ```
//!
//! Only `Pending` has outgoing transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TypeError;
use crate::identity::{AgentId, RequestId};
use crate::money::Micros;

pub const MIN_JUSTIFICATION_LEN: usize = 20;
pub const MAX_JUSTIFICATION_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    /// Validate a transition to `target`
    pub fn transition(self, target: RequestStatus) -> Result<RequestStatus, TypeError> {
        match (self, target) {
            (RequestStatus::Pending, RequestStatus::Approved)
            | (RequestStatus::Pending, RequestStatus::Rejected)
            | (RequestStatus::Pending, RequestStatus::Cancelled) => Ok(target),
            (from, to) => Err(TypeError::InvalidTransition {
                from: from.as_str(),
                to: to.as_str(),
            }),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            "cancelled" => Ok(RequestStatus::Cancelled),
            other => Err(TypeError::UnknownVariant {
                kind: "request status",
                value: other.to_string(),
            }),
        }
    }
}

/// A request to raise an agent's allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRequest {
    pub request_id: RequestId,
    pub agent_id: AgentId,
    pub requester_id: String,
    /// Allocation when the request was filed
    pub current_budget: Micros,
    /// Allocation the requester asks for
    pub requested_budget: Micros,
    pub justification: String,
    pub status: RequestStatus,
    pub decided_by: Option<String>,
    pub decision_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BudgetRequest {
    /// Amount the allocation grows by on approval
    pub fn increase(&self) -> Micros {
        self.requested_budget - self.current_budget
    }
}

/// Trim a justification and check its length bounds (counted in characters)
pub fn normalize_justification(raw: &str) -> Result<String, TypeError> {
    let trimmed = raw.trim();
    let len = trimmed.chars().count();
    if !(MIN_JUSTIFICATION_LEN..=MAX_JUSTIFICATION_LEN).contains(&len) {
        return Err(TypeError::InvalidField {
            field: "justification",
            reason: format!(
                "must be {}-{} characters, got {}",
                MIN_JUSTIFICATION_LEN, MAX_JUSTIFICATION_LEN, len
            ),
        });
    }
    Ok(trimmed.to_string())
}
