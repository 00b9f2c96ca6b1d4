//! Budget leases
//!
//! A lease is a reservation carved out of an agent's remaining budget. It is
//! `Open` until it is returned, refreshed, revoked or reaches its expiry;
//! `Closed` is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TypeError;
use crate::identity::{AgentId, LeaseId, ProviderKeyId, UsageEventId};
use crate::money::Micros;
use crate::provider::Provider;

/// Why a lease was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The agent returned it
    Returned,
    /// It outlived its expiry and was reclaimed
    Expired,
    /// An operator revoked it
    Revoked,
    /// The agent rolled it over into a new lease
    Refreshed,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Returned => "returned",
            CloseReason::Expired => "expired",
            CloseReason::Revoked => "revoked",
            CloseReason::Refreshed => "refreshed",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloseReason {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "returned" => Ok(CloseReason::Returned),
            "expired" => Ok(CloseReason::Expired),
            "revoked" => Ok(CloseReason::Revoked),
            "refreshed" => Ok(CloseReason::Refreshed),
            other => Err(TypeError::UnknownVariant {
                kind: "close reason",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle state of a lease
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum LeaseStatus {
    Open,
    Closed(CloseReason),
}

impl LeaseStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, LeaseStatus::Open)
    }

    /// Storage columns `(status, close_reason)`
    pub fn to_columns(&self) -> (&'static str, Option<&'static str>) {
        match self {
            LeaseStatus::Open => ("open", None),
            LeaseStatus::Closed(reason) => ("closed", Some(reason.as_str())),
        }
    }

    /// Rebuild from storage columns. An open lease with a close reason, or a
    /// closed lease without one, is rejected.
    pub fn from_columns(status: &str, close_reason: Option<&str>) -> Result<Self, TypeError> {
        match (status, close_reason) {
            ("open", None) => Ok(LeaseStatus::Open),
            ("closed", Some(reason)) => Ok(LeaseStatus::Closed(reason.parse()?)),
            (status, reason) => Err(TypeError::UnknownVariant {
                kind: "lease status",
                value: format!("{}/{}", status, reason.unwrap_or("-")),
            }),
        }
    }
}

impl fmt::Display for LeaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseStatus::Open => f.write_str("open"),
            LeaseStatus::Closed(reason) => write!(f, "closed ({})", reason),
        }
    }
}

/// A reservation of budget for one agent and one provider credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLease {
    pub lease_id: LeaseId,
    pub agent_id: AgentId,
    pub provider: Provider,
    pub provider_key_id: ProviderKeyId,
    pub granted: Micros,
    pub spent: Micros,
    pub status: LeaseStatus,
    /// SHA-256 of the wrapped credential handed out with this lease
    pub envelope_digest: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl BudgetLease {
    /// Unspent part of the reservation
    pub fn remaining(&self) -> Micros {
        self.granted.saturating_sub_floor(self.spent)
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// True once `now` has reached the expiry timestamp
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// One accepted usage report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: UsageEventId,
    pub lease_id: LeaseId,
    pub agent_id: AgentId,
    pub provider: Provider,
    pub model: String,
    pub tokens: i64,
    /// Cost as reported by the agent
    pub reported_cost: Micros,
    /// Part of the reported cost actually charged
    pub charged: Micros,
    pub created_at: DateTime<Utc>,
}

/// Spend that was reported but could not be charged because no budget was
/// left to cover it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageDiscrepancy {
    pub lease_id: LeaseId,
    pub agent_id: AgentId,
    pub reported: Micros,
    pub unbilled: Micros,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
