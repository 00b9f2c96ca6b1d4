//! Identity claim types

use chrono::{DateTime, Utc};
use leasegate_types::{AgentId, BudgetId};
use serde::{Deserialize, Serialize};

/// Permission required to open a budget lease
pub const PERMISSION_LLM_CALL: &str = "llm:call";

/// Raw JWT claims of an agent identity token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Agent identifier (`agent_` prefix)
    pub agent_id: String,
    /// Budget the agent draws on
    pub budget_id: String,
    /// Granted permissions, e.g. `llm:call`
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds), required
    pub exp: i64,
    /// Issuer
    pub iss: String,
}

/// Claims after verification, with typed ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub agent_id: AgentId,
    pub budget_id: BudgetId,
    pub permissions: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl VerifiedIdentity {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}
