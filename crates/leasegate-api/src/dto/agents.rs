//! Agent registration and status DTOs

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::default_limit;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RegisterAgentBody {
    #[serde(default)]
    #[validate(range(min = 0, message = "must be non-negative"))]
    pub initial_allocation: i64,
    #[serde(default)]
    #[validate(length(max = 100, message = "must be at most 100 characters"))]
    pub modifier_id: Option<String>,
    /// Identity claim lifetime in seconds; the server default when absent
    #[serde(default)]
    #[validate(range(min = 60, max = 31536000, message = "must be between 60 and 31536000"))]
    pub token_lifetime_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct IssueTokenBody {
    #[serde(default)]
    #[validate(range(min = 60, max = 31536000, message = "must be between 60 and 31536000"))]
    pub token_lifetime_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub agent_id: String,
    pub ic_token: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ZeroBudgetBody {
    #[serde(default)]
    #[validate(length(max = 100, message = "must be at most 100 characters"))]
    pub modifier_id: Option<String>,
    #[serde(default)]
    #[validate(length(max = 500, message = "must be at most 500 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LeaseListQuery {
    #[serde(default)]
    pub open_only: bool,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 500, message = "must be between 1 and 500"))]
    pub limit: u32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 500, message = "must be between 1 and 500"))]
    pub limit: u32,
}
