//! Agent budgets and their modification history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TypeError;
use crate::identity::{AgentId, BudgetId, HistoryId, RequestId};
use crate::money::Micros;

/// Spending record of one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentBudget {
    pub agent_id: AgentId,
    pub budget_id: BudgetId,
    pub total_allocated: Micros,
    pub total_spent: Micros,
    pub budget_remaining: Micros,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentBudget {
    /// Check `total_allocated == total_spent + budget_remaining` and
    /// `budget_remaining >= 0`
    pub fn check_invariant(&self) -> Result<(), TypeError> {
        let sum = self.total_spent.checked_add(self.budget_remaining)?;
        if sum != self.total_allocated {
            return Err(TypeError::BudgetInvariant(format!(
                "allocated {} != spent {} + remaining {}",
                self.total_allocated.0, self.total_spent.0, self.budget_remaining.0
            )));
        }
        if self.budget_remaining.is_negative() {
            return Err(TypeError::BudgetInvariant(format!(
                "remaining {} is negative",
                self.budget_remaining.0
            )));
        }
        Ok(())
    }
}

/// Direction of an allocation change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Increase,
    Decrease,
    Reset,
}

impl HistoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryKind::Increase => "increase",
            HistoryKind::Decrease => "decrease",
            HistoryKind::Reset => "reset",
        }
    }

    /// Classify a change from `old` to `new` allocation
    pub fn classify(old: Micros, new: Micros) -> Self {
        if new.is_zero() || new == old {
            HistoryKind::Reset
        } else if new > old {
            HistoryKind::Increase
        } else {
            HistoryKind::Decrease
        }
    }
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "increase" => Ok(HistoryKind::Increase),
            "decrease" => Ok(HistoryKind::Decrease),
            "reset" => Ok(HistoryKind::Reset),
            other => Err(TypeError::UnknownVariant {
                kind: "history kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Immutable record of one allocation change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetHistoryEntry {
    pub id: HistoryId,
    pub agent_id: AgentId,
    pub kind: HistoryKind,
    pub old_allocated: Micros,
    pub new_allocated: Micros,
    pub change: Micros,
    pub modifier_id: String,
    pub reason: String,
    pub related_request_id: Option<RequestId>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(allocated: i64, spent: i64, remaining: i64) -> AgentBudget {
        AgentBudget {
            agent_id: AgentId::new(),
            budget_id: BudgetId::new(),
            total_allocated: Micros(allocated),
            total_spent: Micros(spent),
            budget_remaining: Micros(remaining),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_invariant() {
        assert!(budget(100, 40, 60).check_invariant().is_ok());
        assert!(budget(100, 40, 50).check_invariant().is_err());
        assert!(budget(100, 110, -10).check_invariant().is_err());
    }

    #[test]
    fn test_classify() {
        assert_eq!(HistoryKind::classify(Micros(10), Micros(20)), HistoryKind::Increase);
        assert_eq!(HistoryKind::classify(Micros(20), Micros(10)), HistoryKind::Decrease);
        assert_eq!(HistoryKind::classify(Micros(20), Micros(0)), HistoryKind::Reset);
        assert_eq!("reset".parse::<HistoryKind>().unwrap(), HistoryKind::Reset);
    }
}
