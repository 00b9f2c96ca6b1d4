//! Lease policy configuration

use leasegate_auth::PERMISSION_LLM_CALL;
use leasegate_types::Micros;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ControlError, ControlResult};

/// Largest amount a single handshake may reserve (100 units)
pub const MAX_HANDSHAKE_AMOUNT: Micros = Micros::from_units(100);

/// Amount reserved when the agent does not ask for one (10 units)
pub const DEFAULT_HANDSHAKE_AMOUNT: Micros = Micros::from_units(10);

/// How leases are granted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeasePolicy {
    /// Reserved when a handshake names no amount
    pub default_amount: Micros,
    /// Upper bound for any single handshake
    pub max_amount: Micros,
    /// Lease lifetime; `None` grants leases that never expire
    #[serde(default, with = "humantime_serde")]
    pub lease_ttl: Option<Duration>,
    /// Permission an identity claim must carry to open a lease
    pub required_permission: String,
}

impl Default for LeasePolicy {
    fn default() -> Self {
        Self {
            default_amount: DEFAULT_HANDSHAKE_AMOUNT,
            max_amount: MAX_HANDSHAKE_AMOUNT,
            lease_ttl: Some(Duration::from_secs(60 * 60)),
            required_permission: PERMISSION_LLM_CALL.to_string(),
        }
    }
}

impl LeasePolicy {
    /// Amount to reserve for a handshake
    pub fn resolve_amount(&self, requested: Option<Micros>) -> ControlResult<Micros> {
        let amount = requested.unwrap_or(self.default_amount);
        if !amount.is_positive() {
            return Err(ControlError::Validation(
                "requested amount must be positive".to_string(),
            ));
        }
        if amount > self.max_amount {
            return Err(ControlError::Validation(format!(
                "requested amount {} exceeds the maximum of {}",
                amount.value(),
                self.max_amount.value()
            )));
        }
        Ok(amount)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.default_amount.is_positive() {
            return Err("leases.default_amount must be positive".to_string());
        }
        if self.default_amount > self.max_amount {
            return Err("leases.default_amount exceeds leases.max_amount".to_string());
        }
        if self.lease_ttl == Some(Duration::ZERO) {
            return Err("leases.lease_ttl must be non-zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_amount() {
        let policy = LeasePolicy::default();
        assert_eq!(policy.resolve_amount(None).unwrap(), Micros(10_000_000));
        assert_eq!(policy.resolve_amount(Some(Micros(5))).unwrap(), Micros(5));
        assert!(policy.resolve_amount(Some(Micros(0))).is_err());
        assert!(policy.resolve_amount(Some(Micros(-3))).is_err());
        assert!(policy.resolve_amount(Some(Micros(100_000_001))).is_err());
        assert!(policy.resolve_amount(Some(Micros(100_000_000))).is_ok());
    }

    #[test]
    fn test_default_policy_is_valid() {
        assert!(LeasePolicy::default().validate().is_ok());
    }
}
