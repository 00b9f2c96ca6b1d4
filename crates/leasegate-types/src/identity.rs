//! Identity types for LeaseGate
//!
//! Every identifier is a prefixed string (`agent_<uuid>`, `lease_<uuid>`, ...)
//! wrapped in its own type so ids of different kinds cannot be mixed up.
//! Ids minted locally always use a UUID suffix; ids parsed from the wire only
//! need the right prefix and a non-empty suffix of `[A-Za-z0-9_-]`.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::TypeError;

/// Longest identifier accepted from the wire
pub const MAX_ID_LEN: usize = 100;

macro_rules! define_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Prefix every id of this kind starts with (without the underscore)
            pub const PREFIX: &'static str = $prefix;

            /// Mint a new random id
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::new_v4()))
            }

            /// Parse an id, requiring the prefix
            pub fn parse(s: &str) -> Result<Self, TypeError> {
                validate_prefixed(s, concat!($prefix, "_"))?;
                Ok(Self(s.to_string()))
            }

            /// Borrow the id as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume into the inner string
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

fn validate_prefixed(s: &str, prefix: &str) -> Result<(), TypeError> {
    if s.len() > MAX_ID_LEN {
        return Err(TypeError::InvalidId {
            value: s.chars().take(16).collect(),
            reason: format!("longer than {} characters", MAX_ID_LEN),
        });
    }
    let suffix = s.strip_prefix(prefix).ok_or_else(|| TypeError::InvalidId {
        value: s.to_string(),
        reason: format!("expected prefix '{}'", prefix),
    })?;
    if suffix.is_empty() {
        return Err(TypeError::InvalidId {
            value: s.to_string(),
            reason: "empty id after prefix".to_string(),
        });
    }
    if !suffix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(TypeError::InvalidId {
            value: s.to_string(),
            reason: "unexpected characters".to_string(),
        });
    }
    Ok(())
}

define_id_type!(AgentId, "agent", "Unique identifier for an autonomous agent");
define_id_type!(BudgetId, "budget", "Identifier of the budget an agent's identity token is bound to");
define_id_type!(LeaseId, "lease", "Unique identifier for a budget lease");
define_id_type!(RequestId, "breq", "Unique identifier for a budget increase request");
define_id_type!(ProviderKeyId, "pkey", "Unique identifier for a stored provider credential");
define_id_type!(HistoryId, "bhist", "Unique identifier for a budget modification record");
define_id_type!(UsageEventId, "usage", "Unique identifier for a usage report");
