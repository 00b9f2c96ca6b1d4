//! Inference providers and stored provider credentials

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TypeError;
use crate::identity::ProviderKeyId;

/// Longest provider name accepted from the wire
pub const MAX_PROVIDER_LEN: usize = 50;

/// A pay-per-use inference provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::OpenAi, Provider::Anthropic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > MAX_PROVIDER_LEN {
            return Err(TypeError::UnknownProvider(s.chars().take(16).collect()));
        }
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            _ => Err(TypeError::UnknownProvider(s.to_string())),
        }
    }
}

/// Metadata of a stored provider credential. The secret itself never
/// leaves the ledger unsealed except inside a handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderKeyInfo {
    pub key_id: ProviderKeyId,
    pub provider: Provider,
    pub description: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_providers() {
        assert_eq!("openai".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!("Anthropic".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert!("mistral".parse::<Provider>().is_err());
        assert!("x".repeat(60).parse::<Provider>().is_err());
    }

    #[test]
    fn test_serde_names_match_wire() {
        for provider in Provider::ALL {
            let json = serde_json::to_string(&provider).unwrap();
            assert_eq!(json, format!("\"{}\"", provider.as_str()));
        }
    }
}
