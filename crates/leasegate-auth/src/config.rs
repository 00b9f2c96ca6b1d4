//! Identity configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identity claim signing and validation settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// HMAC secret for signing claims (should be at least 256 bits)
    pub secret: String,
    /// Expected `iss` claim
    pub issuer: String,
    /// Clock skew tolerated when checking `exp` and `iat`
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,
    /// Lifetime of claims issued by this service
    #[serde(with = "humantime_serde")]
    pub token_lifetime: Duration,
    /// Longest token accepted before any parsing
    pub max_token_len: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            secret: String::new(), // Must be set in production
            issuer: "leasegate".to_string(),
            leeway: Duration::from_secs(30),
            token_lifetime: Duration::from_secs(24 * 60 * 60), // 1 day
            max_token_len: 2000,
        }
    }
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("leeway", &self.leeway)
            .field("token_lifetime", &self.token_lifetime)
            .field("max_token_len", &self.max_token_len)
            .finish()
    }
}

impl IdentityConfig {
    /// Minimum secret length accepted outside development mode
    pub const MIN_SECRET_LEN: usize = 32;

    pub fn has_strong_secret(&self) -> bool {
        self.secret.len() >= Self::MIN_SECRET_LEN
    }
}
