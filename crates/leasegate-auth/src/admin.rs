//! Operator credential check
//!
//! Administrative operations (refresh, approve, revoke, key management) are
//! guarded by a static bearer token. Both sides are hashed before a
//! constant-time comparison, so neither the length nor the prefix of the
//! configured token leaks through timing.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::{AuthError, AuthResult};

#[derive(Clone)]
pub struct AdminGuard {
    token_digest: Option<[u8; 32]>,
}

impl AdminGuard {
    /// An empty token disables every administrative operation
    pub fn new(token: &str) -> Self {
        let token_digest = if token.is_empty() {
            None
        } else {
            Some(digest(token))
        };
        Self { token_digest }
    }

    pub fn is_enabled(&self) -> bool {
        self.token_digest.is_some()
    }

    /// Check a presented `Authorization` header value (`Bearer <token>`)
    pub fn check_header(&self, header: Option<&str>) -> AuthResult<()> {
        let presented = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::OperatorRequired)?;
        self.check(presented)
    }

    pub fn check(&self, presented: &str) -> AuthResult<()> {
        let expected = self.token_digest.ok_or(AuthError::InvalidOperatorCredential)?;
        if bool::from(digest(presented).ct_eq(&expected)) {
            Ok(())
        } else {
            warn!(security_event = true, "Rejected operator credential");
            Err(AuthError::InvalidOperatorCredential)
        }
    }
}

impl std::fmt::Debug for AdminGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminGuard")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

fn digest(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}
