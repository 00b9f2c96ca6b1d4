//! Agent identity verification
//!
//! Identity claims are HS256 JWTs. A claim is accepted only if the signature,
//! the issuer and the mandatory `exp` all verify and the embedded ids are
//! well formed.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use leasegate_types::{AgentId, BudgetId};
use tracing::{debug, warn};

use crate::claims::{IdentityClaims, VerifiedIdentity};
use crate::config::IdentityConfig;
use crate::error::{AuthError, AuthResult};

/// Verifies (and, for trusted callers, issues) agent identity claims
#[derive(Clone)]
pub struct IdentityVerifier {
    config: IdentityConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl IdentityVerifier {
    pub fn new(config: IdentityConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    /// Verify a presented identity token
    pub fn verify(&self, token: &str) -> AuthResult<VerifiedIdentity> {
        if self.config.secret.is_empty() {
            return Err(AuthError::Internal("identity secret is not configured".to_string()));
        }
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        if token.len() > self.config.max_token_len {
            return Err(AuthError::TokenTooLong {
                max: self.config.max_token_len,
            });
        }

        let claims = self.decode_claims(token).map_err(|err| {
            debug!(error = %err, "Identity token rejected");
            err
        })?;

        let agent_id = AgentId::parse(&claims.agent_id)
            .map_err(|e| AuthError::InvalidClaim(format!("agent_id: {}", e)))?;
        let budget_id = BudgetId::parse(&claims.budget_id)
            .map_err(|e| AuthError::InvalidClaim(format!("budget_id: {}", e)))?;

        let leeway = self.config.leeway.as_secs() as i64;
        let now = Utc::now().timestamp();
        if claims.iat > now + leeway {
            return Err(AuthError::InvalidClaim("issued in the future".to_string()));
        }
        if claims.exp <= claims.iat {
            return Err(AuthError::InvalidClaim("expires before it was issued".to_string()));
        }

        Ok(VerifiedIdentity {
            agent_id,
            budget_id,
            permissions: claims.permissions,
            issued_at: timestamp(claims.iat)?,
            expires_at: timestamp(claims.exp)?,
        })
    }

    /// Verify a token and require one permission
    pub fn verify_with_permission(&self, token: &str, permission: &str) -> AuthResult<VerifiedIdentity> {
        let identity = self.verify(token)?;
        if !identity.has_permission(permission) {
            warn!(
                agent_id = %identity.agent_id,
                permission = permission,
                "Identity lacks required permission"
            );
            return Err(AuthError::MissingPermission(permission.to_string()));
        }
        Ok(identity)
    }

    /// Issue a claim for an agent. Trusted callers only.
    pub fn issue(
        &self,
        agent_id: &AgentId,
        budget_id: &BudgetId,
        permissions: &[&str],
        lifetime: Option<std::time::Duration>,
    ) -> AuthResult<String> {
        if self.config.secret.is_empty() {
            return Err(AuthError::Internal("identity secret is not configured".to_string()));
        }
        let lifetime = lifetime.unwrap_or(self.config.token_lifetime);
        let now = Utc::now();
        let exp = now
            + Duration::from_std(lifetime).map_err(|e| AuthError::Internal(e.to_string()))?;

        let claims = IdentityClaims {
            agent_id: agent_id.to_string(),
            budget_id: budget_id.to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to encode identity token: {}", e)))
    }

    fn decode_claims(&self, token: &str) -> AuthResult<IdentityClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = self.config.leeway.as_secs();

        let token_data = decode::<IdentityClaims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }
}

impl std::fmt::Debug for IdentityVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityVerifier")
            .field("issuer", &self.config.issuer)
            .finish_non_exhaustive()
    }
}

fn timestamp(secs: i64) -> AuthResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| AuthError::InvalidClaim(format!("timestamp {} out of range", secs)))
}
