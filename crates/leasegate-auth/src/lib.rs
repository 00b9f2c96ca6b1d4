//! LeaseGate Identity Layer
//!
//! Verifies the low-privilege identity claims agents present at handshake
//! time, and the operator credential that guards administrative operations.
//!
//! - **Identity claims**: HS256 JWTs carrying `agent_id`, `budget_id`,
//!   `permissions`, `iat`, a mandatory `exp`, and `iss`
//! - **Operator credential**: a static bearer token compared in constant time
//!
//! Verification is stateless and performs no I/O. Every failure is an
//! [`AuthError`]; nothing here fails open.

pub mod admin;
pub mod claims;
pub mod config;
pub mod error;
pub mod identity;

pub use admin::AdminGuard;
pub use claims::{IdentityClaims, VerifiedIdentity, PERMISSION_LLM_CALL};
pub use config::IdentityConfig;
pub use error::{AuthError, AuthResult};
pub use identity::IdentityVerifier;
