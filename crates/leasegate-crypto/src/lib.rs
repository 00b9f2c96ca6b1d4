//! LeaseGate Crypto - Credential protection for the budget control protocol
//!
//! This crate provides:
//! - Root key handling and purpose-bound key derivation (HMAC-SHA256)
//! - Credential envelopes: provider credentials wrapped with ChaCha20-Poly1305
//!   for hand-off to an agent inside a lease
//! - The provider key vault: the same AEAD with a separate key, used to keep
//!   provider credentials sealed at rest
//! - Secret strings that are zeroized on drop and never printed
//!
//! # Security Invariant
//!
//! **A plaintext provider credential never outlives the call that needs it,
//! and a tampered envelope never decrypts.**

mod aead;
pub mod envelope;
pub mod hash;
pub mod keys;
pub mod secret;
pub mod vault;

pub use envelope::{CredentialEncryptor, WrappedCredential, ENVELOPE_VERSION};
pub use hash::*;
pub use keys::RootKey;
pub use secret::SecretString;
pub use vault::CredentialVault;

use leasegate_types::ErrorKind;
use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Encryption failed")]
    EncryptionFailed,

    /// Authentication tag did not verify: wrong key or tampered data
    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Unsupported envelope version: {0}")]
    UnsupportedVersion(String),
}

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CryptoError::MalformedEnvelope(_) | CryptoError::UnsupportedVersion(_) => {
                ErrorKind::Validation
            }
            _ => ErrorKind::Crypto,
        }
    }
}

pub type CryptoResult<T> = Result<T, CryptoError>;
