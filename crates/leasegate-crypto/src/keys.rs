//! Root key handling and key derivation
//!
//! A single 32-byte root key is configured per deployment. Working keys are
//! derived from it with HMAC-SHA256 over a purpose label, so the envelope key
//! and the vault key never coincide and the root key itself is never used
//! to encrypt anything.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, CryptoResult};

type HmacSha256 = Hmac<Sha256>;

pub const KEY_LEN: usize = 32;

/// Deployment root secret
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RootKey([u8; KEY_LEN]);

impl RootKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random root key
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse 64 hex characters or standard base64 of exactly 32 bytes
    pub fn parse(encoded: &str) -> CryptoResult<Self> {
        let encoded = encoded.trim();
        let decoded = if encoded.len() == KEY_LEN * 2 && encoded.chars().all(|c| c.is_ascii_hexdigit()) {
            hex::decode(encoded).map_err(|e| CryptoError::InvalidKey(e.to_string()))?
        } else {
            STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| CryptoError::InvalidKey(format!("not hex or base64: {}", e)))?
        };

        let bytes: [u8; KEY_LEN] = decoded.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("expected {} bytes, got {}", KEY_LEN, decoded.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Hex encoding, for provisioning tooling
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Derive a working key bound to `label`
    pub(crate) fn derive(&self, label: &str) -> CryptoResult<[u8; KEY_LEN]> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.0)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        mac.update(label.as_bytes());
        Ok(mac.finalize().into_bytes().into())
    }
}

impl fmt::Debug for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RootKey([REDACTED])")
    }
}
