//! Credential envelopes
//!
//! A wrapped credential is `"v1:" + base64url(nonce || ciphertext || tag)`.
//! The version prefix is bound into the AEAD associated data, so a payload
//! cannot be replayed under a different version tag.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::aead;
use crate::hash::sha256_hex;
use crate::keys::{RootKey, KEY_LEN};
use crate::secret::SecretString;
use crate::{CryptoError, CryptoResult};

pub const ENVELOPE_VERSION: &str = "v1";

const ENVELOPE_KEY_LABEL: &str = "leasegate/credential-envelope/v1";
const ENVELOPE_AAD: &[u8] = b"leasegate-envelope:v1";

/// An encrypted provider credential, safe to hand to an agent
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WrappedCredential(String);

impl WrappedCredential {
    /// Accept an envelope string from the wire. Only the shape is checked
    /// here; authenticity is checked on unwrap.
    pub fn parse(raw: &str) -> CryptoResult<Self> {
        let (version, payload) = raw
            .split_once(':')
            .ok_or_else(|| CryptoError::MalformedEnvelope("missing version tag".to_string()))?;
        if version != ENVELOPE_VERSION {
            return Err(CryptoError::UnsupportedVersion(version.to_string()));
        }
        if payload.is_empty() {
            return Err(CryptoError::MalformedEnvelope("empty payload".to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// SHA-256 of the envelope text, recorded against the lease for audit
    pub fn digest(&self) -> String {
        sha256_hex(self.0.as_bytes())
    }
}

impl fmt::Debug for WrappedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrappedCredential({} bytes)", self.0.len())
    }
}

/// Wraps and unwraps provider credentials for lease hand-off
#[derive(Clone)]
pub struct CredentialEncryptor {
    key: zeroize::Zeroizing<[u8; KEY_LEN]>,
}

impl CredentialEncryptor {
    pub fn new(root: &RootKey) -> CryptoResult<Self> {
        Ok(Self {
            key: zeroize::Zeroizing::new(root.derive(ENVELOPE_KEY_LABEL)?),
        })
    }

    /// Encrypt a credential under a fresh random nonce
    pub fn wrap(&self, credential: &SecretString) -> CryptoResult<WrappedCredential> {
        let sealed = aead::seal(&self.key, ENVELOPE_AAD, credential.expose_secret().as_bytes())?;
        Ok(WrappedCredential(format!(
            "{}:{}",
            ENVELOPE_VERSION,
            URL_SAFE_NO_PAD.encode(sealed)
        )))
    }

    /// Decrypt an envelope. Fails with [`CryptoError::DecryptionFailed`] on
    /// any tampering or key mismatch.
    pub fn unwrap(&self, envelope: &WrappedCredential) -> CryptoResult<SecretString> {
        let (version, payload) = envelope
            .0
            .split_once(':')
            .ok_or_else(|| CryptoError::MalformedEnvelope("missing version tag".to_string()))?;
        if version != ENVELOPE_VERSION {
            return Err(CryptoError::UnsupportedVersion(version.to_string()));
        }
        let sealed = URL_SAFE_NO_PAD
            .decode(payload.as_bytes())
            .map_err(|e| CryptoError::MalformedEnvelope(format!("invalid base64: {}", e)))?;

        let plaintext = aead::open(&self.key, ENVELOPE_AAD, &sealed).map_err(|err| {
            if matches!(err, CryptoError::DecryptionFailed) {
                tracing::error!(
                    security_event = true,
                    envelope_digest = %envelope.digest(),
                    "Credential envelope failed authentication"
                );
            }
            err
        })?;

        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| CryptoError::MalformedEnvelope("credential is not UTF-8".to_string()))?;
        Ok(SecretString::new(text))
    }
}

impl fmt::Debug for CredentialEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialEncryptor([REDACTED])")
    }
}
