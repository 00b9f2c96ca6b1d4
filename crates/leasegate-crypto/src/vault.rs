//! Provider key vault
//!
//! Provider credentials are stored sealed. The seal is bound to the key id,
//! so a sealed value copied onto a different key row will not open.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use leasegate_types::ProviderKeyId;
use std::fmt;
use zeroize::Zeroizing;

use crate::aead;
use crate::keys::{RootKey, KEY_LEN};
use crate::secret::SecretString;
use crate::{CryptoError, CryptoResult};

const VAULT_KEY_LABEL: &str = "leasegate/provider-vault/v1";
const SEALED_PREFIX: &str = "sealed1";

/// Seals provider credentials for storage
#[derive(Clone)]
pub struct CredentialVault {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl CredentialVault {
    pub fn new(root: &RootKey) -> CryptoResult<Self> {
        Ok(Self {
            key: Zeroizing::new(root.derive(VAULT_KEY_LABEL)?),
        })
    }

    pub fn seal(&self, key_id: &ProviderKeyId, secret: &SecretString) -> CryptoResult<String> {
        if secret.is_empty() {
            return Err(CryptoError::InvalidKey("provider credential is empty".to_string()));
        }
        let sealed = aead::seal(&self.key, key_id.as_str().as_bytes(), secret.expose_secret().as_bytes())?;
        Ok(format!("{}:{}", SEALED_PREFIX, URL_SAFE_NO_PAD.encode(sealed)))
    }

    pub fn open(&self, key_id: &ProviderKeyId, sealed: &str) -> CryptoResult<SecretString> {
        let payload = sealed
            .strip_prefix(SEALED_PREFIX)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(|| CryptoError::MalformedEnvelope("missing vault prefix".to_string()))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.as_bytes())
            .map_err(|e| CryptoError::MalformedEnvelope(format!("invalid base64: {}", e)))?;

        let plaintext = aead::open(&self.key, key_id.as_str().as_bytes(), &bytes).map_err(|err| {
            tracing::error!(
                security_event = true,
                key_id = %key_id,
                "Stored provider credential failed to unseal"
            );
            err
        })?;

        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| CryptoError::MalformedEnvelope("credential is not UTF-8".to_string()))?;
        Ok(SecretString::new(text))
    }
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialVault([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::CredentialEncryptor;

    fn root() -> RootKey {
        RootKey::from_bytes([3u8; KEY_LEN])
    }

    #[test]
    fn test_seal_and_open() {
        let vault = CredentialVault::new(&root()).unwrap();
        let id = ProviderKeyId::new();
        let sealed = vault.seal(&id, &SecretString::new("sk-provider")).unwrap();
        assert!(sealed.starts_with("sealed1:"));
        assert_eq!(vault.open(&id, &sealed).unwrap().expose_secret(), "sk-provider");
    }

    #[test]
    fn test_bound_to_key_id() {
        let vault = CredentialVault::new(&root()).unwrap();
        let sealed = vault.seal(&ProviderKeyId::new(), &SecretString::new("sk")).unwrap();
        assert!(matches!(
            vault.open(&ProviderKeyId::new(), &sealed),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_vault_and_envelope_keys_differ() {
        let root = root();
        let vault = CredentialVault::new(&root).unwrap();
        let enc = CredentialEncryptor::new(&root).unwrap();
        let id = ProviderKeyId::new();
        let sealed = vault.seal(&id, &SecretString::new("sk")).unwrap();
        let payload = sealed.strip_prefix("sealed1:").unwrap();
        let as_envelope = crate::WrappedCredential::parse(&format!("v1:{}", payload)).unwrap();
        assert!(enc.unwrap(&as_envelope).is_err());
    }

    #[test]
    fn test_rejects_empty_secret() {
        let vault = CredentialVault::new(&root()).unwrap();
        assert!(vault.seal(&ProviderKeyId::new(), &SecretString::new("")).is_err());
    }
}
