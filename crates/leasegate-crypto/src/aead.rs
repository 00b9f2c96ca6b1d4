//! ChaCha20-Poly1305 sealing shared by envelopes and the vault.
//!
//! Sealed layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::{CryptoError, CryptoResult};

pub(crate) const NONCE_LEN: usize = 12;
pub(crate) const TAG_LEN: usize = 16;

pub(crate) fn seal(key: &[u8; 32], aad: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

pub(crate) fn open(key: &[u8; 32], aad: &[u8], sealed: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::MalformedEnvelope(format!(
            "payload too short ({} bytes)",
            sealed.len()
        )));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_is_fresh() {
        let key = [7u8; 32];
        let a = seal(&key, b"aad", b"same").unwrap();
        let b = seal(&key, b"aad", b"same").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_aad_is_bound() {
        let key = [7u8; 32];
        let sealed = seal(&key, b"one", b"secret").unwrap();
        assert!(matches!(open(&key, b"two", &sealed), Err(CryptoError::DecryptionFailed)));
        assert_eq!(open(&key, b"one", &sealed).unwrap().as_slice(), b"secret");
    }

    #[test]
    fn test_short_payload() {
        assert!(matches!(
            open(&[0u8; 32], b"", &[0u8; 10]),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }
}
