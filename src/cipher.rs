//! Symmetric encryption of encoded records.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;

use crate::{
    crypt::{EncryptionKey, KEY_LEN},
    error::CipherError,
};

/// Nonce size for AES-GCM (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag appended by AES-GCM.
pub const TAG_LEN: usize = 16;

/// Trait for self-describing authenticated encryption.
///
/// `encrypt` must embed everything `decrypt` needs besides the key (the
/// per-call nonce in particular), so a ciphertext can be stored as one opaque
/// blob.
pub trait Cipher: Send + Sync {
    /// Key length in bytes this cipher accepts.
    fn key_len(&self) -> usize;

    fn encrypt(&self, key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Reverses [`encrypt`](Self::encrypt). Fails on truncated input, a key
    /// of the wrong length, or an authentication failure.
    fn decrypt(&self, key: &EncryptionKey, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// AES-256-GCM with a random nonce per call.
///
/// Blob layout: `[nonce: 12 bytes][ciphertext: N bytes][tag: 16 bytes]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aes256GcmCipher;

impl Aes256GcmCipher {
    fn aead(&self, key: &EncryptionKey) -> Result<Aes256Gcm, CipherError> {
        Aes256Gcm::new_from_slice(key.expose()).map_err(|_| CipherError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: key.expose().len(),
        })
    }
}

impl Cipher for Aes256GcmCipher {
    fn key_len(&self) -> usize {
        KEY_LEN
    }

    fn encrypt(&self, key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let aead = self.aead(key)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let sealed = aead
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| CipherError::Encryption)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&sealed);
        Ok(blob)
    }

    fn decrypt(&self, key: &EncryptionKey, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if ciphertext.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::Truncated {
                minimum: NONCE_LEN + TAG_LEN,
                actual: ciphertext.len(),
            });
        }
        let aead = self.aead(key)?;

        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);
        aead.decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| CipherError::Authentication)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> EncryptionKey {
        EncryptionKey::from_slice(&[byte; KEY_LEN]).unwrap()
    }

    #[test]
    fn round_trip() {
        let cipher = Aes256GcmCipher;
        let key = key(0x42);

        let encrypted = cipher.encrypt(&key, b"hello secret").unwrap();
        assert_eq!(encrypted.len(), NONCE_LEN + b"hello secret".len() + TAG_LEN);
        assert_eq!(cipher.decrypt(&key, &encrypted).unwrap(), b"hello secret");
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let cipher = Aes256GcmCipher;
        let encrypted = cipher.encrypt(&key(0x42), b"secret").unwrap();

        let err = cipher.decrypt(&key(0x43), &encrypted).unwrap_err();
        assert!(matches!(err, CipherError::Authentication));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let cipher = Aes256GcmCipher;
        let key = key(0x42);

        let mut encrypted = cipher.encrypt(&key, b"secret").unwrap();
        encrypted[NONCE_LEN] ^= 0x01;
        assert!(cipher.decrypt(&key, &encrypted).is_err());
    }

    #[test]
    fn truncated_ciphertext_fails() {
        let cipher = Aes256GcmCipher;

        let err = cipher.decrypt(&key(0x42), &[0u8; 20]).unwrap_err();
        assert!(matches!(
            err,
            CipherError::Truncated {
                minimum: 28,
                actual: 20
            }
        ));
    }

    #[test]
    fn fresh_nonce_per_call() {
        let cipher = Aes256GcmCipher;
        let key = key(0x42);

        let first = cipher.encrypt(&key, b"same input").unwrap();
        let second = cipher.encrypt(&key, b"same input").unwrap();
        assert_ne!(first[..NONCE_LEN], second[..NONCE_LEN]);
        assert_ne!(first, second);
    }

    #[test]
    fn empty_plaintext_round_trip() {
        let cipher = Aes256GcmCipher;
        let key = key(0x42);

        let encrypted = cipher.encrypt(&key, b"").unwrap();
        assert_eq!(encrypted.len(), NONCE_LEN + TAG_LEN);
        assert!(cipher.decrypt(&key, &encrypted).unwrap().is_empty());
    }

    #[test]
    fn large_plaintext_round_trip() {
        let cipher = Aes256GcmCipher;
        let key = key(0x42);
        let plaintext = vec![0xAB; 1 << 20];

        let encrypted = cipher.encrypt(&key, &plaintext).unwrap();
        assert_eq!(cipher.decrypt(&key, &encrypted).unwrap(), plaintext);
    }
}
