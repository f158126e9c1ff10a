//! Key material: per-secret encryption keys and the optional server master key.

use hkdf::Hkdf;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretSlice};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CipherError;

/// Length in bytes of every key handled by this crate (AES-256).
pub const KEY_LEN: usize = 32;

/// The random symmetric key generated for each secret.
///
/// It is never written to the backend: it travels only inside the locator
/// handed back to the creator. A value of this type always holds exactly
/// [`KEY_LEN`] bytes.
#[derive(Clone, Debug)]
pub struct EncryptionKey {
    key: SecretSlice<u8>,
}

impl EncryptionKey {
    /// Generates a fresh key from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut bytes);
        let key = Self {
            key: SecretSlice::new(bytes.to_vec().into()),
        };
        bytes.zeroize();
        key
    }

    /// Wraps existing key bytes, rejecting anything that is not [`KEY_LEN`] long.
    pub fn from_slice(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            });
        }
        Ok(Self {
            key: SecretSlice::new(key.to_vec().into()),
        })
    }

    pub fn expose(&self) -> &[u8] {
        self.key.expose_secret()
    }

    /// Lowercase hex rendering, as embedded in locators.
    pub fn to_hex(&self) -> String {
        hex::encode(self.expose())
    }
}

impl PartialEq for EncryptionKey {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq::constant_time_eq(self.expose(), other.expose())
    }
}

impl Eq for EncryptionKey {}

/// A server-side key mixed into every secret's content key.
///
/// With a master key configured, the ciphertext stored for a secret can only
/// be opened by someone holding both the locator key and this key.
pub struct MasterKey {
    key: SecretSlice<u8>,
}

impl MasterKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut bytes);
        let key = Self {
            key: SecretSlice::new(bytes.to_vec().into()),
        };
        bytes.zeroize();
        key
    }

    pub fn from_slice(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            });
        }
        Ok(Self {
            key: SecretSlice::new(key.to_vec().into()),
        })
    }

    /// Derives the content key for one secret via HKDF-SHA256.
    ///
    /// The locator key is the HKDF salt and `context` (the secret id) the
    /// info string, so two secrets never share a content key even if their
    /// locator keys collide.
    pub fn derive(
        &self,
        locator_key: &EncryptionKey,
        context: &[u8],
    ) -> Result<EncryptionKey, CipherError> {
        let mut key = [0u8; KEY_LEN];
        let hkdf = Hkdf::<sha2::Sha256>::new(Some(locator_key.expose()), self.key.expose_secret());
        hkdf.expand(context, &mut key)
            .map_err(|_| CipherError::KeyDerivation)?;

        let derived = EncryptionKey::from_slice(&key);

        // Zeroize the intermediate key material
        key.zeroize();

        derived
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

impl Zeroize for MasterKey {
    fn zeroize(&mut self) {
        self.key.zeroize();
    }
}

impl ZeroizeOnDrop for MasterKey {}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}
