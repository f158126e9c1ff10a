//! Encoding of the persisted subset of a secret.
//!
//! The encoded bytes are what gets encrypted and written to the backend; the
//! id, key and view budget are deliberately not part of it.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CodecError;

/// Upper bound on a decoded record; larger length prefixes are rejected
/// before anything is allocated.
pub const MAX_ENCODED_LEN: usize = 256 * 1024 * 1024;

/// A file attached to a secret.
#[derive(Serialize, Deserialize, Encode, Decode, Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretFile {
    pub name: String,
    pub content: Vec<u8>,
}

impl SecretFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

impl std::fmt::Debug for SecretFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretFile")
            .field("name", &self.name)
            .field("len", &self.content.len())
            .finish()
    }
}

/// The part of a secret that is encrypted and stored.
#[derive(Serialize, Deserialize, Encode, Decode, Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretRecord {
    pub value: String,
    pub passphrase: Option<String>,
    #[zeroize(skip)]
    pub expires_at: SystemTime,
    /// Attachments in display order.
    pub files: Vec<SecretFile>,
}

impl std::fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRecord")
            .field("value", &"[REDACTED]")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .field("files", &self.files)
            .finish()
    }
}

/// Turns a [`SecretRecord`] into bytes and back.
pub trait Codec: Send + Sync {
    fn encode(&self, record: &SecretRecord) -> Result<Vec<u8>, CodecError>;

    /// Must fail with [`CodecError`] on malformed input, never panic.
    fn decode(&self, bytes: &[u8]) -> Result<SecretRecord, CodecError>;
}

/// bincode (standard configuration, varint lengths) codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl BincodeCodec {
    fn config() -> impl bincode::config::Config {
        bincode::config::standard().with_limit::<MAX_ENCODED_LEN>()
    }
}

impl Codec for BincodeCodec {
    fn encode(&self, record: &SecretRecord) -> Result<Vec<u8>, CodecError> {
        Ok(bincode::encode_to_vec(record, Self::config())?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<SecretRecord, CodecError> {
        let (record, read): (SecretRecord, usize) =
            bincode::decode_from_slice(bytes, Self::config())?;
        if read != bytes.len() {
            return Err(CodecError::TrailingBytes(bytes.len() - read));
        }
        Ok(record)
    }
}
