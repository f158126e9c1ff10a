//! Error types for the secret storage engine and its building blocks.

/// Result type returned by [`Storage`](crate::storage::Storage) operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Failures of the symmetric cipher.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// The key does not have the length the algorithm requires.
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// The input is shorter than the nonce and authentication tag.
    #[error("ciphertext too short: {actual} bytes, need at least {minimum}")]
    Truncated { minimum: usize, actual: usize },

    /// Authentication failed: wrong key or tampered ciphertext.
    #[error("ciphertext authentication failed")]
    Authentication,

    /// The AEAD refused to encrypt the plaintext.
    #[error("encryption failed")]
    Encryption,

    /// HKDF could not expand the requested key length.
    #[error("key derivation failed")]
    KeyDerivation,
}

/// Failures of the record codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encoding record: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("decoding record: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// The buffer holds a valid record followed by unexpected bytes.
    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
}

/// Failures reported by a key/value backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    /// The TTL cannot be represented by the backend's clock.
    #[error("ttl of {0:?} is out of range")]
    TtlOutOfRange(std::time::Duration),

    /// The backend answered with something the protocol does not expect.
    #[error("unexpected backend reply: {0}")]
    UnexpectedReply(String),
}

/// Failures while parsing a locator slug or URL.
#[derive(Debug, thiserror::Error)]
pub enum LocatorError {
    #[error("locator is empty")]
    Empty,

    #[error("locator is missing the '-' separator")]
    MissingSeparator,

    #[error("locator key is not valid hex: {0}")]
    Key(#[from] hex::FromHexError),

    #[error("locator key has the wrong length: {0}")]
    KeyLength(#[from] CipherError),

    #[error("locator id is not a valid uuid: {0}")]
    Id(#[from] uuid::Error),
}

/// Why a [`SecretRequest`](crate::secret::SecretRequest) was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("secret is required")]
    EmptyValue,
}

/// Failures while loading [`Config`](crate::config::Config).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Errors produced by storage engine operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The id never existed, has expired, or its view budget is exhausted.
    #[error("record not found")]
    NotFound,

    /// A set-if-absent write found an existing key for this id.
    #[error("record {0} already exists")]
    Collision(String),

    /// The counter key exists but the record key does not.
    #[error("record {0} has a counter but no payload")]
    Inconsistent(String),

    /// The counter key does not hold a decimal integer.
    #[error("record {id} has an invalid counter: {value:?}")]
    InvalidCounter { id: String, value: String },

    /// The backend cannot store an entry with a zero TTL.
    #[error("expiration must be greater than zero")]
    InvalidExpiration,

    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    /// The configured per-operation deadline elapsed.
    #[error("backend operation timed out")]
    Timeout,

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StorageError {
    /// Returns true for the expected "absent, expired or exhausted" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound)
    }
}
