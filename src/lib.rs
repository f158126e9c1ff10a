//! One-time secret storage.
//!
//! A [`Secret`] is encrypted under a fresh random key, stored in a TTL
//! key/value [`Backend`] next to a counter of remaining views, and handed
//! back to its creator as a [`Locator`]. Only the locator holder can decrypt
//! it; the secret disappears once its views are used up, it is burned, or
//! its expiration passes.

pub mod backend;
pub mod cipher;
pub mod codec;
pub mod config;
pub mod crypt;
pub mod error;
pub mod locator;
pub mod secret;
pub mod storage;

pub use backend::{Backend, MemoryBackend, RedisBackend};
pub use cipher::{Aes256GcmCipher, Cipher};
pub use codec::{BincodeCodec, Codec, SecretFile, SecretRecord};
pub use config::Config;
pub use crypt::{EncryptionKey, MasterKey};
pub use error::StorageError;
pub use locator::Locator;
pub use secret::{Secret, SecretId, SecretRequest};
pub use storage::{InsertResult, Storage, StorageOptions};
