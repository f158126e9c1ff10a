//! Definition of the [`Backend`] trait: the TTL key/value store under the engine.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::BackendError;

mod memory;
mod redis;

pub use self::memory::MemoryBackend;
pub use self::redis::RedisBackend;

/// A key/value store with per-key expiry and atomic primitives.
///
/// Implementations must be safe to call from any number of tasks at once;
/// all correctness under concurrency comes from the atomicity guaranteed
/// here, never from locking in the engine.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Reads a key; `None` when it is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// Writes every entry with the same TTL, only where the key is absent.
    ///
    /// The entries are sent as one batch that becomes visible all together.
    /// Returns `false` when at least one key already existed. Whether the
    /// other entries of a refused batch were written is backend-specific;
    /// they carry the same TTL either way.
    async fn set_nx_batch(
        &self,
        entries: &[(&str, &[u8])],
        ttl: Duration,
    ) -> Result<bool, BackendError>;

    /// Atomically decrements an existing decimal counter, never below zero.
    ///
    /// Returns the new value, or `None` when the key is absent. An absent key
    /// is not created.
    async fn decrement(&self, key: &str) -> Result<Option<i64>, BackendError>;

    /// Deletes the keys in one batch, returning how many existed.
    async fn delete(&self, keys: &[&str]) -> Result<u64, BackendError>;
}
