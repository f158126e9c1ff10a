//! In-process implementation of [`Backend`], for tests and single-node embedding.

use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, trace};

use super::Backend;
use crate::error::BackendError;

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// A TTL map guarded by a single mutex.
///
/// Expired entries are invisible to every operation and dropped on access;
/// [`MemoryBackend::spawn_sweeper`] removes the ones nobody touches again.
/// Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave an entry half-written.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn live<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|entry| entry.expires_at <= now) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }

    /// Removes every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts a task purging expired entries every `period`.
    ///
    /// The task runs until the returned handle is aborted.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let backend = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let purged = backend.purge_expired();
                if purged > 0 {
                    debug!(purged, "swept expired entries");
                }
            }
        })
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let mut entries = self.lock();
        Ok(Self::live(&mut entries, key, Instant::now()).map(|entry| entry.value.clone()))
    }

    async fn set_nx_batch(
        &self,
        batch: &[(&str, &[u8])],
        ttl: Duration,
    ) -> Result<bool, BackendError> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .ok_or(BackendError::TtlOutOfRange(ttl))?;
        let mut entries = self.lock();

        for (key, _) in batch {
            if Self::live(&mut entries, key, now).is_some() {
                trace!(key, "set-if-absent refused");
                return Ok(false);
            }
        }
        for (key, value) in batch {
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_vec(),
                    expires_at,
                },
            );
        }
        Ok(true)
    }

    async fn decrement(&self, key: &str) -> Result<Option<i64>, BackendError> {
        let mut entries = self.lock();
        let Some(entry) = Self::live(&mut entries, key, Instant::now()) else {
            return Ok(None);
        };

        let current: i64 = std::str::from_utf8(&entry.value)
            .ok()
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| {
                BackendError::UnexpectedReply("value is not an integer".to_string())
            })?;
        if current <= 0 {
            return Ok(Some(0));
        }

        let next = current - 1;
        entry.value = next.to_string().into_bytes();
        Ok(Some(next))
    }

    async fn delete(&self, keys: &[&str]) -> Result<u64, BackendError> {
        let now = Instant::now();
        let mut entries = self.lock();
        let mut deleted = 0;
        for key in keys {
            if let Some(entry) = entries.remove(*key) {
                if entry.expires_at > now {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn set_nx_batch_writes_all_or_nothing() {
        let backend = MemoryBackend::new();

        let first = [("a", b"1".as_slice()), ("b", b"2".as_slice())];
        let second = [("c", b"3".as_slice()), ("b", b"x".as_slice())];
        assert!(backend.set_nx_batch(&first, TTL).await.unwrap());
        assert!(!backend.set_nx_batch(&second, TTL).await.unwrap());

        assert_eq!(backend.get("b").await.unwrap().as_deref(), Some(&b"2"[..]));
        assert_eq!(backend.get("c").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let backend = MemoryBackend::new();
        backend.set_nx_batch(&[("k", b"v".as_slice())], TTL).await.unwrap();

        tokio::time::advance(TTL - Duration::from_millis(1)).await;
        assert!(backend.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(backend.get("k").await.unwrap().is_none());
        assert_eq!(backend.decrement("k").await.unwrap(), None);

        // An expired key no longer blocks set-if-absent.
        assert!(backend.set_nx_batch(&[("k", b"w".as_slice())], TTL).await.unwrap());
    }

    #[tokio::test]
    async fn decrement_stops_at_zero() {
        let backend = MemoryBackend::new();
        backend.set_nx_batch(&[("n", b"2".as_slice())], TTL).await.unwrap();

        assert_eq!(backend.decrement("n").await.unwrap(), Some(1));
        assert_eq!(backend.decrement("n").await.unwrap(), Some(0));
        assert_eq!(backend.decrement("n").await.unwrap(), Some(0));
        assert_eq!(backend.get("n").await.unwrap().as_deref(), Some(&b"0"[..]));
    }

    #[tokio::test]
    async fn decrement_never_creates_a_key() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.decrement("missing").await.unwrap(), None);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn decrement_rejects_non_integer() {
        let backend = MemoryBackend::new();
        backend.set_nx_batch(&[("s", b"abc".as_slice())], TTL).await.unwrap();
        assert!(backend.decrement("s").await.is_err());
    }

    #[tokio::test]
    async fn rejects_ttl_past_the_clock() {
        let backend = MemoryBackend::new();
        let err = backend
            .set_nx_batch(&[("k", b"v".as_slice())], Duration::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::TtlOutOfRange(_)));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let backend = MemoryBackend::new();
        let entries = [("a", b"1".as_slice()), ("b", b"2".as_slice())];
        backend.set_nx_batch(&entries, TTL).await.unwrap();

        assert_eq!(backend.delete(&["a", "b"]).await.unwrap(), 2);
        assert_eq!(backend.delete(&["a", "b"]).await.unwrap(), 0);
        assert!(backend.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_untouched_entries() {
        let backend = MemoryBackend::new();
        backend.set_nx_batch(&[("a", b"1".as_slice())], TTL).await.unwrap();
        backend
            .set_nx_batch(&[("b", b"2".as_slice())], TTL * 4)
            .await
            .unwrap();

        let sweeper = backend.spawn_sweeper(Duration::from_secs(10));
        tokio::time::sleep(TTL + Duration::from_secs(10)).await;

        assert_eq!(backend.lock().len(), 1);
        sweeper.abort();
    }
}
