//! The storage engine: encrypted secrets with a view budget in a TTL store.
//!
//! Every secret occupies two backend keys sharing one TTL:
//!
//! | key            | value                               |
//! |----------------|-------------------------------------|
//! | `<id>`         | ciphertext of the encoded record    |
//! | `<id>_counter` | remaining views, decimal ASCII      |
//!
//! The engine keeps no mutable state of its own. Concurrent callers are safe
//! because every state change is a single atomic backend call.
//!
//! Reading and consuming a view are separate steps: [`Storage::get`] decrypts
//! without touching the budget, and the caller reports delivery with
//! [`Storage::viewed`]. Concurrent readers of a single-view secret can
//! therefore all be shown the payload before the first of them consumes the
//! budget; delivery is at-least-once, not exactly-once.

use std::{
    future::Future,
    time::{Duration, SystemTime},
};
use tracing::{debug, error, instrument, warn};
use zeroize::Zeroizing;

use crate::{
    backend::Backend,
    cipher::{Aes256GcmCipher, Cipher},
    codec::{BincodeCodec, Codec},
    crypt::{EncryptionKey, MasterKey},
    error::{BackendError, CipherError, Result, StorageError},
    locator::Locator,
    secret::{Secret, SecretId},
};

const COUNTER_SUFFIX: &str = "_counter";

/// Tunables of a [`Storage`] engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageOptions {
    /// Deadline for each backend call; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Largest accepted plaintext (value plus attachments), in bytes.
    pub max_payload_bytes: usize,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(5)),
            max_payload_bytes: 16 * 1024 * 1024,
        }
    }
}

/// What [`Storage::store`] hands back to the creator.
#[derive(Debug, Clone)]
pub struct InsertResult {
    pub id: SecretId,
    pub key: EncryptionKey,
    pub expires_at: SystemTime,
}

impl InsertResult {
    pub fn locator(&self) -> Locator {
        Locator::new(self.id, self.key.clone())
    }
}

/// Backend keys for a secret: `(record key, counter key)`.
pub fn storage_keys(id: SecretId) -> (String, String) {
    let record_key = id.to_string();
    let counter_key = format!("{record_key}{COUNTER_SUFFIX}");
    (record_key, counter_key)
}

/// Ephemeral secret storage over a [`Backend`].
///
/// The cipher and codec are injected; [`Storage::new`] uses AES-256-GCM and
/// bincode. With a [`MasterKey`] configured the content key of every secret
/// is derived from it and the locator key, so the backend contents are
/// useless without the server key too.
pub struct Storage<B, C = Aes256GcmCipher, E = BincodeCodec> {
    backend: B,
    cipher: C,
    codec: E,
    master_key: Option<MasterKey>,
    options: StorageOptions,
}

impl<B: Backend> Storage<B> {
    pub fn new(backend: B) -> Self {
        Self::with_parts(backend, Aes256GcmCipher, BincodeCodec)
    }
}

impl<B, C, E> Storage<B, C, E>
where
    B: Backend,
    C: Cipher,
    E: Codec,
{
    pub fn with_parts(backend: B, cipher: C, codec: E) -> Self {
        Self {
            backend,
            cipher,
            codec,
            master_key: None,
            options: StorageOptions::default(),
        }
    }

    pub fn with_master_key(mut self, master_key: MasterKey) -> Self {
        self.master_key = Some(master_key);
        self
    }

    pub fn with_options(mut self, options: StorageOptions) -> Self {
        self.options = options;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    /// Seals, encodes, encrypts and writes a secret.
    ///
    /// Both keys are written in one set-if-absent batch with a TTL equal to
    /// the secret's expiration; an existing id is never overwritten.
    #[instrument(skip(self, secret), fields(id = %secret.id()))]
    pub async fn store(&self, secret: &mut Secret) -> Result<InsertResult> {
        if secret.expiration().is_zero() {
            return Err(StorageError::InvalidExpiration);
        }
        let size = secret.payload_len();
        if size > self.options.max_payload_bytes {
            return Err(StorageError::PayloadTooLarge {
                size,
                limit: self.options.max_payload_bytes,
            });
        }

        let id = secret.id();
        let expires_at = secret.seal().ok_or(StorageError::InvalidExpiration)?;
        let plaintext = Zeroizing::new(self.codec.encode(&secret.record(expires_at))?);
        let content_key = self.content_key(id, secret.key())?;
        let ciphertext = self.cipher.encrypt(&content_key, &plaintext)?;

        let (record_key, counter_key) = storage_keys(id);
        let budget = secret.max_views().to_string();
        let entries: [(&str, &[u8]); 2] = [
            (counter_key.as_str(), budget.as_bytes()),
            (record_key.as_str(), ciphertext.as_slice()),
        ];

        let written = self
            .run(
                "store",
                self.backend.set_nx_batch(&entries, secret.expiration()),
            )
            .await?;
        if !written {
            warn!("secret id already present in backend");
            return Err(StorageError::Collision(id.to_string()));
        }

        debug!(
            max_views = secret.max_views(),
            ttl_secs = secret.expiration().as_secs(),
            "secret stored"
        );
        Ok(InsertResult {
            id,
            key: secret.key().clone(),
            expires_at,
        })
    }

    /// Reads and decrypts a secret without consuming its view budget.
    ///
    /// An absent counter means never stored, expired or burned. A counter at
    /// zero is a leftover of an exhausted secret and is burned on the spot.
    #[instrument(skip(self, key))]
    pub async fn get(&self, id: SecretId, key: &EncryptionKey) -> Result<Secret> {
        let (record_key, counter_key) = storage_keys(id);

        match self.read_counter(id, &counter_key).await? {
            None => {
                debug!("secret not found");
                return Err(StorageError::NotFound);
            }
            Some(0) => {
                warn!("dangling exhausted secret, burning");
                self.burn(id).await?;
                return Err(StorageError::NotFound);
            }
            Some(_) => {}
        }

        let ciphertext = self
            .run("get record", self.backend.get(&record_key))
            .await?
            .ok_or_else(|| {
                error!("view counter present without a record");
                StorageError::Inconsistent(id.to_string())
            })?;

        let content_key = self.content_key(id, key)?;
        let plaintext = Zeroizing::new(self.cipher.decrypt(&content_key, &ciphertext).map_err(
            |err| {
                warn!(error = %err, "decrypting secret");
                err
            },
        )?);
        let record = self.codec.decode(&plaintext)?;

        Ok(Secret::from_record(id, key.clone(), record))
    }

    /// Remaining views of a live secret.
    #[instrument(skip(self))]
    pub async fn views_left(&self, id: SecretId) -> Result<u64> {
        let (_, counter_key) = storage_keys(id);
        self.read_counter(id, &counter_key)
            .await?
            .ok_or(StorageError::NotFound)
    }

    /// Consumes one view; call once per delivery of the payload to a reader.
    ///
    /// The secret is burned as soon as its budget reaches zero.
    #[instrument(skip(self))]
    pub async fn viewed(&self, id: SecretId) -> Result<()> {
        let (_, counter_key) = storage_keys(id);

        match self.read_counter(id, &counter_key).await? {
            None => return Err(StorageError::NotFound),
            Some(0) => {
                warn!("view budget already exhausted, burning");
                return self.burn(id).await;
            }
            Some(_) => {}
        }

        match self
            .run("decrement", self.backend.decrement(&counter_key))
            .await?
        {
            None => Err(StorageError::NotFound),
            Some(remaining) if remaining <= 0 => {
                debug!("view budget exhausted");
                self.burn(id).await
            }
            Some(remaining) => {
                debug!(remaining, "secret viewed");
                Ok(())
            }
        }
    }

    /// Deletes both keys of a secret. Burning an absent secret is a no-op.
    #[instrument(skip(self))]
    pub async fn burn(&self, id: SecretId) -> Result<()> {
        let (record_key, counter_key) = storage_keys(id);
        let deleted = self
            .run(
                "burn",
                self.backend
                    .delete(&[counter_key.as_str(), record_key.as_str()]),
            )
            .await?;

        debug!(deleted, "secret burned");
        Ok(())
    }

    async fn read_counter(&self, id: SecretId, counter_key: &str) -> Result<Option<u64>> {
        let Some(raw) = self
            .run("get counter", self.backend.get(counter_key))
            .await?
        else {
            return Ok(None);
        };

        let value = std::str::from_utf8(&raw)
            .ok()
            .and_then(|value| value.trim().parse::<i64>().ok())
            .ok_or_else(|| {
                error!("view counter is not an integer");
                StorageError::InvalidCounter {
                    id: id.to_string(),
                    value: String::from_utf8_lossy(&raw).into_owned(),
                }
            })?;

        // A negative counter is as exhausted as zero.
        Ok(Some(u64::try_from(value).unwrap_or(0)))
    }

    fn content_key(
        &self,
        id: SecretId,
        key: &EncryptionKey,
    ) -> std::result::Result<EncryptionKey, CipherError> {
        if key.expose().len() != self.cipher.key_len() {
            return Err(CipherError::InvalidKeyLength {
                expected: self.cipher.key_len(),
                actual: key.expose().len(),
            });
        }
        match &self.master_key {
            Some(master_key) => master_key.derive(key, id.to_string().as_bytes()),
            None => Ok(key.clone()),
        }
    }

    async fn run<T, F>(&self, op: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, BackendError>>,
    {
        let outcome = match self.options.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!(op, timeout_ms = limit.as_millis() as u64, "backend call timed out");
                    return Err(StorageError::Timeout);
                }
            },
            None => call.await,
        };

        outcome.map_err(|err| {
            error!(op, error = %err, "backend call failed");
            StorageError::Backend(err)
        })
    }
}
