use serde::{Deserialize, Serialize};
use std::{
    fmt,
    str::FromStr,
    time::{Duration, SystemTime},
};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::{
    codec::{SecretFile, SecretRecord},
    crypt::EncryptionKey,
    error::RequestError,
};

/// Lifetime used when the creator does not pick one.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(30 * 60);

/// Shortest lifetime a creator may request.
pub const MIN_EXPIRATION: Duration = Duration::from_secs(30);

/// Longest lifetime [`SecretRequest::build`] grants; longer requests are capped.
pub const MAX_EXPIRATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// View budget used when the creator does not pick one.
pub const DEFAULT_MAX_VIEWS: u64 = 1;

/// Selectable lifetimes in seconds, with their display labels.
pub const EXPIRATION_PRESETS: &[(u64, &str)] = &[
    (30, "30 seconds"),
    (60, "1 minute"),
    (300, "5 minutes"),
    (900, "15 minutes"),
    (1800, "30 minutes"),
    (3600, "1 hour"),
    (7200, "2 hours"),
    (10800, "3 hours"),
    (21600, "6 hours"),
    (43200, "12 hours"),
    (86400, "1 day"),
    (259200, "3 days"),
    (432000, "5 days"),
    (604800, "1 week"),
];

/// Opaque identifier of a secret; also its primary backend key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretId(Uuid);

impl SecretId {
    /// A fresh random (v4) id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The id without hyphens, as it appears in locators.
    pub fn simple(&self) -> String {
        self.0.simple().to_string()
    }
}

impl Default for SecretId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SecretId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for SecretId {
    type Err = uuid::Error;

    /// Accepts both the hyphenated and the simple form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A secret as handled in memory: payload, access policy and lifecycle state.
///
/// A `Secret` starts unsealed. [`Storage::store`](crate::storage::Storage::store)
/// seals it, fixing `expires_at`, right before encoding. The live view
/// counter is never held here; `max_views` is only the initial budget.
pub struct Secret {
    id: SecretId,
    key: EncryptionKey,
    expiration: Duration,
    max_views: u64,
    passphrase: Option<String>,
    value: String,
    files: Vec<SecretFile>,
    expires_at: Option<SystemTime>,
}

impl Secret {
    /// Creates an unsealed secret with the default lifetime and a single view.
    pub fn new(id: SecretId, key: EncryptionKey) -> Self {
        Self {
            id,
            key,
            expiration: DEFAULT_EXPIRATION,
            max_views: DEFAULT_MAX_VIEWS,
            passphrase: None,
            value: String::new(),
            files: Vec::new(),
            expires_at: None,
        }
    }

    pub fn id(&self) -> SecretId {
        self.id
    }

    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }

    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    pub fn max_views(&self) -> u64 {
        self.max_views
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn files(&self) -> &[SecretFile] {
        &self.files
    }

    /// Set once the secret has been sealed for storage or read back.
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    pub fn set_passphrase(&mut self, passphrase: impl Into<String>) {
        self.passphrase = Some(passphrase.into());
    }

    /// Stored as given; range policy belongs to the caller (see [`SecretRequest`]).
    pub fn set_expiration(&mut self, expiration: Duration) {
        self.expiration = expiration;
    }

    /// Stored as given; range policy belongs to the caller (see [`SecretRequest`]).
    pub fn set_max_views(&mut self, max_views: u64) {
        self.max_views = max_views;
    }

    /// Appends an attachment; attachments keep insertion order.
    pub fn add_file(&mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files.push(SecretFile::new(name, content));
    }

    /// Total plaintext size of the value and all attachments.
    pub fn payload_len(&self) -> usize {
        self.value.len() + self.files.iter().map(|f| f.content.len()).sum::<usize>()
    }

    /// Freezes `expires_at` at `now + expiration` and returns it.
    ///
    /// Returns `None`, leaving the secret unsealed, when the expiration does
    /// not fit the system clock.
    pub fn seal(&mut self) -> Option<SystemTime> {
        let expires_at = SystemTime::now().checked_add(self.expiration)?;
        self.expires_at = Some(expires_at);
        Some(expires_at)
    }

    /// Copies the persisted subset out for encoding.
    ///
    /// Returns `None` for a secret that has not been sealed.
    pub fn to_record(&self) -> Option<SecretRecord> {
        self.expires_at.map(|expires_at| self.record(expires_at))
    }

    pub(crate) fn record(&self, expires_at: SystemTime) -> SecretRecord {
        SecretRecord {
            value: self.value.clone(),
            passphrase: self.passphrase.clone(),
            expires_at,
            files: self.files.clone(),
        }
    }

    /// Repopulates the entity from a decoded record.
    pub fn reinit(
        &mut self,
        value: String,
        passphrase: Option<String>,
        expires_at: SystemTime,
        files: Vec<SecretFile>,
    ) {
        self.value.zeroize();
        self.value = value;
        self.passphrase.zeroize();
        self.passphrase = passphrase;
        self.expires_at = Some(expires_at);
        self.files = files;
    }

    /// Rebuilds a secret read back from storage.
    pub(crate) fn from_record(id: SecretId, key: EncryptionKey, mut record: SecretRecord) -> Self {
        let mut secret = Self::new(id, key);
        secret.reinit(
            std::mem::take(&mut record.value),
            record.passphrase.take(),
            record.expires_at,
            std::mem::take(&mut record.files),
        );
        secret
    }

    /// Checks a reader-supplied passphrase in constant time.
    ///
    /// A secret without a passphrase, or with an empty one, accepts anything.
    pub fn verify_passphrase(&self, candidate: &str) -> bool {
        match self.passphrase.as_deref() {
            None | Some("") => true,
            Some(expected) => {
                constant_time_eq::constant_time_eq(candidate.as_bytes(), expected.as_bytes())
            }
        }
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.value.zeroize();
        self.passphrase.zeroize();
        self.files.zeroize();
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("id", &self.id)
            .field("expiration", &self.expiration)
            .field("max_views", &self.max_views)
            .field("has_passphrase", &self.passphrase.is_some())
            .field("files", &self.files)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// What a creator submits; turned into a [`Secret`] by [`SecretRequest::build`].
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SecretRequest {
    pub value: String,
    pub passphrase: Option<String>,
    pub expiration_secs: Option<u64>,
    pub max_views: Option<u64>,
    #[serde(default)]
    pub files: Vec<SecretFile>,
}

impl SecretRequest {
    /// Creates a secret with a fresh id and key, applying the creation policy:
    /// a lifetime is honoured only from [`MIN_EXPIRATION`] up and capped at
    /// [`MAX_EXPIRATION`], a view budget
    /// only above one, a passphrase only when non-empty.
    pub fn build(self) -> Result<Secret, RequestError> {
        if self.value.is_empty() {
            return Err(RequestError::EmptyValue);
        }

        let mut secret = Secret::new(SecretId::new(), EncryptionKey::generate());
        secret.set_value(self.value.as_str());

        if let Some(secs) = self.expiration_secs {
            let expiration = Duration::from_secs(secs);
            if expiration >= MIN_EXPIRATION {
                secret.set_expiration(expiration.min(MAX_EXPIRATION));
            }
        }
        if let Some(max_views) = self.max_views.filter(|views| *views > 1) {
            secret.set_max_views(max_views);
        }
        if let Some(passphrase) = self.passphrase.as_deref().filter(|p| !p.is_empty()) {
            secret.set_passphrase(passphrase);
        }
        for file in &self.files {
            secret.add_file(file.name.as_str(), file.content.as_slice());
        }

        Ok(secret)
    }
}
