//! The shareable reference to a secret: `<base-url>/<hex(key)>-<id>`.
//!
//! The decryption key travels inside the locator only, never through the
//! backend. The id is rendered without hyphens so the single `-` separates
//! key from id unambiguously.

use crate::{crypt::EncryptionKey, error::LocatorError, secret::SecretId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub id: SecretId,
    pub key: EncryptionKey,
}

impl Locator {
    pub fn new(id: SecretId, key: EncryptionKey) -> Self {
        Self { id, key }
    }

    /// The path segment: `<hex key>-<id>`.
    pub fn slug(&self) -> String {
        format!("{}-{}", self.key.to_hex(), self.id.simple())
    }

    /// The full URL under `base`; a trailing slash on `base` is ignored.
    pub fn url(&self, base: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), self.slug())
    }

    /// Parses a slug, or a URL whose last path segment is a slug.
    pub fn parse(input: &str) -> Result<Self, LocatorError> {
        let input = input.trim().trim_end_matches('/');
        let slug = input.rsplit('/').next().unwrap_or(input);
        if slug.is_empty() {
            return Err(LocatorError::Empty);
        }

        let (key, id) = slug
            .split_once('-')
            .ok_or(LocatorError::MissingSeparator)?;
        let key = EncryptionKey::from_slice(&hex::decode(key)?)?;
        let id = id.parse::<SecretId>()?;

        Ok(Self { id, key })
    }
}
