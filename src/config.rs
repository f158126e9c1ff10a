//! Process configuration read from `OSS_*` environment variables.
//!
//! | variable                  | default                  |
//! |---------------------------|--------------------------|
//! | `OSS_SERVER_DB`           | `redis://127.0.0.1:6379` |
//! | `OSS_SERVER_DOMAIN`       | `http://localhost:8080`  |
//! | `OSS_SECRET_KEY`          | unset (no master key)    |
//! | `OSS_STORAGE_TIMEOUT_MS`  | `5000`, `0` disables     |
//! | `OSS_STORAGE_MAX_PAYLOAD` | `16777216`               |

use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::{
    backend::Backend,
    crypt::{KEY_LEN, MasterKey},
    error::ConfigError,
    storage::{Storage, StorageOptions},
};

pub const ENV_SERVER_DB: &str = "OSS_SERVER_DB";
pub const ENV_SERVER_DOMAIN: &str = "OSS_SERVER_DOMAIN";
pub const ENV_SECRET_KEY: &str = "OSS_SECRET_KEY";
pub const ENV_STORAGE_TIMEOUT_MS: &str = "OSS_STORAGE_TIMEOUT_MS";
pub const ENV_STORAGE_MAX_PAYLOAD: &str = "OSS_STORAGE_MAX_PAYLOAD";

const DEFAULT_SERVER_DB: &str = "redis://127.0.0.1:6379";
const DEFAULT_SERVER_DOMAIN: &str = "http://localhost:8080";

#[derive(Debug)]
pub struct Config {
    /// Backend connection string.
    pub redis_url: String,
    /// Base URL locators are rendered under.
    pub domain: String,
    pub master_key: Option<MasterKey>,
    pub storage: StorageOptions,
}

impl Config {
    /// Loads a `.env` file if one exists, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    ///
    /// Empty values count as unset.
    #[instrument(skip_all)]
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());
        let defaults = StorageOptions::default();

        let master_key = get(ENV_SECRET_KEY)
            .map(|encoded| parse_master_key(encoded.trim()))
            .transpose()?;

        let timeout = match get(ENV_STORAGE_TIMEOUT_MS) {
            Some(raw) => match parse_number::<u64>(ENV_STORAGE_TIMEOUT_MS, &raw)? {
                0 => None,
                millis => Some(Duration::from_millis(millis)),
            },
            None => defaults.timeout,
        };

        let max_payload_bytes = match get(ENV_STORAGE_MAX_PAYLOAD) {
            Some(raw) => parse_number::<usize>(ENV_STORAGE_MAX_PAYLOAD, &raw)?,
            None => defaults.max_payload_bytes,
        };

        Ok(Self {
            redis_url: get(ENV_SERVER_DB).unwrap_or_else(|| DEFAULT_SERVER_DB.to_string()),
            domain: get(ENV_SERVER_DOMAIN).unwrap_or_else(|| DEFAULT_SERVER_DOMAIN.to_string()),
            master_key,
            storage: StorageOptions {
                timeout,
                max_payload_bytes,
            },
        })
    }

    /// Wires a [`Storage`] over `backend` with the configured options and
    /// master key.
    pub fn into_storage<B: Backend>(self, backend: B) -> Storage<B> {
        let storage = Storage::new(backend).with_options(self.storage);
        match self.master_key {
            Some(master_key) => storage.with_master_key(master_key),
            None => storage,
        }
    }
}

fn parse_number<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        var,
        reason: err.to_string(),
    })
}

fn parse_master_key(encoded: &str) -> Result<MasterKey, ConfigError> {
    let bytes = zeroize::Zeroizing::new(STANDARD.decode(encoded).map_err(|err| {
        ConfigError::Invalid {
            var: ENV_SECRET_KEY,
            reason: err.to_string(),
        }
    })?);
    if bytes.len() != KEY_LEN {
        return Err(ConfigError::Invalid {
            var: ENV_SECRET_KEY,
            reason: format!("expected {KEY_LEN} bytes, got {}", bytes.len()),
        });
    }
    MasterKey::from_slice(&bytes).map_err(|err| ConfigError::Invalid {
        var: ENV_SECRET_KEY,
        reason: err.to_string(),
    })
}
