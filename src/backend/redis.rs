//! Redis (and valkey) implementation of [`Backend`].

use async_trait::async_trait;
use redis::{Client, Script, aio::ConnectionManager};
use std::time::Duration;
use tracing::{error, instrument};

use super::Backend;
use crate::error::BackendError;

// Never recreates an expired counter, and never goes below zero.
const DECREMENT_SCRIPT: &str = r"
local value = redis.call('GET', KEYS[1])
if not value then
    return false
end
if tonumber(value) <= 0 then
    return 0
end
return redis.call('DECR', KEYS[1])
";

/// A multiplexed connection shared by every clone.
///
/// The connection manager reconnects on its own; callers may clone this and
/// use it from any number of tasks.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    decrement: Script,
}

impl RedisBackend {
    /// Opens a managed connection to `url` (`redis://host:port/db`).
    #[instrument(skip(url))]
    pub async fn connect(url: &str) -> Result<Self, BackendError> {
        let client = Client::open(url).map_err(|err| {
            error!(error = err.to_string(), "parsing redis url");
            err
        })?;
        let conn = ConnectionManager::new(client).await.map_err(|err| {
            error!(error = err.to_string(), "connecting to redis");
            err
        })?;

        Ok(Self {
            conn,
            decrement: Script::new(DECREMENT_SCRIPT),
        })
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl Backend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_nx_batch(
        &self,
        entries: &[(&str, &[u8])],
        ttl: Duration,
    ) -> Result<bool, BackendError> {
        let mut conn = self.conn.clone();
        let ttl = ttl_millis(ttl);

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.cmd("SET")
                .arg(*key)
                .arg(*value)
                .arg("NX")
                .arg("PX")
                .arg(ttl);
        }

        let replies: Vec<Option<String>> = pipe.query_async(&mut conn).await?;
        if replies.len() != entries.len() {
            return Err(BackendError::UnexpectedReply(format!(
                "{} replies for {} SET commands",
                replies.len(),
                entries.len()
            )));
        }
        Ok(replies.iter().all(Option::is_some))
    }

    async fn decrement(&self, key: &str) -> Result<Option<i64>, BackendError> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = self.decrement.key(key).invoke_async(&mut conn).await?;
        Ok(value)
    }

    async fn delete(&self, keys: &[&str]) -> Result<u64, BackendError> {
        let mut conn = self.conn.clone();
        let deleted: u64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_sent_in_whole_milliseconds() {
        assert_eq!(ttl_millis(Duration::from_secs(30)), 30_000);
        assert_eq!(ttl_millis(Duration::from_micros(1500)), 1);
        assert_eq!(ttl_millis(Duration::ZERO), 1);
    }
}
