//! Redis-backed cache store.
//!
//! The connection is opened on first use and shared afterwards; `ConnectionManager`
//! multiplexes concurrent commands over it and reconnects after failures.

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::info;

use super::store::{CacheBackend, CacheError};

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::backend(err)
    }
}

pub struct RedisCacheBackend {
    client: Client,
    connection: OnceCell<ConnectionManager>,
}

impl RedisCacheBackend {
    /// Validates the URL; no connection is made until the first command.
    pub fn open(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                let manager = self.client.get_connection_manager().await?;
                info!(target = "itsm::cache::redis", "connected to redis");
                Ok::<_, CacheError>(manager)
            })
            .await?;
        Ok(manager.clone())
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(key).await?;
        raw.map(|payload| serde_json::from_str(&payload))
            .transpose()
            .map_err(CacheError::from)
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError> {
        let payload = serde_json::to_string(value)?;
        // SETEX rejects a zero expiry.
        let seconds = ttl.as_secs().max(1);
        let mut conn = self.connection().await?;
        let _: () = conn.set_ex(key, payload, seconds).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> = redis::cmd("KEYS").arg(pattern).query_async(&mut conn).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let _: i64 = conn.del(&keys).await?;
        Ok(keys.len())
    }
}
