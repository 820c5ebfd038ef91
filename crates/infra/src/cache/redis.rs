//! Redis-backed entitlement cache (shared across replicas).
//!
//! Entries are written with `SET key value EX ttl`; Redis owns expiry and
//! memory policy (`maxmemory` / eviction are server configuration).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::instrument;

use super::{CacheError, EntitlementCache};

const DEFAULT_KEY_PREFIX: &str = "warden:entitlements:";

#[derive(Debug, Clone)]
pub struct RedisEntitlementCache {
    client: Arc<redis::Client>,
    key_prefix: String,
    ttl: Duration,
}

impl RedisEntitlementCache {
    /// `redis_url` e.g. "redis://localhost:6379".
    pub fn new(redis_url: impl AsRef<str>, ttl: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            ttl,
        })
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    fn key(&self, subject: &str) -> String {
        format!("{}{}", self.key_prefix, subject)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Backend(format!("connect failed: {e}")))
    }
}

#[async_trait]
impl EntitlementCache for RedisEntitlementCache {
    #[instrument(skip(self), err)]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<Vec<u8>>>(self.key(key))
            .await
            .map_err(|e| CacheError::Backend(format!("GET failed: {e}")))
    }

    #[instrument(skip(self, value), fields(bytes = value.len()), err)]
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(self.key(key), value, self.ttl.as_secs().max(1))
            .await
            .map_err(|e| CacheError::Backend(format!("SET failed: {e}")))
    }
}
