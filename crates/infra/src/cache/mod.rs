//! Entitlement cache contract and backends.
//!
//! The cache maps a subject to the raw entitlement-service body last seen for
//! it. Expiry and memory limits are the backend's business; callers only ever
//! overwrite by key.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use in_memory::InMemoryEntitlementCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisEntitlementCache;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("entry of {size} bytes exceeds cache capacity of {capacity} bytes")]
    EntryTooLarge { size: usize, capacity: usize },

    #[error("cache backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait EntitlementCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError>;
}

#[async_trait]
impl<C> EntitlementCache for Arc<C>
where
    C: EntitlementCache + ?Sized,
{
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        (**self).set(key, value).await
    }
}
