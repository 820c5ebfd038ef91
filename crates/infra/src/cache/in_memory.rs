use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use super::{CacheError, EntitlementCache};

pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_MAX_BYTES: usize = 64 * 1024 * 1024;

/// In-process entitlement cache with a TTL and a memory ceiling.
///
/// Entries are weighed as key plus value bytes and the total weight is held
/// under `max_bytes`. Expired entries are never returned. Eviction order is
/// moka's (TinyLFU), not insertion order.
#[derive(Clone)]
pub struct InMemoryEntitlementCache {
    entries: Cache<String, Vec<u8>>,
    ttl: Duration,
    max_bytes: usize,
}

impl core::fmt::Debug for InMemoryEntitlementCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryEntitlementCache")
            .field("ttl", &self.ttl)
            .field("max_bytes", &self.max_bytes)
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl InMemoryEntitlementCache {
    pub fn new(ttl: Duration, max_bytes: usize) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_bytes as u64)
            .weigher(|key: &String, value: &Vec<u8>| {
                u32::try_from(key.len() + value.len()).unwrap_or(u32::MAX)
            })
            .time_to_live(ttl)
            .build();
        Self {
            entries,
            ttl,
            max_bytes,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Weighted bytes (keys + values). Approximate until pending maintenance
    /// has run.
    pub fn used_bytes(&self) -> u64 {
        self.entries.weighted_size()
    }

    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply pending evictions and expirations so the counters are exact.
    pub async fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks().await;
    }
}

impl Default for InMemoryEntitlementCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_BYTES)
    }
}

#[async_trait]
impl EntitlementCache for InMemoryEntitlementCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.get(key).await)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        let size = key.len() + value.len();
        if size > self.max_bytes {
            return Err(CacheError::EntryTooLarge {
                size,
                capacity: self.max_bytes,
            });
        }
        self.entries.insert(key.to_string(), value).await;
        Ok(())
    }
}
