//! Page cache adapters: Redis for deployments, a bounded in-process LRU for
//! single-node setups and tests.

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};
use tokio::time::{Instant, timeout};
use tracing::debug;

use crate::application::listing::ListingKey;
use crate::application::repos::{CacheError, PageCache};

use super::error::InfraError;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "infra::cache";

#[derive(Clone)]
pub struct RedisPageCache {
    manager: ConnectionManager,
    timeout: Duration,
}

impl RedisPageCache {
    pub async fn connect(redis_url: &str, timeout: Duration) -> Result<Self, InfraError> {
        let client =
            redis::Client::open(redis_url).map_err(|err| InfraError::cache(err.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| InfraError::cache(err.to_string()))?;
        Ok(Self { manager, timeout })
    }

    fn ttl_seconds(ttl: Duration) -> u64 {
        ttl.as_secs().max(1)
    }
}

fn map_redis_error(err: RedisError) -> CacheError {
    if err.is_timeout() {
        CacheError::Timeout
    } else if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
        CacheError::Unavailable(err.to_string())
    } else {
        CacheError::Command(err.to_string())
    }
}

#[async_trait]
impl PageCache for RedisPageCache {
    async fn get(&self, key: &ListingKey) -> Result<Option<Bytes>, CacheError> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = timeout(self.timeout, conn.get(key.to_string()))
            .await
            .map_err(|_| CacheError::Timeout)?
            .map_err(map_redis_error)?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &ListingKey, payload: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let seconds = Self::ttl_seconds(ttl);
        let _: () = timeout(
            self.timeout,
            conn.set_ex(key.to_string(), payload.as_ref(), seconds),
        )
        .await
        .map_err(|_| CacheError::Timeout)?
        .map_err(map_redis_error)?;
        Ok(())
    }
}

struct MemoryEntry {
    payload: Bytes,
    expires_at: Instant,
}

/// In-process LRU keyed like the Redis cache. Holds at most `capacity` pages;
/// expiry follows the tokio clock, so paused-time tests can advance past it.
pub struct MemoryPageCache {
    entries: RwLock<LruCache<String, MemoryEntry>>,
}

impl MemoryPageCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        rw_read(&self.entries, SOURCE, "capacity").cap().get()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "contains")
            .peek(key)
            .is_some_and(|entry| entry.expires_at > now)
    }
}

#[async_trait]
impl PageCache for MemoryPageCache {
    async fn get(&self, key: &ListingKey) -> Result<Option<Bytes>, CacheError> {
        let cache_key = key.to_string();
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let lookup = entries
            .get(&cache_key)
            .map(|entry| (entry.expires_at > now).then(|| entry.payload.clone()));
        match lookup {
            Some(Some(payload)) => Ok(Some(payload)),
            Some(None) => {
                entries.pop(&cache_key);
                debug!(key = %cache_key, "expired listing entry evicted");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &ListingKey, payload: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let entry = MemoryEntry {
            payload,
            expires_at: Instant::now() + ttl,
        };
        let cache_key = key.to_string();
        let evicted = rw_write(&self.entries, SOURCE, "set").push(cache_key.clone(), entry);
        match evicted {
            Some((evicted_key, _)) if evicted_key != cache_key => {
                debug!(key = %evicted_key, "listing entry evicted at capacity");
            }
            _ => {}
        }
        Ok(())
    }
}
