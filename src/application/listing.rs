//! Read-through, coalesced store review listings.
//!
//! A page is identified by `(store_id, offset, limit)`. Concurrent requests for
//! the same page share one cache lookup and, on a definite miss, one search
//! query whose raw result is written back to the cache for a fixed TTL.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::coalesce::{CallAborted, RequestCoalescer};
use crate::application::repos::{CacheError, PageCache, ReviewSearch, SearchError};
use crate::domain::snapshot::ReviewSnapshot;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;

const KEY_PREFIX: &str = "review";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListingKey {
    pub store_id: i64,
    pub offset: u32,
    pub limit: u32,
}

impl ListingKey {
    pub fn new(store_id: i64, offset: u32, limit: u32) -> Self {
        Self {
            store_id,
            offset,
            limit,
        }
    }
}

impl fmt::Display for ListingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{KEY_PREFIX}:{}:{}:{}",
            self.store_id, self.offset, self.limit
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum ListingError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error("listing payload could not be decoded: {0}")]
    Payload(String),
    #[error("page {page} with size {size} is out of range")]
    PageOutOfRange { page: i64, size: u32 },
    #[error(transparent)]
    Aborted(#[from] CallAborted),
}

#[derive(Debug, Clone)]
pub struct ListingConfig {
    pub cache_ttl: Duration,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl ListingConfig {
    /// Converts a 1-based page request into `(offset, limit)`.
    ///
    /// Pages below 1 become 1; sizes outside `1..=max_page_size` fall back to
    /// the default size.
    pub fn window(&self, page: i64, size: i64) -> Result<(u32, u32), ListingError> {
        let page = page.max(1);
        let size = match u32::try_from(size) {
            Ok(size) if size > 0 && size <= self.max_page_size => size,
            _ => self.default_page_size,
        };
        let offset = (page - 1)
            .checked_mul(i64::from(size))
            .and_then(|offset| u32::try_from(offset).ok())
            .ok_or(ListingError::PageOutOfRange { page, size })?;
        Ok((offset, size))
    }
}

/// Store review listings served through the page cache.
pub struct ReviewListingService {
    cache: Arc<dyn PageCache>,
    search: Arc<dyn ReviewSearch>,
    coalescer: RequestCoalescer<ListingKey, Bytes, ListingError>,
    config: ListingConfig,
}

impl ReviewListingService {
    pub fn new(
        cache: Arc<dyn PageCache>,
        search: Arc<dyn ReviewSearch>,
        config: ListingConfig,
    ) -> Self {
        Self {
            cache,
            search,
            coalescer: RequestCoalescer::new(),
            config,
        }
    }

    pub fn config(&self) -> &ListingConfig {
        &self.config
    }

    /// Page-number entry point used by the transport layer.
    pub async fn list_by_store(
        &self,
        store_id: i64,
        page: i64,
        size: i64,
    ) -> Result<Vec<ReviewSnapshot>, ListingError> {
        let (offset, limit) = self.config.window(page, size)?;
        self.fetch_page(store_id, offset, limit).await
    }

    pub async fn fetch_page(
        &self,
        store_id: i64,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<ReviewSnapshot>, ListingError> {
        let key = ListingKey::new(store_id, offset, limit);
        let cache = Arc::clone(&self.cache);
        let search = Arc::clone(&self.search);
        let ttl = self.config.cache_ttl;

        let outcome = self
            .coalescer
            .run(key, move || load_page(cache, search, key, ttl))
            .await;

        if outcome.shared {
            counter!("review_listing_coalesced_total").increment(1);
            debug!(key = %key, "joined in-flight listing fetch");
        }

        let payload = outcome.result?;
        decode_page(&key, &payload)
    }

    pub fn in_flight(&self) -> usize {
        self.coalescer.in_flight()
    }
}

async fn load_page(
    cache: Arc<dyn PageCache>,
    search: Arc<dyn ReviewSearch>,
    key: ListingKey,
    ttl: Duration,
) -> Result<Bytes, ListingError> {
    match cache.get(&key).await {
        Ok(Some(payload)) => {
            counter!("review_listing_cache_hit_total").increment(1);
            debug!(key = %key, bytes = payload.len(), "listing cache hit");
            return Ok(payload);
        }
        Ok(None) => {
            counter!("review_listing_cache_miss_total").increment(1);
            debug!(key = %key, "listing cache miss");
        }
        Err(err) => {
            // A failing cache must not turn every request into an index query.
            counter!("review_listing_cache_error_total").increment(1);
            warn!(key = %key, error = %err, "listing cache read failed");
            return Err(ListingError::Cache(err));
        }
    }

    counter!("review_listing_search_total").increment(1);
    let payload = search
        .search_by_store(key.store_id, key.offset, key.limit)
        .await?;

    cache.set(&key, payload.clone(), ttl).await.map_err(|err| {
        warn!(key = %key, error = %err, "listing cache write failed");
        ListingError::Cache(err)
    })?;

    Ok(payload)
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "_source", default)]
    source: Option<serde_json::Value>,
}

/// Decodes a hits envelope. Individual documents that fail to decode are
/// dropped with a warning; only an unreadable envelope fails the page.
pub fn decode_page(key: &ListingKey, payload: &[u8]) -> Result<Vec<ReviewSnapshot>, ListingError> {
    let envelope: HitsEnvelope =
        serde_json::from_slice(payload).map_err(|err| ListingError::Payload(err.to_string()))?;

    let mut snapshots = Vec::with_capacity(envelope.hits.len());
    for (position, hit) in envelope.hits.into_iter().enumerate() {
        let Some(source) = hit.source else {
            counter!("review_listing_dropped_record_total").increment(1);
            warn!(key = %key, position, "search hit without source dropped");
            continue;
        };
        match serde_json::from_value::<ReviewSnapshot>(source) {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(err) => {
                counter!("review_listing_dropped_record_total").increment(1);
                warn!(key = %key, position, error = %err, "undecodable review record dropped");
            }
        }
    }
    Ok(snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format_is_colon_delimited() {
        assert_eq!(ListingKey::new(500, 0, 10).to_string(), "review:500:0:10");
        assert_eq!(ListingKey::new(-3, 40, 20).to_string(), "review:-3:40:20");
    }

    #[test]
    fn window_normalizes_page_and_size() {
        let config = ListingConfig::default();
        assert_eq!(config.window(1, 10).unwrap(), (0, 10));
        assert_eq!(config.window(3, 20).unwrap(), (40, 20));
        assert_eq!(config.window(0, 10).unwrap(), (0, 10));
        assert_eq!(config.window(-4, 10).unwrap(), (0, 10));
        assert_eq!(config.window(2, 0).unwrap(), (10, 10));
        assert_eq!(config.window(2, 51).unwrap(), (10, 10));
        assert_eq!(config.window(2, 50).unwrap(), (50, 50));
    }

    #[test]
    fn window_rejects_offsets_beyond_range() {
        let config = ListingConfig::default();
        assert!(matches!(
            config.window(i64::MAX, 50),
            Err(ListingError::PageOutOfRange { .. })
        ));
    }

    #[test]
    fn decode_drops_only_bad_records() {
        let payload = serde_json::json!({
            "total": { "value": 3, "relation": "eq" },
            "hits": [
                { "_source": { "review_id": "1", "store_id": "500" } },
                { "_source": { "store_id": "500", "content": "no id" } },
                { "_source": { "review_id": 3, "store_id": 500 } },
                { "_id": "no-source" }
            ]
        });
        let bytes = serde_json::to_vec(&payload).unwrap();
        let snapshots = decode_page(&ListingKey::new(500, 0, 10), &bytes).unwrap();
        let ids: Vec<i64> = snapshots.iter().map(|s| s.review_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn decode_fails_on_unreadable_envelope() {
        let err = decode_page(&ListingKey::new(1, 0, 10), b"not json").unwrap_err();
        assert!(matches!(err, ListingError::Payload(_)));
    }
}
