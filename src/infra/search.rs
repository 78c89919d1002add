//! Elasticsearch-compatible review index client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::application::repos::{ReviewSearch, SearchError};

use super::error::InfraError;

#[derive(Clone)]
pub struct ElasticReviewSearch {
    client: Client,
    search_url: String,
}

impl ElasticReviewSearch {
    pub fn new(base_url: &str, index: &str, timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("review-service/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::search(err.to_string()))?;
        Ok(Self {
            client,
            search_url: format!("{}/{index}/_search", base_url.trim_end_matches('/')),
        })
    }

    pub fn search_url(&self) -> &str {
        &self.search_url
    }
}

/// Exact store filter, offset pagination, no scoring.
pub fn store_query(store_id: i64, offset: u32, limit: u32) -> Value {
    json!({
        "from": offset,
        "size": limit,
        "query": {
            "bool": {
                "filter": [
                    { "term": { "store_id": store_id } }
                ]
            }
        }
    })
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Value,
}

/// Extracts the `hits` envelope from a search response body, re-encoded so
/// cached and fresh pages share one wire shape.
pub fn extract_hits(body: &[u8]) -> Result<Bytes, SearchError> {
    let response: SearchResponse =
        serde_json::from_slice(body).map_err(|err| SearchError::Malformed(err.to_string()))?;
    if !response.hits.is_object() {
        return Err(SearchError::Malformed(
            "`hits` is not an object".to_string(),
        ));
    }
    serde_json::to_vec(&response.hits)
        .map(Bytes::from)
        .map_err(|err| SearchError::Malformed(err.to_string()))
}

#[async_trait]
impl ReviewSearch for ElasticReviewSearch {
    async fn search_by_store(
        &self,
        store_id: i64,
        offset: u32,
        limit: u32,
    ) -> Result<Bytes, SearchError> {
        let response = self
            .client
            .post(&self.search_url)
            .json(&store_query(store_id, offset, limit))
            .send()
            .await
            .map_err(|err| SearchError::Unavailable(err.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| SearchError::Unavailable(err.to_string()))?;

        if status != StatusCode::OK {
            return Err(SearchError::Rejected {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        debug!(store_id, offset, limit, bytes = body.len(), "review search completed");
        extract_hits(&body)
    }
}
