//! Collaborator traits consumed by the application services.
//!
//! The persistence side exposes single-statement reads and writes plus a
//! transaction handle; dropping a handle without calling `commit` rolls the
//! transaction back.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::application::listing::ListingKey;
use crate::domain::reviews::{AppealRecord, ReplyRecord, ReviewRecord};
use crate::domain::types::{AppealStatus, ReviewStatus};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Row filter for review updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewFilter {
    pub review_id: i64,
    /// When set, only rows whose reply flag currently equals this value match.
    pub has_reply: Option<bool>,
}

impl ReviewFilter {
    pub fn by_id(review_id: i64) -> Self {
        Self {
            review_id,
            has_reply: None,
        }
    }

    pub fn unreplied(review_id: i64) -> Self {
        Self {
            review_id,
            has_reply: Some(false),
        }
    }
}

/// Review columns that may be patched. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewFields {
    pub has_reply: Option<bool>,
    pub status: Option<ReviewStatus>,
    pub op_user: Option<String>,
    pub op_reason: Option<String>,
    pub op_remarks: Option<String>,
}

impl ReviewFields {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppealFilter {
    pub appeal_id: i64,
    pub review_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppealFields {
    pub status: Option<AppealStatus>,
    pub op_user: Option<String>,
    pub op_remarks: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserPage {
    pub user_id: i64,
    pub offset: u32,
    pub limit: u32,
}

#[async_trait]
pub trait ReviewsRepo: Send + Sync {
    async fn find_review(&self, review_id: i64) -> Result<Option<ReviewRecord>, RepoError>;

    async fn find_reviews_by_order(&self, order_id: i64) -> Result<Vec<ReviewRecord>, RepoError>;

    async fn list_reviews_by_user(&self, page: UserPage) -> Result<Vec<ReviewRecord>, RepoError>;

    async fn find_appeal_by_review(
        &self,
        review_id: i64,
    ) -> Result<Option<AppealRecord>, RepoError>;

    async fn find_appeal(&self, appeal_id: i64) -> Result<Option<AppealRecord>, RepoError>;
}

#[async_trait]
pub trait ReviewsWriteRepo: Send + Sync {
    async fn insert_review(&self, review: &ReviewRecord) -> Result<ReviewRecord, RepoError>;

    /// Insert keyed on `review_id`, or overwrite status, reason, content and
    /// media of the existing row while it is still pending. Returns `None`
    /// when the existing row is already audited and was left untouched.
    async fn upsert_appeal(&self, appeal: &AppealRecord)
    -> Result<Option<AppealRecord>, RepoError>;

    /// Single-statement review patch outside any transaction.
    async fn update_review(
        &self,
        filter: ReviewFilter,
        fields: &ReviewFields,
    ) -> Result<u64, RepoError>;

    async fn begin(&self) -> Result<Box<dyn ReviewTransaction>, RepoError>;
}

/// All-or-nothing unit of work. Uncommitted handles roll back on drop.
#[async_trait]
pub trait ReviewTransaction: Send {
    async fn update_review(
        &mut self,
        filter: ReviewFilter,
        fields: &ReviewFields,
    ) -> Result<u64, RepoError>;

    async fn insert_reply(&mut self, reply: &ReplyRecord) -> Result<(), RepoError>;

    async fn update_appeal(
        &mut self,
        filter: AppealFilter,
        fields: &AppealFields,
    ) -> Result<u64, RepoError>;

    async fn commit(self: Box<Self>) -> Result<(), RepoError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation timed out")]
    Timeout,
    #[error("cache command failed: {0}")]
    Command(String),
}

/// Key/value store holding serialized listing pages.
#[async_trait]
pub trait PageCache: Send + Sync {
    /// `Ok(None)` is a definite miss; any `Err` is a cache failure.
    async fn get(&self, key: &ListingKey) -> Result<Option<Bytes>, CacheError>;

    async fn set(&self, key: &ListingKey, payload: Bytes, ttl: Duration)
    -> Result<(), CacheError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("search backend unavailable: {0}")]
    Unavailable(String),
    #[error("search backend rejected query with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("search response malformed: {0}")]
    Malformed(String),
}

/// Exact-filter paginated search over review documents.
#[async_trait]
pub trait ReviewSearch: Send + Sync {
    /// Returns the raw hits envelope (`{"total": .., "hits": [..]}`) for
    /// `store_id = store_id` starting at `offset`, at most `limit` entries.
    async fn search_by_store(
        &self,
        store_id: i64,
        offset: u32,
        limit: u32,
    ) -> Result<Bytes, SearchError>;
}
