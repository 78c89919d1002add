//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use review_service::application::ids::IdGenerator;
use review_service::application::listing::{ListingConfig, ListingKey, ReviewListingService};
use review_service::application::moderation::ModerationService;
use review_service::application::repos::{
    AppealFields, AppealFilter, CacheError, PageCache, RepoError, ReviewFields, ReviewFilter,
    ReviewSearch, ReviewTransaction, ReviewsRepo, ReviewsWriteRepo, SearchError, UserPage,
};
use review_service::application::reviews::ReviewService;
use review_service::domain::reviews::{
    AppealRecord, Media, ReplyRecord, ReviewRecord, ReviewScores,
};
use review_service::domain::types::{AppealStatus, ReviewStatus};
use review_service::infra::cache::MemoryPageCache;
use review_service::infra::http::HttpState;

#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub reviews: HashMap<i64, ReviewRecord>,
    /// Keyed by review id; at most one reply per review.
    pub replies: HashMap<i64, ReplyRecord>,
    /// Keyed by review id; at most one appeal per review.
    pub appeals: HashMap<i64, AppealRecord>,
}

/// Review store with serialised transactions. A transaction works on a copy
/// of the tables and publishes it only on commit.
#[derive(Default)]
pub struct MemoryReviews {
    tables: Arc<Mutex<Tables>>,
    fail_tx_review_update: Arc<AtomicBool>,
    fail_tx_reply_insert: Arc<AtomicBool>,
    verdict_before_upsert: Arc<StdMutex<Option<AppealStatus>>>,
    commits: Arc<AtomicUsize>,
}

impl MemoryReviews {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_review(&self, review: ReviewRecord) {
        self.tables
            .lock()
            .await
            .reviews
            .insert(review.review_id, review);
    }

    pub async fn seed_appeal(&self, appeal: AppealRecord) {
        self.tables
            .lock()
            .await
            .appeals
            .insert(appeal.review_id, appeal);
    }

    pub async fn snapshot(&self) -> Tables {
        self.tables.lock().await.clone()
    }

    pub async fn review(&self, review_id: i64) -> Option<ReviewRecord> {
        self.tables.lock().await.reviews.get(&review_id).cloned()
    }

    pub async fn appeal(&self, review_id: i64) -> Option<AppealRecord> {
        self.tables.lock().await.appeals.get(&review_id).cloned()
    }

    pub async fn reply_count(&self, review_id: i64) -> usize {
        usize::from(self.tables.lock().await.replies.contains_key(&review_id))
    }

    /// Makes every review update issued inside a transaction fail.
    pub fn fail_transactional_review_updates(&self, fail: bool) {
        self.fail_tx_review_update.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reply_inserts(&self, fail: bool) {
        self.fail_tx_reply_insert.store(fail, Ordering::SeqCst);
    }

    /// Audits the stored appeal with `status` at the start of the next
    /// upsert, as a concurrent operator would after the caller's lookup.
    pub fn audit_before_next_upsert(&self, status: AppealStatus) {
        *self.verdict_before_upsert.lock().unwrap() = Some(status);
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

fn review_matches(review: &ReviewRecord, filter: ReviewFilter) -> bool {
    review.review_id == filter.review_id
        && filter
            .has_reply
            .is_none_or(|has_reply| review.has_reply == has_reply)
}

fn apply_review_update(tables: &mut Tables, filter: ReviewFilter, fields: &ReviewFields) -> u64 {
    let Some(review) = tables.reviews.get_mut(&filter.review_id) else {
        return 0;
    };
    if !review_matches(review, filter) {
        return 0;
    }
    if let Some(has_reply) = fields.has_reply {
        review.has_reply = has_reply;
    }
    if let Some(status) = fields.status {
        review.status = status;
    }
    if let Some(op_user) = &fields.op_user {
        review.op_user = Some(op_user.clone());
    }
    if let Some(op_reason) = &fields.op_reason {
        review.op_reason = Some(op_reason.clone());
    }
    if let Some(op_remarks) = &fields.op_remarks {
        review.op_remarks = Some(op_remarks.clone());
    }
    review.updated_at = OffsetDateTime::now_utc();
    1
}

#[async_trait]
impl ReviewsRepo for MemoryReviews {
    async fn find_review(&self, review_id: i64) -> Result<Option<ReviewRecord>, RepoError> {
        Ok(self.tables.lock().await.reviews.get(&review_id).cloned())
    }

    async fn find_reviews_by_order(&self, order_id: i64) -> Result<Vec<ReviewRecord>, RepoError> {
        Ok(self
            .tables
            .lock()
            .await
            .reviews
            .values()
            .filter(|review| review.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn list_reviews_by_user(&self, page: UserPage) -> Result<Vec<ReviewRecord>, RepoError> {
        let tables = self.tables.lock().await;
        let mut reviews: Vec<ReviewRecord> = tables
            .reviews
            .values()
            .filter(|review| review.user_id == page.user_id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.review_id.cmp(&a.review_id))
        });
        Ok(reviews
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn find_appeal_by_review(
        &self,
        review_id: i64,
    ) -> Result<Option<AppealRecord>, RepoError> {
        Ok(self.tables.lock().await.appeals.get(&review_id).cloned())
    }

    async fn find_appeal(&self, appeal_id: i64) -> Result<Option<AppealRecord>, RepoError> {
        Ok(self
            .tables
            .lock()
            .await
            .appeals
            .values()
            .find(|appeal| appeal.appeal_id == appeal_id)
            .cloned())
    }
}

#[async_trait]
impl ReviewsWriteRepo for MemoryReviews {
    async fn insert_review(&self, review: &ReviewRecord) -> Result<ReviewRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.reviews.contains_key(&review.review_id) {
            return Err(RepoError::Duplicate {
                constraint: "review_info_pkey".to_string(),
            });
        }
        if tables
            .reviews
            .values()
            .any(|existing| existing.order_id == review.order_id)
        {
            return Err(RepoError::Duplicate {
                constraint: "review_info_order_id_key".to_string(),
            });
        }
        tables.reviews.insert(review.review_id, review.clone());
        Ok(review.clone())
    }

    async fn upsert_appeal(
        &self,
        appeal: &AppealRecord,
    ) -> Result<Option<AppealRecord>, RepoError> {
        let mut tables = self.tables.lock().await;
        let verdict = self.verdict_before_upsert.lock().unwrap().take();
        if let (Some(status), Some(existing)) = (verdict, tables.appeals.get_mut(&appeal.review_id))
        {
            existing.status = status;
            existing.op_user = Some("ops-concurrent".to_string());
        }
        match tables.appeals.get_mut(&appeal.review_id) {
            Some(existing) if existing.status.is_audited() => Ok(None),
            Some(existing) => {
                existing.status = AppealStatus::Pending;
                existing.reason = appeal.reason.clone();
                existing.content = appeal.content.clone();
                existing.media = appeal.media.clone();
                existing.updated_at = appeal.updated_at;
                Ok(Some(existing.clone()))
            }
            None => {
                tables.appeals.insert(appeal.review_id, appeal.clone());
                Ok(Some(appeal.clone()))
            }
        }
    }

    async fn update_review(
        &self,
        filter: ReviewFilter,
        fields: &ReviewFields,
    ) -> Result<u64, RepoError> {
        let mut tables = self.tables.lock().await;
        Ok(apply_review_update(&mut tables, filter, fields))
    }

    async fn begin(&self) -> Result<Box<dyn ReviewTransaction>, RepoError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            working,
            fail_review_update: self.fail_tx_review_update.load(Ordering::SeqCst),
            fail_reply_insert: self.fail_tx_reply_insert.load(Ordering::SeqCst),
            commits: Arc::clone(&self.commits),
        }))
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    fail_review_update: bool,
    fail_reply_insert: bool,
    commits: Arc<AtomicUsize>,
}

#[async_trait]
impl ReviewTransaction for MemoryTransaction {
    async fn update_review(
        &mut self,
        filter: ReviewFilter,
        fields: &ReviewFields,
    ) -> Result<u64, RepoError> {
        if self.fail_review_update {
            return Err(RepoError::Persistence("injected review update failure".into()));
        }
        Ok(apply_review_update(&mut self.working, filter, fields))
    }

    async fn insert_reply(&mut self, reply: &ReplyRecord) -> Result<(), RepoError> {
        if self.fail_reply_insert {
            return Err(RepoError::Persistence("injected reply insert failure".into()));
        }
        if self.working.replies.contains_key(&reply.review_id) {
            return Err(RepoError::Duplicate {
                constraint: "review_reply_info_review_id_key".to_string(),
            });
        }
        self.working.replies.insert(reply.review_id, reply.clone());
        Ok(())
    }

    async fn update_appeal(
        &mut self,
        filter: AppealFilter,
        fields: &AppealFields,
    ) -> Result<u64, RepoError> {
        let Some(appeal) = self.working.appeals.get_mut(&filter.review_id) else {
            return Ok(0);
        };
        if appeal.appeal_id != filter.appeal_id {
            return Ok(0);
        }
        if let Some(status) = fields.status {
            appeal.status = status;
        }
        if let Some(op_user) = &fields.op_user {
            appeal.op_user = Some(op_user.clone());
        }
        if let Some(op_remarks) = &fields.op_remarks {
            appeal.op_remarks = Some(op_remarks.clone());
        }
        appeal.updated_at = OffsetDateTime::now_utc();
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        let MemoryTransaction {
            mut guard,
            working,
            commits,
            ..
        } = *self;
        *guard = working;
        commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct SequentialIds {
    next: AtomicI64,
}

impl SequentialIds {
    pub fn starting_at(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> i64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// Search backend serving canned documents per store and counting queries.
#[derive(Default)]
pub struct CountingSearch {
    documents: StdMutex<HashMap<i64, Vec<Value>>>,
    failure: StdMutex<Option<SearchError>>,
    delay: StdMutex<Duration>,
    calls: AtomicUsize,
}

impl CountingSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(&self, store_id: i64, documents: Vec<Value>) {
        self.documents
            .lock()
            .unwrap()
            .insert(store_id, documents);
    }

    pub fn with_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fail_with(&self, failure: Option<SearchError>) {
        *self.failure.lock().unwrap() = failure;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReviewSearch for CountingSearch {
    async fn search_by_store(
        &self,
        store_id: i64,
        offset: u32,
        limit: u32,
    ) -> Result<Bytes, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = self.failure.lock().unwrap().clone() {
            return Err(failure);
        }

        let documents = self
            .documents
            .lock()
            .unwrap()
            .get(&store_id)
            .cloned()
            .unwrap_or_default();
        let hits: Vec<Value> = documents
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|document| json!({ "_index": "review", "_source": document }))
            .collect();
        let envelope = json!({
            "total": { "value": documents.len(), "relation": "eq" },
            "hits": hits,
        });
        Ok(Bytes::from(serde_json::to_vec(&envelope).unwrap()))
    }
}

/// Memory cache with switchable read and write failures.
pub struct ScriptedCache {
    inner: MemoryPageCache,
    get_failure: StdMutex<Option<CacheError>>,
    set_failure: StdMutex<Option<CacheError>>,
    sets: AtomicUsize,
}

impl ScriptedCache {
    pub fn new() -> Self {
        Self {
            inner: MemoryPageCache::new(NonZeroUsize::new(256).unwrap()),
            get_failure: StdMutex::new(None),
            set_failure: StdMutex::new(None),
            sets: AtomicUsize::new(0),
        }
    }

    pub fn fail_gets(&self, failure: Option<CacheError>) {
        *self.get_failure.lock().unwrap() = failure;
    }

    pub fn fail_sets(&self, failure: Option<CacheError>) {
        *self.set_failure.lock().unwrap() = failure;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains(key)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageCache for ScriptedCache {
    async fn get(&self, key: &ListingKey) -> Result<Option<Bytes>, CacheError> {
        if let Some(failure) = self.get_failure.lock().unwrap().clone() {
            return Err(failure);
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &ListingKey, payload: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.set_failure.lock().unwrap().clone() {
            return Err(failure);
        }
        self.inner.set(key, payload, ttl).await
    }
}

pub fn sample_review(review_id: i64, store_id: i64, user_id: i64) -> ReviewRecord {
    let now = OffsetDateTime::now_utc();
    ReviewRecord {
        review_id,
        order_id: review_id * 10,
        user_id,
        store_id,
        sku_id: 1,
        spu_id: 1,
        scores: ReviewScores {
            overall: 4,
            service: 4,
            express: 5,
        },
        content: "solid product".to_string(),
        media: Media::default(),
        anonymous: false,
        status: ReviewStatus::Pending,
        has_reply: false,
        op_user: None,
        op_reason: None,
        op_remarks: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_document(review_id: i64, store_id: i64) -> Value {
    json!({
        "review_id": review_id.to_string(),
        "store_id": store_id.to_string(),
        "score": "5",
        "content": format!("review {review_id}"),
        "has_reply": 0,
        "status": 20,
        "create_at": "2023-12-17 20:03:54"
    })
}

pub struct Harness {
    pub repo: Arc<MemoryReviews>,
    pub search: Arc<CountingSearch>,
    pub cache: Arc<ScriptedCache>,
    pub reviews: Arc<ReviewService>,
    pub moderation: Arc<ModerationService>,
    pub listing: Arc<ReviewListingService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_listing_config(ListingConfig::default())
    }

    pub fn with_listing_config(config: ListingConfig) -> Self {
        let repo = Arc::new(MemoryReviews::new());
        let search = Arc::new(CountingSearch::new());
        let cache = Arc::new(ScriptedCache::new());
        let ids: Arc<dyn IdGenerator> = Arc::new(SequentialIds::starting_at(9_000));

        let reviews = Arc::new(ReviewService::new(
            repo.clone(),
            repo.clone(),
            ids.clone(),
            config.clone(),
        ));
        let moderation = Arc::new(ModerationService::new(repo.clone(), repo.clone(), ids));
        let listing = Arc::new(ReviewListingService::new(
            cache.clone(),
            search.clone(),
            config,
        ));

        Self {
            repo,
            search,
            cache,
            reviews,
            moderation,
            listing,
        }
    }

    pub fn http_state(&self) -> HttpState {
        HttpState {
            reviews: self.reviews.clone(),
            moderation: self.moderation.clone(),
            listing: self.listing.clone(),
            db: None,
        }
    }
}
