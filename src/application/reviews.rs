use std::sync::Arc;

use time::OffsetDateTime;
use tracing::info;

use crate::application::error::ReviewError;
use crate::application::ids::IdGenerator;
use crate::application::listing::ListingConfig;
use crate::application::repos::{RepoError, ReviewsRepo, ReviewsWriteRepo, UserPage};
use crate::domain::reviews::{NewReview, ReviewRecord};

/// Review intake and direct (uncached) lookups.
#[derive(Clone)]
pub struct ReviewService {
    reader: Arc<dyn ReviewsRepo>,
    writer: Arc<dyn ReviewsWriteRepo>,
    ids: Arc<dyn IdGenerator>,
    paging: ListingConfig,
}

impl ReviewService {
    pub fn new(
        reader: Arc<dyn ReviewsRepo>,
        writer: Arc<dyn ReviewsWriteRepo>,
        ids: Arc<dyn IdGenerator>,
        paging: ListingConfig,
    ) -> Self {
        Self {
            reader,
            writer,
            ids,
            paging,
        }
    }

    /// Stores a new pending review. Each order carries at most one review.
    pub async fn create_review(&self, review: NewReview) -> Result<ReviewRecord, ReviewError> {
        review.validate()?;

        let order_id = review.order_id;
        if !self.reader.find_reviews_by_order(order_id).await?.is_empty() {
            return Err(ReviewError::OrderReviewed { order_id });
        }

        let record = review.into_record(self.ids.next_id(), OffsetDateTime::now_utc());
        let stored = match self.writer.insert_review(&record).await {
            Ok(stored) => stored,
            Err(RepoError::Duplicate { .. }) => {
                return Err(ReviewError::OrderReviewed { order_id });
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            review_id = stored.review_id,
            order_id = stored.order_id,
            store_id = stored.store_id,
            "review created"
        );
        Ok(stored)
    }

    pub async fn get_review(&self, review_id: i64) -> Result<ReviewRecord, ReviewError> {
        self.reader
            .find_review(review_id)
            .await?
            .ok_or_else(|| ReviewError::not_found("review"))
    }

    /// Newest first, paged with the same normalisation as store listings.
    pub async fn list_by_user(
        &self,
        user_id: i64,
        page: i64,
        size: i64,
    ) -> Result<Vec<ReviewRecord>, ReviewError> {
        let (offset, limit) = self.paging.window(page, size)?;
        let reviews = self
            .reader
            .list_reviews_by_user(UserPage {
                user_id,
                offset,
                limit,
            })
            .await?;
        Ok(reviews)
    }
}
