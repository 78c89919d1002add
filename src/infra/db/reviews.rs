use async_trait::async_trait;
use sqlx::{PgConnection, Postgres, QueryBuilder, Transaction};
use time::OffsetDateTime;

use crate::{
    application::repos::{
        AppealFields, AppealFilter, RepoError, ReviewFields, ReviewFilter, ReviewTransaction,
        ReviewsRepo, ReviewsWriteRepo, UserPage,
    },
    domain::reviews::{AppealRecord, Media, ReplyRecord, ReviewRecord, ReviewScores},
    domain::types::{AppealStatus, ReviewStatus},
};

use super::{PostgresRepositories, map_sqlx_error};

const REVIEW_COLUMNS: &str = "review_id, order_id, user_id, store_id, sku_id, spu_id, \
    score, service_score, express_score, content, pic_info, video_info, anonymous, \
    status, has_reply, op_user, op_reason, op_remarks, created_at, updated_at";

const APPEAL_COLUMNS: &str = "appeal_id, review_id, store_id, status, reason, content, \
    pic_info, video_info, op_user, op_remarks, created_at, updated_at";


#[derive(sqlx::FromRow)]
struct ReviewRow {
    review_id: i64,
    order_id: i64,
    user_id: i64,
    store_id: i64,
    sku_id: i64,
    spu_id: i64,
    score: i16,
    service_score: i16,
    express_score: i16,
    content: String,
    pic_info: String,
    video_info: String,
    anonymous: bool,
    status: i16,
    has_reply: bool,
    op_user: Option<String>,
    op_reason: Option<String>,
    op_remarks: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<ReviewRow> for ReviewRecord {
    type Error = RepoError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let status = ReviewStatus::try_from(row.status).map_err(integrity)?;
        Ok(Self {
            review_id: row.review_id,
            order_id: row.order_id,
            user_id: row.user_id,
            store_id: row.store_id,
            sku_id: row.sku_id,
            spu_id: row.spu_id,
            scores: ReviewScores {
                overall: row.score,
                service: row.service_score,
                express: row.express_score,
            },
            content: row.content,
            media: Media::new(row.pic_info, row.video_info),
            anonymous: row.anonymous,
            status,
            has_reply: row.has_reply,
            op_user: row.op_user,
            op_reason: row.op_reason,
            op_remarks: row.op_remarks,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AppealRow {
    appeal_id: i64,
    review_id: i64,
    store_id: i64,
    status: i16,
    reason: String,
    content: String,
    pic_info: String,
    video_info: String,
    op_user: Option<String>,
    op_remarks: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<AppealRow> for AppealRecord {
    type Error = RepoError;

    fn try_from(row: AppealRow) -> Result<Self, Self::Error> {
        let status = AppealStatus::try_from(row.status).map_err(integrity)?;
        Ok(Self {
            appeal_id: row.appeal_id,
            review_id: row.review_id,
            store_id: row.store_id,
            status,
            reason: row.reason,
            content: row.content,
            media: Media::new(row.pic_info, row.video_info),
            op_user: row.op_user,
            op_remarks: row.op_remarks,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn integrity(err: impl std::fmt::Display) -> RepoError {
    RepoError::Integrity {
        message: err.to_string(),
    }
}

#[async_trait]
impl ReviewsRepo for PostgresRepositories {
    async fn find_review(&self, review_id: i64) -> Result<Option<ReviewRecord>, RepoError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM review_info WHERE review_id = $1"
        ))
        .bind(review_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(ReviewRecord::try_from).transpose()
    }

    async fn find_reviews_by_order(&self, order_id: i64) -> Result<Vec<ReviewRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM review_info WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ReviewRecord::try_from).collect()
    }

    async fn list_reviews_by_user(&self, page: UserPage) -> Result<Vec<ReviewRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM review_info \
             WHERE user_id = $1 \
             ORDER BY created_at DESC, review_id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(page.user_id)
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ReviewRecord::try_from).collect()
    }

    async fn find_appeal_by_review(
        &self,
        review_id: i64,
    ) -> Result<Option<AppealRecord>, RepoError> {
        let row = sqlx::query_as::<_, AppealRow>(&format!(
            "SELECT {APPEAL_COLUMNS} FROM review_appeal_info WHERE review_id = $1"
        ))
        .bind(review_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(AppealRecord::try_from).transpose()
    }

    async fn find_appeal(&self, appeal_id: i64) -> Result<Option<AppealRecord>, RepoError> {
        let row = sqlx::query_as::<_, AppealRow>(&format!(
            "SELECT {APPEAL_COLUMNS} FROM review_appeal_info WHERE appeal_id = $1"
        ))
        .bind(appeal_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(AppealRecord::try_from).transpose()
    }
}

#[async_trait]
impl ReviewsWriteRepo for PostgresRepositories {
    async fn insert_review(&self, review: &ReviewRecord) -> Result<ReviewRecord, RepoError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "INSERT INTO review_info (review_id, order_id, user_id, store_id, sku_id, spu_id, \
                 score, service_score, express_score, content, pic_info, video_info, anonymous, \
                 has_media, has_reply, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
             RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(review.review_id)
        .bind(review.order_id)
        .bind(review.user_id)
        .bind(review.store_id)
        .bind(review.sku_id)
        .bind(review.spu_id)
        .bind(review.scores.overall)
        .bind(review.scores.service)
        .bind(review.scores.express)
        .bind(&review.content)
        .bind(&review.media.pic_info)
        .bind(&review.media.video_info)
        .bind(review.anonymous)
        .bind(review.has_media())
        .bind(review.has_reply)
        .bind(review.status.code())
        .bind(review.created_at)
        .bind(review.updated_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        ReviewRecord::try_from(row)
    }

    async fn upsert_appeal(
        &self,
        appeal: &AppealRecord,
    ) -> Result<Option<AppealRecord>, RepoError> {
        // The update branch leaves audited rows untouched and yields no row.
        let row = sqlx::query_as::<_, AppealRow>(&format!(
            "INSERT INTO review_appeal_info (appeal_id, review_id, store_id, status, reason, \
                 content, pic_info, video_info, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (review_id) DO UPDATE SET \
                 status = EXCLUDED.status, \
                 reason = EXCLUDED.reason, \
                 content = EXCLUDED.content, \
                 pic_info = EXCLUDED.pic_info, \
                 video_info = EXCLUDED.video_info, \
                 updated_at = EXCLUDED.updated_at \
             WHERE review_appeal_info.status <= $11 \
             RETURNING {APPEAL_COLUMNS}"
        ))
        .bind(appeal.appeal_id)
        .bind(appeal.review_id)
        .bind(appeal.store_id)
        .bind(appeal.status.code())
        .bind(&appeal.reason)
        .bind(&appeal.content)
        .bind(&appeal.media.pic_info)
        .bind(&appeal.media.video_info)
        .bind(appeal.created_at)
        .bind(appeal.updated_at)
        .bind(AppealStatus::Pending.code())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(AppealRecord::try_from).transpose()
    }

    async fn update_review(
        &self,
        filter: ReviewFilter,
        fields: &ReviewFields,
    ) -> Result<u64, RepoError> {
        let mut conn = self.pool().acquire().await.map_err(map_sqlx_error)?;
        execute_review_update(&mut *conn, filter, fields).await
    }

    async fn begin(&self) -> Result<Box<dyn ReviewTransaction>, RepoError> {
        let tx = PostgresRepositories::begin(self)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Box::new(PgReviewTransaction { tx }))
    }
}

/// Open Postgres transaction. Dropping it without `commit` rolls back.
pub struct PgReviewTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ReviewTransaction for PgReviewTransaction {
    async fn update_review(
        &mut self,
        filter: ReviewFilter,
        fields: &ReviewFields,
    ) -> Result<u64, RepoError> {
        execute_review_update(&mut *self.tx, filter, fields).await
    }

    async fn insert_reply(&mut self, reply: &ReplyRecord) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO review_reply_info (reply_id, review_id, store_id, content, pic_info, \
                 video_info, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(reply.reply_id)
        .bind(reply.review_id)
        .bind(reply.store_id)
        .bind(&reply.content)
        .bind(&reply.media.pic_info)
        .bind(&reply.media.video_info)
        .bind(reply.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update_appeal(
        &mut self,
        filter: AppealFilter,
        fields: &AppealFields,
    ) -> Result<u64, RepoError> {
        let mut qb =
            QueryBuilder::<Postgres>::new("UPDATE review_appeal_info SET updated_at = now()");
        if let Some(status) = fields.status {
            qb.push(", status = ").push_bind(status.code());
        }
        if let Some(op_user) = fields.op_user.clone() {
            qb.push(", op_user = ").push_bind(op_user);
        }
        if let Some(op_remarks) = fields.op_remarks.clone() {
            qb.push(", op_remarks = ").push_bind(op_remarks);
        }
        qb.push(" WHERE appeal_id = ")
            .push_bind(filter.appeal_id)
            .push(" AND review_id = ")
            .push_bind(filter.review_id);

        let result = qb
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }
}

async fn execute_review_update(
    conn: &mut PgConnection,
    filter: ReviewFilter,
    fields: &ReviewFields,
) -> Result<u64, RepoError> {
    if fields.is_empty() {
        return Err(RepoError::InvalidInput {
            message: "review update without fields".to_string(),
        });
    }

    let mut qb = QueryBuilder::<Postgres>::new("UPDATE review_info SET updated_at = now()");
    if let Some(has_reply) = fields.has_reply {
        qb.push(", has_reply = ").push_bind(has_reply);
    }
    if let Some(status) = fields.status {
        qb.push(", status = ").push_bind(status.code());
    }
    if let Some(op_user) = fields.op_user.clone() {
        qb.push(", op_user = ").push_bind(op_user);
    }
    if let Some(op_reason) = fields.op_reason.clone() {
        qb.push(", op_reason = ").push_bind(op_reason);
    }
    if let Some(op_remarks) = fields.op_remarks.clone() {
        qb.push(", op_remarks = ").push_bind(op_remarks);
    }
    qb.push(" WHERE review_id = ").push_bind(filter.review_id);
    if let Some(has_reply) = filter.has_reply {
        qb.push(" AND has_reply = ").push_bind(has_reply);
    }

    let result = qb
        .build()
        .execute(conn)
        .await
        .map_err(map_sqlx_error)?;
    Ok(result.rows_affected())
}
