//! Wire shapes for the review HTTP surface.

use serde::{Deserialize, Serialize};

use crate::application::moderation::{
    AppealAuditCommand, AppealCommand, ReplyCommand, ReviewAuditCommand,
};
use crate::domain::reviews::{
    AppealSubmission, Media, NewReview, ReplyRecord, ReviewRecord, ReviewScores,
};
use crate::domain::snapshot::ReviewSnapshot;
use crate::domain::types::{AppealStatus, ReviewStatus};

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub order_id: i64,
    pub user_id: i64,
    pub store_id: i64,
    #[serde(default)]
    pub sku_id: i64,
    #[serde(default)]
    pub spu_id: i64,
    pub score: i16,
    pub service_score: i16,
    pub express_score: i16,
    pub content: String,
    #[serde(default)]
    pub pic_info: String,
    #[serde(default)]
    pub video_info: String,
    #[serde(default)]
    pub anonymous: bool,
}

impl From<CreateReviewRequest> for NewReview {
    fn from(request: CreateReviewRequest) -> Self {
        NewReview {
            order_id: request.order_id,
            user_id: request.user_id,
            store_id: request.store_id,
            sku_id: request.sku_id,
            spu_id: request.spu_id,
            scores: ReviewScores {
                overall: request.score,
                service: request.service_score,
                express: request.express_score,
            },
            content: request.content,
            media: Media::new(request.pic_info, request.video_info),
            anonymous: request.anonymous,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub store_id: i64,
    pub content: String,
    #[serde(default)]
    pub pic_info: String,
    #[serde(default)]
    pub video_info: String,
}

impl ReplyRequest {
    pub fn into_command(self, review_id: i64) -> ReplyCommand {
        ReplyCommand {
            review_id,
            store_id: self.store_id,
            content: self.content,
            media: Media::new(self.pic_info, self.video_info),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AppealRequest {
    pub store_id: i64,
    pub reason: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub pic_info: String,
    #[serde(default)]
    pub video_info: String,
}

impl AppealRequest {
    pub fn into_command(self, review_id: i64) -> AppealCommand {
        AppealCommand {
            review_id,
            store_id: self.store_id,
            submission: AppealSubmission {
                reason: self.reason,
                content: self.content,
                media: Media::new(self.pic_info, self.video_info),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReviewAuditRequest {
    pub status: ReviewStatus,
    pub op_user: String,
    #[serde(default)]
    pub op_reason: Option<String>,
    #[serde(default)]
    pub op_remarks: Option<String>,
}

impl ReviewAuditRequest {
    pub fn into_command(self, review_id: i64) -> ReviewAuditCommand {
        ReviewAuditCommand {
            review_id,
            status: self.status,
            op_user: self.op_user,
            op_reason: self.op_reason,
            op_remarks: self.op_remarks,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AppealAuditRequest {
    pub review_id: i64,
    pub status: AppealStatus,
    pub op_user: String,
    #[serde(default)]
    pub op_remarks: Option<String>,
}

impl AppealAuditRequest {
    pub fn into_command(self, appeal_id: i64) -> AppealAuditCommand {
        AppealAuditCommand {
            appeal_id,
            review_id: self.review_id,
            status: self.status,
            op_user: self.op_user,
            op_remarks: self.op_remarks,
        }
    }
}

/// `page` and `size` are normalised by the listing config, so absent or
/// out-of-range values fall back instead of failing.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub size: Option<i64>,
}

impl PageQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1)
    }

    pub fn size(&self) -> i64 {
        self.size.unwrap_or(0)
    }
}

#[derive(Debug, Serialize)]
pub struct ReviewCreatedResponse {
    pub review_id: i64,
}

#[derive(Debug, Serialize)]
pub struct ReplyResponse {
    pub reply_id: i64,
    pub review_id: i64,
}

impl From<&ReplyRecord> for ReplyResponse {
    fn from(reply: &ReplyRecord) -> Self {
        Self {
            reply_id: reply.reply_id,
            review_id: reply.review_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AppealResponse {
    pub appeal_id: i64,
    pub review_id: i64,
}

#[derive(Debug, Serialize)]
pub struct UserReviewsResponse {
    pub user_id: i64,
    pub items: Vec<ReviewRecord>,
}

#[derive(Debug, Serialize)]
pub struct StoreReviewsResponse {
    pub store_id: i64,
    pub items: Vec<ReviewSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_defaults_optional_fields() {
        let request: CreateReviewRequest = serde_json::from_str(
            r#"{"order_id":1,"user_id":2,"store_id":3,"score":5,"service_score":4,"express_score":3,"content":"ok"}"#,
        )
        .unwrap();
        let review = NewReview::from(request);
        assert_eq!(review.scores.service, 4);
        assert!(review.media.is_empty());
        assert!(!review.anonymous);
    }

    #[test]
    fn audit_requests_take_status_codes() {
        let request: AppealAuditRequest =
            serde_json::from_str(r#"{"review_id":5,"status":20,"op_user":"ops"}"#).unwrap();
        let command = request.into_command(11);
        assert_eq!(command.appeal_id, 11);
        assert_eq!(command.status, AppealStatus::Approved);

        assert!(
            serde_json::from_str::<ReviewAuditRequest>(r#"{"status":25,"op_user":"ops"}"#)
                .is_err()
        );
    }

    #[test]
    fn missing_paging_falls_back_to_normalisation() {
        let query = PageQuery::default();
        assert_eq!(query.page(), 1);
        assert_eq!(query.size(), 0);
    }
}
