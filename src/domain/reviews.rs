//! Review, reply and appeal records plus the invariants that guard them.

use serde::Serialize;
use time::OffsetDateTime;

use super::error::DomainError;
use super::types::{AppealStatus, ReviewStatus};

pub const MIN_SCORE: i16 = 1;
pub const MAX_SCORE: i16 = 5;
pub const MAX_CONTENT_CHARS: usize = 255;

/// Picture and video references attached to reviews, replies and appeals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Media {
    pub pic_info: String,
    pub video_info: String,
}

impl Media {
    pub fn new(pic_info: impl Into<String>, video_info: impl Into<String>) -> Self {
        Self {
            pic_info: pic_info.into(),
            video_info: video_info.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pic_info.trim().is_empty() && self.video_info.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewScores {
    pub overall: i16,
    pub service: i16,
    pub express: i16,
}

impl ReviewScores {
    fn validate(&self) -> Result<(), DomainError> {
        for (field, value) in [
            ("score", self.overall),
            ("service_score", self.service),
            ("express_score", self.express),
        ] {
            if !(MIN_SCORE..=MAX_SCORE).contains(&value) {
                return Err(DomainError::validation(
                    field,
                    format!("must be between {MIN_SCORE} and {MAX_SCORE}, got {value}"),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewRecord {
    pub review_id: i64,
    pub order_id: i64,
    pub user_id: i64,
    pub store_id: i64,
    pub sku_id: i64,
    pub spu_id: i64,
    pub scores: ReviewScores,
    pub content: String,
    pub media: Media,
    pub anonymous: bool,
    pub status: ReviewStatus,
    pub has_reply: bool,
    pub op_user: Option<String>,
    pub op_reason: Option<String>,
    pub op_remarks: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ReviewRecord {
    /// Checks that `store_id` may attach a reply to this review. The reply
    /// flag is checked before ownership.
    pub fn ensure_reply_allowed(&self, store_id: i64) -> Result<(), ReplyRejection> {
        if self.has_reply {
            return Err(ReplyRejection::AlreadyReplied);
        }
        if self.store_id != store_id {
            return Err(ReplyRejection::ForeignStore {
                owner_store_id: self.store_id,
            });
        }
        Ok(())
    }

    pub fn has_media(&self) -> bool {
        !self.media.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyRejection {
    AlreadyReplied,
    ForeignStore { owner_store_id: i64 },
}

/// Input for a freshly submitted review, before an id is assigned.
#[derive(Debug, Clone)]
pub struct NewReview {
    pub order_id: i64,
    pub user_id: i64,
    pub store_id: i64,
    pub sku_id: i64,
    pub spu_id: i64,
    pub scores: ReviewScores,
    pub content: String,
    pub media: Media,
    pub anonymous: bool,
}

impl NewReview {
    pub fn validate(&self) -> Result<(), DomainError> {
        self.scores.validate()?;
        validate_content("content", &self.content)?;
        for (field, value) in [
            ("order_id", self.order_id),
            ("user_id", self.user_id),
            ("store_id", self.store_id),
        ] {
            if value <= 0 {
                return Err(DomainError::validation(field, "must be a positive id"));
            }
        }
        Ok(())
    }

    pub fn into_record(self, review_id: i64, now: OffsetDateTime) -> ReviewRecord {
        ReviewRecord {
            review_id,
            order_id: self.order_id,
            user_id: self.user_id,
            store_id: self.store_id,
            sku_id: self.sku_id,
            spu_id: self.spu_id,
            scores: self.scores,
            content: self.content,
            media: self.media,
            anonymous: self.anonymous,
            status: ReviewStatus::Pending,
            has_reply: false,
            op_user: None,
            op_reason: None,
            op_remarks: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyRecord {
    pub reply_id: i64,
    pub review_id: i64,
    pub store_id: i64,
    pub content: String,
    pub media: Media,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppealRecord {
    pub appeal_id: i64,
    pub review_id: i64,
    pub store_id: i64,
    pub status: AppealStatus,
    pub reason: String,
    pub content: String,
    pub media: Media,
    pub op_user: Option<String>,
    pub op_remarks: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl AppealRecord {
    /// A pending appeal with the given identity; used for both first
    /// submission and resubmission.
    pub fn pending(
        appeal_id: i64,
        review_id: i64,
        store_id: i64,
        submission: AppealSubmission,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            appeal_id,
            review_id,
            store_id,
            status: AppealStatus::Pending,
            reason: submission.reason,
            content: submission.content,
            media: submission.media,
            op_user: None,
            op_remarks: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_audited(&self) -> bool {
        self.status.is_audited()
    }
}

/// Mutable part of an appeal, overwritten on resubmission.
#[derive(Debug, Clone)]
pub struct AppealSubmission {
    pub reason: String,
    pub content: String,
    pub media: Media,
}

impl AppealSubmission {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_content("reason", &self.reason)?;
        if self.content.chars().count() > MAX_CONTENT_CHARS {
            return Err(DomainError::validation(
                "content",
                format!("must be at most {MAX_CONTENT_CHARS} characters"),
            ));
        }
        Ok(())
    }
}

pub fn validate_content(field: &'static str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(field, "must not be empty"));
    }
    if value.chars().count() > MAX_CONTENT_CHARS {
        return Err(DomainError::validation(
            field,
            format!("must be at most {MAX_CONTENT_CHARS} characters"),
        ));
    }
    Ok(())
}
