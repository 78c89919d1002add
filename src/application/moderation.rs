//! Reply, appeal and audit operations that keep a review and its dependent
//! reply and appeal rows consistent.
//!
//! Every multi-row change goes through a single repository transaction. The
//! service holds no locks of its own; conditional updates inside the
//! transaction catch concurrent writers that passed the same pre-checks.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::application::error::ReviewError;
use crate::application::ids::IdGenerator;
use crate::application::repos::{
    AppealFields, AppealFilter, RepoError, ReviewFields, ReviewFilter, ReviewsRepo,
    ReviewsWriteRepo,
};
use crate::domain::reviews::{
    AppealRecord, AppealSubmission, Media, ReplyRecord, ReplyRejection, ReviewRecord,
    validate_content,
};
use crate::domain::types::{AppealStatus, ReviewStatus};

#[derive(Debug, Clone)]
pub struct ReplyCommand {
    pub review_id: i64,
    pub store_id: i64,
    pub content: String,
    pub media: Media,
}

#[derive(Debug, Clone)]
pub struct AppealCommand {
    pub review_id: i64,
    pub store_id: i64,
    pub submission: AppealSubmission,
}

#[derive(Debug, Clone)]
pub struct ReviewAuditCommand {
    pub review_id: i64,
    pub status: ReviewStatus,
    pub op_user: String,
    pub op_reason: Option<String>,
    pub op_remarks: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppealAuditCommand {
    pub appeal_id: i64,
    pub review_id: i64,
    pub status: AppealStatus,
    pub op_user: String,
    pub op_remarks: Option<String>,
}

#[derive(Clone)]
pub struct ModerationService {
    reader: Arc<dyn ReviewsRepo>,
    writer: Arc<dyn ReviewsWriteRepo>,
    ids: Arc<dyn IdGenerator>,
}

impl ModerationService {
    pub fn new(
        reader: Arc<dyn ReviewsRepo>,
        writer: Arc<dyn ReviewsWriteRepo>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            reader,
            writer,
            ids,
        }
    }

    /// Attaches the single store reply to a review and flips its reply flag in
    /// the same transaction.
    pub async fn submit_reply(&self, command: ReplyCommand) -> Result<ReplyRecord, ReviewError> {
        validate_content("content", &command.content)?;

        let review = self.load_review(command.review_id).await?;
        match review.ensure_reply_allowed(command.store_id) {
            Ok(()) => {}
            Err(ReplyRejection::AlreadyReplied) => {
                return Err(ReviewError::AlreadyReplied {
                    review_id: review.review_id,
                });
            }
            Err(ReplyRejection::ForeignStore { owner_store_id }) => {
                return Err(foreign_store(
                    "submit_reply",
                    review.review_id,
                    command.store_id,
                    owner_store_id,
                ));
            }
        }

        let reply = ReplyRecord {
            reply_id: self.ids.next_id(),
            review_id: review.review_id,
            store_id: command.store_id,
            content: command.content,
            media: command.media,
            created_at: OffsetDateTime::now_utc(),
        };

        let mut tx = self
            .writer
            .begin()
            .await
            .map_err(|err| transaction_failed("submit_reply", err))?;

        let flipped = tx
            .update_review(
                ReviewFilter::unreplied(review.review_id),
                &ReviewFields {
                    has_reply: Some(true),
                    ..ReviewFields::default()
                },
            )
            .await
            .map_err(|err| transaction_failed("submit_reply", err))?;
        if flipped == 0 {
            // Another reply committed after the pre-check.
            return Err(ReviewError::AlreadyReplied {
                review_id: review.review_id,
            });
        }

        match tx.insert_reply(&reply).await {
            Ok(()) => {}
            Err(RepoError::Duplicate { .. }) => {
                return Err(ReviewError::AlreadyReplied {
                    review_id: review.review_id,
                });
            }
            Err(err) => return Err(transaction_failed("submit_reply", err)),
        }

        tx.commit()
            .await
            .map_err(|err| transaction_failed("submit_reply", err))?;

        info!(
            review_id = reply.review_id,
            reply_id = reply.reply_id,
            store_id = reply.store_id,
            "review reply stored"
        );
        Ok(reply)
    }

    /// Creates the appeal for a review, or overwrites the pending one in place.
    /// The appeal id stays stable across resubmissions.
    pub async fn submit_appeal(
        &self,
        command: AppealCommand,
    ) -> Result<AppealRecord, ReviewError> {
        command.submission.validate()?;

        let review = self.load_review(command.review_id).await?;
        if review.store_id != command.store_id {
            return Err(foreign_store(
                "submit_appeal",
                review.review_id,
                command.store_id,
                review.store_id,
            ));
        }

        let existing = self.reader.find_appeal_by_review(review.review_id).await?;
        if existing.as_ref().is_some_and(AppealRecord::is_audited) {
            return Err(ReviewError::AlreadyAudited {
                review_id: review.review_id,
            });
        }

        let appeal_id = match &existing {
            Some(appeal) => appeal.appeal_id,
            None => self.ids.next_id(),
        };
        let record = AppealRecord::pending(
            appeal_id,
            review.review_id,
            command.store_id,
            command.submission,
            OffsetDateTime::now_utc(),
        );

        match self.writer.upsert_appeal(&record).await? {
            Some(saved) => {
                info!(
                    review_id = saved.review_id,
                    appeal_id = saved.appeal_id,
                    resubmission = existing.is_some(),
                    "review appeal stored"
                );
                Ok(saved)
            }
            // Audited between the lookup and the upsert.
            None => Err(ReviewError::AlreadyAudited {
                review_id: review.review_id,
            }),
        }
    }

    pub async fn audit_review(&self, command: ReviewAuditCommand) -> Result<(), ReviewError> {
        validate_content("op_user", &command.op_user)?;

        let fields = ReviewFields {
            status: Some(command.status),
            op_user: Some(command.op_user),
            op_reason: command.op_reason,
            op_remarks: command.op_remarks,
            ..ReviewFields::default()
        };
        let updated = self
            .writer
            .update_review(ReviewFilter::by_id(command.review_id), &fields)
            .await?;
        if updated == 0 {
            return Err(ReviewError::not_found("review"));
        }

        info!(
            review_id = command.review_id,
            status = command.status.as_str(),
            "review audited"
        );
        Ok(())
    }

    /// Records an appeal verdict. Approval hides the review in the same
    /// transaction; either both rows change or neither does. The review's own
    /// audit fields are left as the last review audit wrote them.
    pub async fn audit_appeal(&self, command: AppealAuditCommand) -> Result<(), ReviewError> {
        validate_content("op_user", &command.op_user)?;
        if !command.status.is_audited() {
            return Err(ReviewError::validation(
                "status",
                "appeal verdict must be approved or rejected",
            ));
        }

        let appeal = self
            .reader
            .find_appeal(command.appeal_id)
            .await?
            .ok_or_else(|| ReviewError::not_found("appeal"))?;
        if appeal.review_id != command.review_id {
            warn!(
                appeal_id = appeal.appeal_id,
                review_id = command.review_id,
                appeal_review_id = appeal.review_id,
                "appeal verdict names a review the appeal does not belong to"
            );
            return Err(ReviewError::not_found("review"));
        }

        let mut tx = self
            .writer
            .begin()
            .await
            .map_err(|err| transaction_failed("audit_appeal", err))?;

        let updated = tx
            .update_appeal(
                AppealFilter {
                    appeal_id: command.appeal_id,
                    review_id: command.review_id,
                },
                &AppealFields {
                    status: Some(command.status),
                    op_user: Some(command.op_user),
                    op_remarks: command.op_remarks,
                },
            )
            .await
            .map_err(|err| transaction_failed("audit_appeal", err))?;
        if updated == 0 {
            return Err(ReviewError::not_found("appeal"));
        }

        if command.status == AppealStatus::Approved {
            let hidden = tx
                .update_review(
                    ReviewFilter::by_id(command.review_id),
                    &ReviewFields {
                        status: Some(ReviewStatus::Hidden),
                        ..ReviewFields::default()
                    },
                )
                .await
                .map_err(|err| transaction_failed("audit_appeal", err))?;
            if hidden == 0 {
                return Err(ReviewError::not_found("review"));
            }
        }

        tx.commit()
            .await
            .map_err(|err| transaction_failed("audit_appeal", err))?;

        info!(
            appeal_id = command.appeal_id,
            review_id = command.review_id,
            status = command.status.as_str(),
            "review appeal audited"
        );
        Ok(())
    }

    async fn load_review(&self, review_id: i64) -> Result<ReviewRecord, ReviewError> {
        self.reader
            .find_review(review_id)
            .await?
            .ok_or_else(|| ReviewError::not_found("review"))
    }
}

fn foreign_store(
    operation: &'static str,
    review_id: i64,
    store_id: i64,
    owner_store_id: i64,
) -> ReviewError {
    warn!(
        security_event = true,
        operation,
        review_id,
        store_id,
        owner_store_id,
        "store attempted to act on a review it does not own"
    );
    ReviewError::Unauthorized {
        review_id,
        store_id,
    }
}

fn transaction_failed(operation: &'static str, err: RepoError) -> ReviewError {
    error!(operation, error = %err, "review transaction failed");
    ReviewError::Transaction(err)
}
