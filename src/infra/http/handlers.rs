use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::error::ReviewError;
use crate::domain::reviews::NewReview;

use super::HttpState;
use super::error::{ApiError, review_to_api};
use super::models::{
    AppealAuditRequest, AppealRequest, AppealResponse, CreateReviewRequest, PageQuery,
    ReplyRequest, ReplyResponse, ReviewAuditRequest, ReviewCreatedResponse, StoreReviewsResponse,
    UserReviewsResponse,
};

pub async fn create_review(
    State(state): State<HttpState>,
    Json(payload): Json<CreateReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let review = state
        .reviews
        .create_review(NewReview::from(payload))
        .await
        .map_err(review_to_api)?;

    Ok((
        StatusCode::CREATED,
        Json(ReviewCreatedResponse {
            review_id: review.review_id,
        }),
    ))
}

pub async fn get_review(
    State(state): State<HttpState>,
    Path(review_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let review = state
        .reviews
        .get_review(review_id)
        .await
        .map_err(review_to_api)?;
    Ok(Json(review))
}

pub async fn list_user_reviews(
    State(state): State<HttpState>,
    Path(user_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .reviews
        .list_by_user(user_id, query.page(), query.size())
        .await
        .map_err(review_to_api)?;
    Ok(Json(UserReviewsResponse { user_id, items }))
}

pub async fn list_store_reviews(
    State(state): State<HttpState>,
    Path(store_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .listing
        .list_by_store(store_id, query.page(), query.size())
        .await
        .map_err(|err| review_to_api(ReviewError::from(err)))?;
    Ok(Json(StoreReviewsResponse { store_id, items }))
}

pub async fn submit_reply(
    State(state): State<HttpState>,
    Path(review_id): Path<i64>,
    Json(payload): Json<ReplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reply = state
        .moderation
        .submit_reply(payload.into_command(review_id))
        .await
        .map_err(review_to_api)?;
    Ok((StatusCode::CREATED, Json(ReplyResponse::from(&reply))))
}

pub async fn submit_appeal(
    State(state): State<HttpState>,
    Path(review_id): Path<i64>,
    Json(payload): Json<AppealRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let appeal = state
        .moderation
        .submit_appeal(payload.into_command(review_id))
        .await
        .map_err(review_to_api)?;
    Ok(Json(AppealResponse {
        appeal_id: appeal.appeal_id,
        review_id: appeal.review_id,
    }))
}

pub async fn audit_review(
    State(state): State<HttpState>,
    Path(review_id): Path<i64>,
    Json(payload): Json<ReviewAuditRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .moderation
        .audit_review(payload.into_command(review_id))
        .await
        .map_err(review_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn audit_appeal(
    State(state): State<HttpState>,
    Path(appeal_id): Path<i64>,
    Json(payload): Json<AppealAuditRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .moderation
        .audit_appeal(payload.into_command(appeal_id))
        .await
        .map_err(review_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}
