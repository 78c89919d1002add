pub mod error;
mod handlers;
mod middleware;
pub mod models;

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware as axum_middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use sqlx::Error as SqlxError;

use crate::application::error::ErrorReport;
use crate::application::listing::ReviewListingService;
use crate::application::moderation::ModerationService;
use crate::application::reviews::ReviewService;
use crate::infra::db::PostgresRepositories;

pub use middleware::{RequestContext, Subject};

#[derive(Clone)]
pub struct HttpState {
    pub reviews: Arc<ReviewService>,
    pub moderation: Arc<ModerationService>,
    pub listing: Arc<ReviewListingService>,
    /// Absent when the router runs without a database (tests, memory setups).
    pub db: Option<Arc<PostgresRepositories>>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/reviews", post(handlers::create_review))
        .route("/v1/reviews/{review_id}", get(handlers::get_review))
        .route("/v1/reviews/{review_id}/reply", post(handlers::submit_reply))
        .route(
            "/v1/reviews/{review_id}/appeal",
            post(handlers::submit_appeal),
        )
        .route("/v1/reviews/{review_id}/audit", post(handlers::audit_review))
        .route("/v1/appeals/{appeal_id}/audit", post(handlers::audit_appeal))
        .route(
            "/v1/users/{user_id}/reviews",
            get(handlers::list_user_reviews),
        )
        .route(
            "/v1/stores/{store_id}/reviews",
            get(handlers::list_store_reviews),
        )
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
        .with_state(state)
}

async fn healthz(State(state): State<HttpState>) -> Response {
    match state.db {
        Some(db) => db_health_response(db.health_check().await),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
