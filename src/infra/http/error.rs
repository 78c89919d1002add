use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::{ErrorReport, ReviewError};
use crate::application::repos::{CacheError, RepoError, SearchError};

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const FORBIDDEN: &str = "forbidden";
    pub const NOT_FOUND: &str = "not_found";
    pub const ALREADY_REPLIED: &str = "already_replied";
    pub const ALREADY_AUDITED: &str = "already_audited";
    pub const ORDER_REVIEWED: &str = "order_reviewed";
    pub const CACHE_UNAVAILABLE: &str = "cache_unavailable";
    pub const SEARCH_UNAVAILABLE: &str = "search_unavailable";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const REPO: &str = "repo_error";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    report: Option<ErrorReport>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            report: None,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    fn with_report(mut self, report: ErrorReport) -> Self {
        self.report = Some(report);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = self.report.unwrap_or_else(|| {
            ErrorReport::from_message(
                "infra::http",
                self.status,
                format!(
                    "{}: {}",
                    self.code,
                    self.hint.as_deref().unwrap_or(self.message)
                ),
            )
        });
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}

fn repo_to_api(err: &RepoError) -> ApiError {
    match err {
        RepoError::Timeout => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "Database timeout",
            None,
        ),
        _ => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Persistence error",
            None,
        ),
    }
}

fn cache_to_api(err: &CacheError) -> ApiError {
    ApiError::new(
        StatusCode::SERVICE_UNAVAILABLE,
        codes::CACHE_UNAVAILABLE,
        "Listing cache unavailable",
        Some(err.to_string()),
    )
}

fn search_to_api(err: &SearchError) -> ApiError {
    ApiError::new(
        StatusCode::SERVICE_UNAVAILABLE,
        codes::SEARCH_UNAVAILABLE,
        "Review search unavailable",
        Some(err.to_string()),
    )
}

pub(crate) fn review_to_api(err: ReviewError) -> ApiError {
    let api = match &err {
        ReviewError::NotFound { entity } => ApiError::new(
            StatusCode::NOT_FOUND,
            codes::NOT_FOUND,
            "Resource not found",
            Some(format!("{entity} not found")),
        ),
        ReviewError::AlreadyReplied { .. } => ApiError::new(
            StatusCode::CONFLICT,
            codes::ALREADY_REPLIED,
            "Review already has a reply",
            None,
        ),
        ReviewError::Unauthorized { .. } => ApiError::new(
            StatusCode::FORBIDDEN,
            codes::FORBIDDEN,
            "Review belongs to another store",
            None,
        ),
        ReviewError::AlreadyAudited { .. } => ApiError::new(
            StatusCode::CONFLICT,
            codes::ALREADY_AUDITED,
            "Appeal has already been audited",
            None,
        ),
        ReviewError::OrderReviewed { .. } => ApiError::new(
            StatusCode::CONFLICT,
            codes::ORDER_REVIEWED,
            "Order already has a review",
            None,
        ),
        ReviewError::Validation(inner) => ApiError::bad_request(
            "Request could not be processed",
            Some(inner.to_string()),
        ),
        ReviewError::Cache(inner) => cache_to_api(inner),
        ReviewError::Search(inner) => search_to_api(inner),
        ReviewError::Payload(_) => ApiError::new(
            StatusCode::BAD_GATEWAY,
            codes::SEARCH_UNAVAILABLE,
            "Review search returned an unreadable page",
            None,
        ),
        ReviewError::Aborted(_) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL,
            "Unexpected error occurred",
            None,
        ),
        ReviewError::Transaction(inner) => repo_to_api(inner),
    };
    let report = ErrorReport::from_error("application::error::ReviewError", api.status, &err);
    api.with_report(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::DomainError;

    #[test]
    fn consistency_errors_map_to_stable_codes() {
        let cases = [
            (
                ReviewError::not_found("review"),
                StatusCode::NOT_FOUND,
                codes::NOT_FOUND,
            ),
            (
                ReviewError::AlreadyReplied { review_id: 1 },
                StatusCode::CONFLICT,
                codes::ALREADY_REPLIED,
            ),
            (
                ReviewError::Unauthorized {
                    review_id: 1,
                    store_id: 2,
                },
                StatusCode::FORBIDDEN,
                codes::FORBIDDEN,
            ),
            (
                ReviewError::AlreadyAudited { review_id: 1 },
                StatusCode::CONFLICT,
                codes::ALREADY_AUDITED,
            ),
            (
                ReviewError::OrderReviewed { order_id: 1 },
                StatusCode::CONFLICT,
                codes::ORDER_REVIEWED,
            ),
            (
                ReviewError::Validation(DomainError::validation("content", "empty")),
                StatusCode::BAD_REQUEST,
                codes::BAD_REQUEST,
            ),
            (
                ReviewError::Cache(CacheError::Timeout),
                StatusCode::SERVICE_UNAVAILABLE,
                codes::CACHE_UNAVAILABLE,
            ),
            (
                ReviewError::Search(SearchError::Unavailable("refused".into())),
                StatusCode::SERVICE_UNAVAILABLE,
                codes::SEARCH_UNAVAILABLE,
            ),
            (
                ReviewError::Transaction(RepoError::Persistence("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::REPO,
            ),
        ];

        for (err, status, code) in cases {
            let api = review_to_api(err);
            assert_eq!(api.status(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn responses_carry_an_error_report() {
        let response = review_to_api(ReviewError::AlreadyReplied { review_id: 77 }).into_response();
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.messages[0], "review 77 already has a reply");
    }
}
