use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::Response;
use thiserror::Error;

use crate::application::coalesce::CallAborted;
use crate::application::listing::ListingError;
use crate::application::repos::{CacheError, RepoError, SearchError};
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Failures surfaced by the review write and query services.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("review {review_id} already has a reply")]
    AlreadyReplied { review_id: i64 },
    #[error("store {store_id} may not act on review {review_id}")]
    Unauthorized { review_id: i64, store_id: i64 },
    #[error("appeal for review {review_id} has already been audited")]
    AlreadyAudited { review_id: i64 },
    #[error("order {order_id} already has a review")]
    OrderReviewed { order_id: i64 },
    #[error(transparent)]
    Validation(DomainError),
    #[error(transparent)]
    Cache(CacheError),
    #[error(transparent)]
    Search(SearchError),
    #[error("listing payload could not be decoded: {0}")]
    Payload(String),
    #[error(transparent)]
    Aborted(CallAborted),
    #[error("transaction failed: {0}")]
    Transaction(#[from] RepoError),
}

impl ReviewError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation(DomainError::validation(field, message))
    }
}

impl From<DomainError> for ReviewError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::NotFound { entity } => Self::NotFound { entity },
            other => Self::Validation(other),
        }
    }
}

impl From<ListingError> for ReviewError {
    fn from(error: ListingError) -> Self {
        match error {
            ListingError::Cache(err) => Self::Cache(err),
            ListingError::Search(err) => Self::Search(err),
            ListingError::Payload(message) => Self::Payload(message),
            ListingError::Aborted(err) => Self::Aborted(err),
            err @ ListingError::PageOutOfRange { .. } => Self::validation("page", err.to_string()),
        }
    }
}

/// Process-level failure reported by the binary before exiting.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
