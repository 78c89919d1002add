use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

const LOG_TARGET: &str = "review_service::http::response";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Entity a request addresses, read from `/v1/{collection}/{id}/...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject {
    pub kind: &'static str,
    pub id: i64,
}

impl Subject {
    fn from_path(path: &str) -> Option<Self> {
        let mut segments = path.trim_start_matches('/').split('/');
        if segments.next() != Some("v1") {
            return None;
        }
        let kind = match segments.next()? {
            "reviews" => "review",
            "appeals" => "appeal",
            "stores" => "store",
            "users" => "user",
            _ => return None,
        };
        let id = segments.next()?.parse().ok()?;
        Some(Self { kind, id })
    }
}

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub subject: Option<Subject>,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext {
        request_id: Uuid::new_v4().to_string(),
        subject: Subject::from_path(request.uri().path()),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response.extensions_mut().insert(ctx);
    response
}

/// Logs failed requests with the `ErrorReport` attached by the handler and the
/// entity the path named. Server errors go to `error`, client errors to `warn`.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let (request_id, subject) = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| (ctx.request_id.clone(), ctx.subject))
        .unwrap_or_default();
    let start = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    let elapsed_ms = start.elapsed().as_millis();
    let (source, messages) = match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => (report.source, report.messages),
        None => ("unknown", Vec::new()),
    };
    let detail = messages
        .first()
        .map(String::as_str)
        .unwrap_or("no diagnostic available");
    let subject_kind = subject.map(|subject| subject.kind).unwrap_or("none");
    let subject_id = subject.map(|subject| subject.id);

    if status.is_server_error() {
        error!(
            target: LOG_TARGET,
            status = status.as_u16(),
            method = %method,
            route = %route,
            path = %path,
            subject = subject_kind,
            subject_id,
            elapsed_ms,
            source,
            detail,
            chain = ?messages,
            request_id = %request_id,
            "review request failed",
        );
    } else {
        warn!(
            target: LOG_TARGET,
            status = status.as_u16(),
            method = %method,
            route = %route,
            path = %path,
            subject = subject_kind,
            subject_id,
            elapsed_ms,
            source,
            detail,
            request_id = %request_id,
            "review request rejected",
        );
    }

    response
}
