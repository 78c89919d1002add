mod support;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use review_service::application::repos::CacheError;
use review_service::infra::http::build_router;

use support::{Harness, sample_document, sample_review};

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn review_can_be_created_and_fetched() {
    let harness = Harness::new();
    let router = build_router(harness.http_state());

    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/reviews",
        Some(json!({
            "order_id": 31,
            "user_id": 4,
            "store_id": 9,
            "score": 5,
            "service_score": 4,
            "express_score": 5,
            "content": "great"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let review_id = body["review_id"].as_i64().unwrap();

    let (status, body) = send(&router, Method::GET, &format!("/v1/reviews/{review_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order_id"], 31);
    assert_eq!(body["status"], 0);
    assert_eq!(body["has_reply"], false);

    let (status, body) = send(&router, Method::GET, "/v1/users/4/reviews", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_order_is_a_conflict() {
    let harness = Harness::new();
    harness.repo.seed_review(sample_review(1, 9, 4)).await;
    let router = build_router(harness.http_state());

    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/reviews",
        Some(json!({
            "order_id": 10,
            "user_id": 4,
            "store_id": 9,
            "score": 3,
            "service_score": 3,
            "express_score": 3,
            "content": "again"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "order_reviewed");
}

#[tokio::test]
async fn missing_review_maps_to_404() {
    let router = build_router(Harness::new().http_state());
    let (status, body) = send(&router, Method::GET, "/v1/reviews/123", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "not_found");
}

#[tokio::test]
async fn reply_flow_reports_conflicts_and_ownership() {
    let harness = Harness::new();
    harness.repo.seed_review(sample_review(77, 9, 1)).await;
    let router = build_router(harness.http_state());
    let body = json!({ "store_id": 9, "content": "thank you" });

    let (status, created) = send(
        &router,
        Method::POST,
        "/v1/reviews/77/reply",
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["review_id"], 77);

    let (status, again) = send(&router, Method::POST, "/v1/reviews/77/reply", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&again), "already_replied");

    harness.repo.seed_review(sample_review(78, 9, 1)).await;
    let (status, foreign) = send(
        &router,
        Method::POST,
        "/v1/reviews/78/reply",
        Some(json!({ "store_id": 10, "content": "not mine" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&foreign), "forbidden");
}

#[tokio::test]
async fn appeal_and_verdict_hide_the_review() {
    let harness = Harness::new();
    harness.repo.seed_review(sample_review(5, 9, 1)).await;
    let router = build_router(harness.http_state());

    let (status, filed) = send(
        &router,
        Method::POST,
        "/v1/reviews/5/appeal",
        Some(json!({ "store_id": 9, "reason": "fake review" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let appeal_id = filed["appeal_id"].as_i64().unwrap();

    let (status, _) = send(
        &router,
        Method::POST,
        &format!("/v1/appeals/{appeal_id}/audit"),
        Some(json!({ "review_id": 5, "status": 20, "op_user": "ops" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, review) = send(&router, Method::GET, "/v1/reviews/5", None).await;
    assert_eq!(review["status"], 40);

    let (status, frozen) = send(
        &router,
        Method::POST,
        "/v1/reviews/5/appeal",
        Some(json!({ "store_id": 9, "reason": "again" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&frozen), "already_audited");
}

#[tokio::test]
async fn review_audit_returns_no_content() {
    let harness = Harness::new();
    harness.repo.seed_review(sample_review(5, 9, 1)).await;
    let router = build_router(harness.http_state());

    let (status, _) = send(
        &router,
        Method::POST,
        "/v1/reviews/5/audit",
        Some(json!({ "status": 30, "op_user": "ops", "op_reason": "spam" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &router,
        Method::POST,
        "/v1/reviews/5/audit",
        Some(json!({ "status": 31, "op_user": "ops" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn store_listing_is_paged_and_cached() {
    let harness = Harness::new();
    harness
        .search
        .with_documents(500, (1..=12).map(|id| sample_document(id, 500)).collect());
    let router = build_router(harness.http_state());

    let (status, body) = send(&router, Method::GET, "/v1/stores/500/reviews?page=2&size=10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store_id"], 500);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["items"][0]["review_id"], 11);

    send(&router, Method::GET, "/v1/stores/500/reviews?page=2&size=10", None).await;
    assert_eq!(harness.search.calls(), 1);
    assert!(harness.cache.contains("review:500:10:10"));
}

#[tokio::test]
async fn cache_outage_is_service_unavailable() {
    let harness = Harness::new();
    harness
        .cache
        .fail_gets(Some(CacheError::Unavailable("connection refused".into())));
    let router = build_router(harness.http_state());

    let (status, body) = send(&router, Method::GET, "/v1/stores/500/reviews", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_code(&body), "cache_unavailable");
    assert_eq!(harness.search.calls(), 0);
}

#[tokio::test]
async fn health_without_database_is_ok() {
    let router = build_router(Harness::new().http_state());
    let (status, _) = send(&router, Method::GET, "/healthz", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn every_response_carries_a_request_id() {
    let router = build_router(Harness::new().http_state());
    let request = Request::builder()
        .uri("/v1/reviews/123")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let request_id = response.headers()["x-request-id"].to_str().unwrap();
    assert_eq!(request_id.len(), 36);
}
