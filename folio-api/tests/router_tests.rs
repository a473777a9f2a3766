//! HTTP surface tests driven through `tower::ServiceExt::oneshot`.

mod support;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use folio_api::constants::{
    EXPIRED_TOKEN_MESSAGE, GENERIC_ACCEPTED_MESSAGE, GENERIC_THROTTLE_MESSAGE,
    GENERIC_TOKEN_MESSAGE,
};
use folio_api::create_router;
use folio_core::TokenPurpose;
use folio_llm::ProviderRegistry;
use folio_test_utils::{DocumentId, EntityIdType, ScriptedGenerator};
use serde_json::{json, Value};
use support::{test_app, test_app_with, test_config, TestApp};
use tower::ServiceExt;

fn router(app: &TestApp) -> Router {
    create_router(app.state.clone())
}

async fn post_json(router: Router, path: &str, body: Value) -> (StatusCode, Option<String>, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "203.0.113.7")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, retry_after, body)
}

#[tokio::test]
async fn test_register_and_forgot_wording_is_identical() {
    let app = test_app();

    let (status, _, registered) = post_json(
        router(&app),
        "/api/v1/auth/register",
        json!({ "email": "known@example.edu", "password": "a-long-passphrase" }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(registered["message"], GENERIC_ACCEPTED_MESSAGE);

    let (status, _, duplicate) = post_json(
        router(&app),
        "/api/v1/auth/register",
        json!({ "email": "known@example.edu", "password": "a-long-passphrase" }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(duplicate, registered);

    let (known_status, _, known) = post_json(
        router(&app),
        "/api/v1/auth/password/forgot",
        json!({ "email": "known@example.edu" }),
    )
    .await;
    let (unknown_status, _, unknown) = post_json(
        router(&app),
        "/api/v1/auth/password/forgot",
        json!({ "email": "unknown@example.edu" }),
    )
    .await;
    assert_eq!(known_status, unknown_status);
    assert_eq!(known, unknown);
}

#[tokio::test]
async fn test_login_throttle_returns_429_with_retry_after() {
    let app = test_app();
    let attempts = app.state.config.folio.rate_limits.login.max_attempts;
    let body = json!({ "email": "someone@example.edu", "password": "not-the-password" });

    for _ in 0..attempts {
        let (status, _, _) = post_json(router(&app), "/api/v1/auth/login", body.clone()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, retry_after, denied) =
        post_json(router(&app), "/api/v1/auth/login", body).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let retry: u64 = retry_after.unwrap().parse().unwrap();
    assert!(retry >= 1);
    assert_eq!(denied["message"], GENERIC_THROTTLE_MESSAGE);
    assert_eq!(denied["details"]["retry_after_secs"], json!(retry));
}

#[tokio::test]
async fn test_bad_token_gets_generic_rejection() {
    let app = test_app();
    let (status, _, body) = post_json(
        router(&app),
        "/api/v1/auth/password/reset",
        json!({ "token": "not-a-real-token", "password": "a-long-passphrase" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], GENERIC_TOKEN_MESSAGE);
}

#[tokio::test]
async fn test_version_routes() {
    let app = test_app();
    let document_id = DocumentId::now_v7();
    let base = format!("/api/v1/documents/{}/versions", document_id);

    let (status, _, created) =
        post_json(router(&app), &base, json!({ "content": "First draft" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["version_number"], 1);

    let request = Request::builder()
        .uri(format!("{}/latest", base))
        .body(Body::empty())
        .unwrap();
    let response = router(&app).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder()
        .uri(format!("{}/7", base))
        .body(Body::empty())
        .unwrap();
    let response = router(&app).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_reports_providers() {
    let app = test_app();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = router(&app).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["status"].is_string());
}

#[tokio::test]
async fn test_expired_reset_token_is_reported_as_expired() {
    let app = test_app();
    let email = "expiring@example.edu";
    app.state
        .accounts
        .register(email, "a-long-passphrase")
        .await
        .unwrap();
    app.state.accounts.request_password_reset(email).await.unwrap();
    let secret = app
        .outbox
        .latest_secret(email, TokenPurpose::ResetPassword)
        .unwrap();

    let ttl = app.state.config.folio.tokens.reset_password_ttl;
    app.clock.advance(ttl + Duration::from_secs(1));

    let (status, _, body) = post_json(
        router(&app),
        "/api/v1/auth/password/reset",
        json!({ "token": secret, "password": "another-long-passphrase" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "TOKEN_EXPIRED");
    assert_eq!(body["message"], EXPIRED_TOKEN_MESSAGE);
}

fn generation_app(generator: ScriptedGenerator) -> TestApp {
    let mut registry = ProviderRegistry::with_default_scorer();
    registry.register_text_generator(Arc::new(generator));
    test_app_with(test_config(), registry)
}

fn five_sections() -> Value {
    let sections: Vec<Value> = (1..=5)
        .map(|i| {
            json!({
                "section_id": format!("s{}", i),
                "title": format!("Section {}", i),
                "context": "Thesis on coastal erosion",
            })
        })
        .collect();
    json!(sections)
}

#[tokio::test]
async fn test_generate_reports_each_section() {
    let app = generation_app(ScriptedGenerator::new().failing_titles(["Section 3"]));
    let path = format!("/api/v1/documents/{}/generate", DocumentId::now_v7());

    let (status, _, body) =
        post_json(router(&app), &path, json!({ "sections": five_sections() })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["succeeded"], 4);
    assert_eq!(body["failed"], 1);
    for i in [1, 2, 4, 5] {
        assert_eq!(body["outcomes"][format!("s{}", i)]["status"], "success");
    }
    assert_eq!(body["outcomes"]["s3"]["status"], "error");
}

#[tokio::test]
async fn test_generate_require_all_fails_whole_batch() {
    let app = generation_app(ScriptedGenerator::new().failing_titles(["Section 3"]));
    let document_id = DocumentId::now_v7();
    let path = format!("/api/v1/documents/{}/generate", document_id);

    let (status, _, body) = post_json(
        router(&app),
        &path,
        json!({
            "sections": five_sections(),
            "require_all": true,
            "persist_versions": true,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "UPSTREAM_FAILED");
    assert_eq!(body["details"]["failed"], 1);
    assert_eq!(body["details"]["total"], 5);
    assert!(app.state.versions.latest(document_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_similarity_route_scores_sources() {
    let app = test_app();
    let (status, _, body) = post_json(
        router(&app),
        "/api/v1/research/similarity",
        json!({
            "text": "Sea level rise accelerates coastal erosion",
            "sources": [
                { "label": "match", "text": "Sea level rise accelerates coastal erosion" },
                { "label": "unrelated", "text": "Medieval trade routes in the Baltic" },
            ],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let score = body["score"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&score));
    assert_eq!(body["matches"][0]["label"], "match");
    let top = body["matches"][0]["score"].as_f64().unwrap();
    let other = body["matches"][1]["score"].as_f64().unwrap();
    assert!(top > other);
}
