//! Fixed-window rate limiting driven through the full endpoint.

use std::time::Duration;

use axum::{
    body::to_bytes,
    http::StatusCode,
    response::Response,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use spb_core::{Clock, RequestResult};
use spb_testing::{fixtures, TestEnv};
use tower::ServiceExt;

async fn read_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("failed to read body");
    serde_json::from_slice(&bytes).expect("body is not valid JSON")
}

#[tokio::test]
async fn requests_over_the_limit_are_rejected() {
    let mut env = TestEnv::new().await.expect("failed to create test environment");
    env.config.rate_limit_per_hour = 2;
    let issued = env.issue_credential("robot").await.expect("failed to issue credential");
    let app = env.router();

    for _ in 0..2 {
        let request =
            fixtures::api_key_request(&issued.key, &issued.secret, &fixtures::pages_body(&["Hi"]));
        let response = app.clone().oneshot(request).await.expect("request failed");
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let request =
        fixtures::api_key_request(&issued.key, &issued.secret, &fixtures::pages_body(&["Hi"]));
    let response = app.oneshot(request).await.expect("request failed");

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], "rate_limited");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Rate limit exceeded. Try again after "));
}

#[tokio::test]
async fn rejection_carries_the_reset_time() {
    let mut env = TestEnv::new().await.expect("failed to create test environment");
    env.config.rate_limit_per_hour = 1;
    let issued = env.issue_credential("robot").await.expect("failed to issue credential");
    let app = env.router();

    let request =
        fixtures::api_key_request(&issued.key, &issued.secret, &fixtures::pages_body(&["Hi"]));
    app.clone().oneshot(request).await.expect("request failed");

    let request =
        fixtures::api_key_request(&issued.key, &issued.secret, &fixtures::pages_body(&["Hi"]));
    let response = app.oneshot(request).await.expect("request failed");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let body = read_json(response).await;
    let message = body["error"]["message"].as_str().unwrap().to_owned();
    let timestamp = message.rsplit("after ").next().expect("message carries no timestamp");
    let reset_at = DateTime::parse_from_rfc3339(timestamp).expect("reset time is not RFC 3339");

    assert!(
        reset_at.with_timezone(&Utc) > env.clock.now_utc(),
        "reset time must lie in the future"
    );
}

#[tokio::test]
async fn denied_requests_do_not_create_pages() {
    let mut env = TestEnv::new().await.expect("failed to create test environment");
    env.config.rate_limit_per_hour = 1;
    let issued = env.issue_credential("robot").await.expect("failed to issue credential");
    let app = env.router();

    for _ in 0..2 {
        let request =
            fixtures::api_key_request(&issued.key, &issued.secret, &fixtures::pages_body(&["Hi"]));
        app.clone().oneshot(request).await.expect("request failed");
    }

    let count = env.storage.pages.count().await.expect("page count failed");
    assert_eq!(count, 1, "the denied request must not create a page");

    let denied = env
        .storage
        .audit_log
        .count_by_result(RequestResult::RateLimited)
        .await
        .expect("audit query failed");
    assert_eq!(denied, 1);

    let entries = env.storage.audit_log.recent(1).await.expect("audit query failed");
    assert_eq!(entries[0].status_code, 429);
    assert_eq!(entries[0].credential_id, Some(issued.credential.id));
}

#[tokio::test]
async fn windows_are_per_credential() {
    let mut env = TestEnv::new().await.expect("failed to create test environment");
    env.config.rate_limit_per_hour = 1;
    let first = env.issue_credential("first-robot").await.expect("failed to issue credential");
    let second = env.issue_credential("second-robot").await.expect("failed to issue credential");
    let app = env.router();

    let request =
        fixtures::api_key_request(&first.key, &first.secret, &fixtures::pages_body(&["Hi"]));
    let response = app.clone().oneshot(request).await.expect("request failed");
    assert_eq!(response.status(), StatusCode::CREATED);

    // The first credential's spent window must not affect the second.
    let request =
        fixtures::api_key_request(&second.key, &second.secret, &fixtures::pages_body(&["Hi"]));
    let response = app.oneshot(request).await.expect("request failed");
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn the_window_resets_after_an_hour() {
    let mut env = TestEnv::new().await.expect("failed to create test environment");
    env.config.rate_limit_per_hour = 1;
    let issued = env.issue_credential("robot").await.expect("failed to issue credential");
    let app = env.router();

    let request =
        fixtures::api_key_request(&issued.key, &issued.secret, &fixtures::pages_body(&["Hi"]));
    let response = app.clone().oneshot(request).await.expect("request failed");
    assert_eq!(response.status(), StatusCode::CREATED);

    let request =
        fixtures::api_key_request(&issued.key, &issued.secret, &fixtures::pages_body(&["Hi"]));
    let response = app.clone().oneshot(request).await.expect("request failed");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    env.advance_time(Duration::from_secs(3601));

    let request =
        fixtures::api_key_request(&issued.key, &issued.secret, &fixtures::pages_body(&["Hi"]));
    let response = app.oneshot(request).await.expect("request failed");
    assert_eq!(response.status(), StatusCode::CREATED);
}
