//! Authentication gate tests covering both schemes end to end.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
};
use chrono::Duration;
use serde_json::Value;
use spb_api::{auth::HEADER_JWT, handlers::create_pages::ENDPOINT};
use spb_core::{AuthMode, Clock, RequestResult};
use spb_testing::{fixtures, CredentialBuilder, TestEnv};
use tower::ServiceExt;

async fn read_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("failed to read body");
    serde_json::from_slice(&bytes).expect("body is not valid JSON")
}

#[tokio::test]
async fn missing_credentials_are_rejected() {
    let env = TestEnv::new().await.expect("failed to create test environment");
    let app = env.router();

    let response = app
        .oneshot(fixtures::anonymous_request(&fixtures::pages_body(&["Hello"])))
        .await
        .expect("request failed");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let header_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .expect("response is missing the request id header");

    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], "missing_credentials");
    assert_eq!(body["request_id"], header_id);
}

#[tokio::test]
async fn unknown_key_is_rejected() {
    let env = TestEnv::new().await.expect("failed to create test environment");
    let app = env.router();

    let request =
        fixtures::api_key_request("spb_0000000000", "no-such-secret", &fixtures::pages_body(&["Hi"]));
    let response = app.oneshot(request).await.expect("request failed");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_credentials");
}

#[tokio::test]
async fn wrong_secret_is_rejected() {
    let env = TestEnv::new().await.expect("failed to create test environment");
    let issued = env.issue_credential("robot").await.expect("failed to issue credential");
    let app = env.router();

    let request =
        fixtures::api_key_request(&issued.key, "not-the-secret", &fixtures::pages_body(&["Hi"]));
    let response = app.oneshot(request).await.expect("request failed");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_credentials");
}

#[tokio::test]
async fn single_character_mutations_are_rejected() {
    let env = TestEnv::new().await.expect("failed to create test environment");
    let issued = env.issue_credential("robot").await.expect("failed to issue credential");
    let app = env.router();

    // Flip the last character. A mutated key misses the fingerprint
    // lookup; a mutated secret survives the lookup and has to fail the
    // hash verification instead.
    let flip_last = |value: &str| {
        let mut flipped = value.to_string();
        let last = flipped.pop().unwrap_or('0');
        flipped.push(if last == 'a' { 'b' } else { 'a' });
        flipped
    };

    for (key, secret) in [
        (flip_last(&issued.key), issued.secret.clone()),
        (issued.key.clone(), flip_last(&issued.secret)),
    ] {
        let request = fixtures::api_key_request(&key, &secret, &fixtures::pages_body(&["Hi"]));
        let response = app.clone().oneshot(request).await.expect("request failed");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = read_json(response).await;
        assert_eq!(body["error"]["code"], "invalid_credentials");
    }
}

#[tokio::test]
async fn valid_key_pair_authenticates() {
    let env = TestEnv::new().await.expect("failed to create test environment");
    let issued = env.issue_credential("robot").await.expect("failed to issue credential");
    let app = env.router();

    let request =
        fixtures::api_key_request(&issued.key, &issued.secret, &fixtures::pages_body(&["Hello"]));
    let response = app.oneshot(request).await.expect("request failed");

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn revoked_key_is_rejected() {
    let env = TestEnv::new().await.expect("failed to create test environment");
    let issued = CredentialBuilder::new("retired-robot")
        .revoked()
        .create(&env.storage)
        .await
        .expect("failed to issue credential");
    let app = env.router();

    let request =
        fixtures::api_key_request(&issued.key, &issued.secret, &fixtures::pages_body(&["Hi"]));
    let response = app.oneshot(request).await.expect("request failed");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], "key_revoked");
}

#[tokio::test]
async fn expired_key_is_rejected() {
    let env = TestEnv::new().await.expect("failed to create test environment");
    let issued = CredentialBuilder::new("stale-robot")
        .expires_at(env.clock.now_utc() - Duration::hours(1))
        .create(&env.storage)
        .await
        .expect("failed to issue credential");
    let app = env.router();

    let request =
        fixtures::api_key_request(&issued.key, &issued.secret, &fixtures::pages_body(&["Hi"]));
    let response = app.oneshot(request).await.expect("request failed");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], "key_expired");
}

#[tokio::test]
async fn disabled_api_returns_service_unavailable() {
    let mut env = TestEnv::new().await.expect("failed to create test environment");
    env.config.api_enabled = false;
    let issued = env.issue_credential("robot").await.expect("failed to issue credential");
    let app = env.router();

    let request =
        fixtures::api_key_request(&issued.key, &issued.secret, &fixtures::pages_body(&["Hi"]));
    let response = app.oneshot(request).await.expect("request failed");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], "api_disabled");
}

#[tokio::test]
async fn auth_failures_land_in_the_audit_log() {
    let env = TestEnv::new().await.expect("failed to create test environment");
    let app = env.router();

    let response = app
        .oneshot(fixtures::anonymous_request(&fixtures::pages_body(&["Hi"])))
        .await
        .expect("request failed");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let entries = env.storage.audit_log.recent(10).await.expect("audit query failed");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].result, RequestResult::AuthFailed);
    assert_eq!(entries[0].status_code, 401);
    assert!(entries[0].credential_id.is_none());
    assert_eq!(entries[0].pages_created, 0);
}

#[tokio::test]
async fn bearer_token_authenticates() {
    let mut env = TestEnv::new().await.expect("failed to create test environment");
    env.config.auth_mode = AuthMode::Jwt;
    let issued = env.issue_credential("robot").await.expect("failed to issue credential");
    let token = issued.bearer_token(&env.config.jwt_secret, env.clock.now_utc());
    let app = env.router();

    let request = fixtures::bearer_request(&token, &fixtures::pages_body(&["Hello"]));
    let response = app.oneshot(request).await.expect("request failed");

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn fallback_header_carries_the_token() {
    let mut env = TestEnv::new().await.expect("failed to create test environment");
    env.config.auth_mode = AuthMode::Jwt;
    let issued = env.issue_credential("robot").await.expect("failed to issue credential");
    let token = issued.bearer_token(&env.config.jwt_secret, env.clock.now_utc());
    let app = env.router();

    let request = Request::builder()
        .method("POST")
        .uri(ENDPOINT)
        .header("content-type", "application/json")
        .header(HEADER_JWT, token)
        .body(Body::from(fixtures::pages_body(&["Hello"]).to_string()))
        .expect("request construction");
    let response = app.oneshot(request).await.expect("request failed");

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn token_with_wrong_signature_is_rejected() {
    let mut env = TestEnv::new().await.expect("failed to create test environment");
    env.config.auth_mode = AuthMode::Jwt;
    let issued = env.issue_credential("robot").await.expect("failed to issue credential");
    let token = issued.bearer_token("a-different-signing-secret", env.clock.now_utc());
    let app = env.router();

    let request = fixtures::bearer_request(&token, &fixtures::pages_body(&["Hi"]));
    let response = app.oneshot(request).await.expect("request failed");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_token");
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let mut env = TestEnv::new().await.expect("failed to create test environment");
    env.config.auth_mode = AuthMode::Jwt;
    let issued = env.issue_credential("robot").await.expect("failed to issue credential");

    let minted_at = env.clock.now_utc() - Duration::hours(3);
    let token = spb_api::token::mint(
        &issued.credential.key_fingerprint,
        &env.config.jwt_secret,
        minted_at,
        Some(minted_at + Duration::hours(1)),
    )
    .expect("token minting failed");
    let app = env.router();

    let request = fixtures::bearer_request(&token, &fixtures::pages_body(&["Hi"]));
    let response = app.oneshot(request).await.expect("request failed");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_token");
}

#[tokio::test]
async fn key_headers_do_not_satisfy_jwt_mode() {
    let mut env = TestEnv::new().await.expect("failed to create test environment");
    env.config.auth_mode = AuthMode::Jwt;
    let issued = env.issue_credential("robot").await.expect("failed to issue credential");
    let app = env.router();

    let request =
        fixtures::api_key_request(&issued.key, &issued.secret, &fixtures::pages_body(&["Hi"]));
    let response = app.oneshot(request).await.expect("request failed");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], "missing_credentials");
}
