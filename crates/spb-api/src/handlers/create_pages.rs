//! Batch page creation handler.
//!
//! The single write endpoint of the gateway. Sequences authentication,
//! rate limiting, shape validation, per-item creation, usage bookkeeping,
//! audit logging, and webhook dispatch, and owns the partial-success
//! status policy: 201 when every item was created, 400 when none were,
//! 207 for a mix.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use spb_core::{
    sanitize,
    storage::{audit_log::NewAuditEntry, pages::NewPage},
    CreatedPage, Credential, CredentialId, ItemError, PipelineEvent, RequestId, RequestResult,
};
use spb_delivery::DispatchRequest;
use tracing::{error, info, instrument, warn};

use crate::{handlers::RequestMeta, AppState};

/// Wire path of the endpoint, recorded verbatim in audit rows.
pub const ENDPOINT: &str = "/v1/create-pages";

/// Request body for batch page creation.
#[derive(Debug, Deserialize)]
pub struct CreatePagesRequest {
    /// Items to create, processed in input order.
    pub pages: Vec<PageItem>,
}

/// One requested page.
#[derive(Debug, Deserialize)]
pub struct PageItem {
    /// Page title. Markup is stripped before the required-field check.
    #[serde(default)]
    pub title: String,
    /// Optional body content, stored as-is.
    #[serde(default)]
    pub content: String,
    /// Optional URL slug; derived from the title when absent or blank.
    #[serde(default)]
    pub slug: Option<String>,
}

/// Response for a fully or partially successful batch.
///
/// `errors` is omitted entirely when every item succeeded.
#[derive(Debug, Serialize)]
pub struct CreatePagesResponse {
    /// Correlation id, also present in the `X-Request-Id` header.
    pub request_id: String,
    /// Number of successfully created pages.
    pub total_created: usize,
    /// Created pages in input order.
    pub pages: Vec<CreatedPage>,
    /// Per-item failures in input order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ItemError>,
}

/// Error response envelope for terminal rejections.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details including code and message.
    pub error: ErrorDetail,
    /// Correlation id for support and log lookup.
    pub request_id: String,
}

/// Detailed error information.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error description.
    pub message: String,
}

/// Creates a batch of pages on behalf of an authenticated caller.
///
/// Gates run in a fixed order: authentication, rate limit, body shape.
/// After the gates, every item is attempted regardless of earlier item
/// failures, and bookkeeping plus the audit row are written whatever the
/// batch outcome. Webhook dispatch is handed to a detached task once the
/// response value is final.
///
/// # Errors
///
/// Returns appropriate HTTP status codes:
/// - 401: missing or invalid credentials
/// - 403: revoked or expired credential
/// - 429: rate limit exhausted (message carries the reset instant)
/// - 400: malformed body, empty or oversized batch, or all items failed
/// - 503: API disabled by configuration
#[instrument(
    name = "create_pages",
    skip(state, meta, headers, body),
    fields(request_id = %meta.request_id, content_length = body.len())
)]
pub async fn create_pages(
    State(state): State<AppState>,
    meta: RequestMeta,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    info!("processing batch creation request");

    let request_id = meta.request_id.clone();

    // Gate 1: authentication. Rejections are audited with no credential.
    let credential = match state.authenticator.authenticate(&headers).await {
        Ok(credential) => credential,
        Err(rejection) => {
            warn!(error = %rejection, "authentication rejected");
            let status = rejection.status_code();
            audit(&state, &meta, None, status, RequestResult::AuthFailed, rejection.to_string(), 0)
                .await;
            return create_error_response(
                status,
                rejection.code(),
                rejection.public_message(),
                &request_id,
            );
        },
    };

    // Gate 2: rate limit, keyed by the authenticated credential.
    let decision = match state.rate_limiter.check(credential.id).await {
        Ok(decision) => decision,
        Err(store_error) => {
            error!(error = %store_error, "rate limiter store unavailable");
            return create_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
                &request_id,
            );
        },
    };

    if !decision.allowed {
        let message = format!(
            "Rate limit exceeded. Try again after {}",
            decision.reset_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        warn!(credential = %credential.name, reset_at = %decision.reset_at, "rate limit exceeded");
        audit(
            &state,
            &meta,
            Some(credential.id),
            StatusCode::TOO_MANY_REQUESTS,
            RequestResult::RateLimited,
            message.clone(),
            0,
        )
        .await;
        return create_error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            &message,
            &request_id,
        );
    }

    // Gate 3: body shape. A body that does not decode never reaches the
    // audit log; empty and oversized batches do, as failed attempts.
    let request: CreatePagesRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(parse_error) => {
            warn!(error = %parse_error, "request body is not a valid batch");
            return create_error_response(
                StatusCode::BAD_REQUEST,
                "invalid_payload",
                "Request body must be a JSON object with a pages array",
                &request_id,
            );
        },
    };

    if request.pages.is_empty() {
        let message = "The pages array must not be empty";
        audit(
            &state,
            &meta,
            Some(credential.id),
            StatusCode::BAD_REQUEST,
            RequestResult::Failed,
            message.to_string(),
            0,
        )
        .await;
        return create_error_response(StatusCode::BAD_REQUEST, "invalid_payload", message, &request_id);
    }

    let max_pages = state.config.max_pages_per_request;
    if request.pages.len() > max_pages {
        let message = format!("Batch exceeds the maximum of {max_pages} pages per request");
        warn!(submitted = request.pages.len(), max_pages, "batch over the configured ceiling");
        audit(
            &state,
            &meta,
            Some(credential.id),
            StatusCode::BAD_REQUEST,
            RequestResult::Failed,
            message.clone(),
            0,
        )
        .await;
        return create_error_response(
            StatusCode::BAD_REQUEST,
            "batch_too_large",
            &message,
            &request_id,
        );
    }

    state
        .hooks
        .emit(&PipelineEvent::BatchStarted {
            request_id: request_id.clone(),
            credential_name: credential.name.clone(),
            total_requested: request.pages.len(),
        })
        .await;

    // Per-item processing: one item's failure never aborts the rest.
    let (created, item_errors) = process_batch(&state, &request.pages).await;

    let (status, result) = batch_status(created.len(), item_errors.len());

    // Bookkeeping runs on every outcome past the gates, partial included.
    record_usage(&state, &meta, &credential, &created).await;

    let message = if item_errors.is_empty() {
        String::new()
    } else {
        serde_json::to_string(&item_errors)
            .unwrap_or_else(|_| format!("{} items failed", item_errors.len()))
    };
    audit(&state, &meta, Some(credential.id), status, result, message, created.len()).await;

    state
        .hooks
        .emit(&PipelineEvent::BatchCompleted {
            request_id: request_id.clone(),
            created: created.clone(),
            errors: item_errors.clone(),
        })
        .await;

    let response = CreatePagesResponse {
        request_id: request_id.to_string(),
        total_created: created.len(),
        pages: created.clone(),
        errors: item_errors,
    };

    // The response above is final; delivery runs on its own task and only
    // ever carries successes.
    if !created.is_empty() {
        spawn_dispatch(&state, &request_id, &credential, created);
    }

    info!(
        status = status.as_u16(),
        total_created = response.total_created,
        errors = response.errors.len(),
        "batch creation completed"
    );

    (status, Json(response)).into_response()
}

/// Attempts every batch item in order, collecting successes and per-item
/// errors by input index.
async fn process_batch(
    state: &AppState,
    items: &[PageItem],
) -> (Vec<CreatedPage>, Vec<ItemError>) {
    let mut created = Vec::new();
    let mut errors = Vec::new();

    for (index, item) in items.iter().enumerate() {
        let title = sanitize::strip_markup(&item.title);
        if title.is_empty() {
            errors.push(ItemError { index, message: "Missing title".to_string() });
            continue;
        }

        let slug = derive_slug(item.slug.as_deref(), &title);
        let new_page = NewPage { title, content: item.content.clone(), slug };

        match state.storage.pages.create(&new_page).await {
            Ok(page) => created.push(CreatedPage {
                id: page.id,
                title: page.title,
                url: format!("{}/pages/{}", state.config.public_url_base(), page.slug),
            }),
            Err(create_error) => {
                warn!(index, error = %create_error, "page creation failed");
                errors.push(ItemError { index, message: create_error.to_string() });
            },
        }
    }

    (created, errors)
}

/// The exact status policy: no errors means 201, no successes means 400,
/// a mix means 207.
fn batch_status(created: usize, errors: usize) -> (StatusCode, RequestResult) {
    if errors == 0 {
        (StatusCode::CREATED, RequestResult::Success)
    } else if created == 0 {
        (StatusCode::BAD_REQUEST, RequestResult::Failed)
    } else {
        (StatusCode::MULTI_STATUS, RequestResult::PartialSuccess)
    }
}

/// Slug preference: the caller's value when it has content, else the title.
fn derive_slug(provided: Option<&str>, title: &str) -> String {
    match provided.map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => sanitize::slugify(slug),
        None => sanitize::slugify(title),
    }
}

/// Best-effort usage bookkeeping: creation records plus the credential's
/// last-used timestamp, last IP, and request counter. Failures are logged
/// and never alter the already-decided response.
async fn record_usage(
    state: &AppState,
    meta: &RequestMeta,
    credential: &Credential,
    created: &[CreatedPage],
) {
    if let Err(record_error) =
        state.storage.created_pages.record_batch(&meta.request_id, credential.id, created).await
    {
        error!(error = %record_error, "failed to record created pages");
    }

    if let Err(touch_error) = state
        .storage
        .credentials
        .touch(credential.id, state.clock.now_utc(), meta.client_ip.as_deref())
        .await
    {
        error!(error = %touch_error, "failed to update credential usage");
    }
}

/// Writes the one audit row for this request. Append failures are logged
/// and swallowed; auditing never changes a response.
async fn audit(
    state: &AppState,
    meta: &RequestMeta,
    credential_id: Option<CredentialId>,
    status: StatusCode,
    result: RequestResult,
    message: String,
    pages_created: usize,
) {
    let entry = NewAuditEntry {
        request_id: meta.request_id.clone(),
        credential_id,
        endpoint: ENDPOINT.to_string(),
        method: "POST".to_string(),
        status_code: i32::from(status.as_u16()),
        result,
        client_ip: meta.client_ip.clone(),
        user_agent: meta.user_agent.clone(),
        message,
        pages_created: i32::try_from(pages_created).unwrap_or(i32::MAX),
    };

    if let Err(append_error) = state.storage.audit_log.append(&entry).await {
        error!(error = %append_error, "failed to append audit entry");
    }
}

/// Hands the created pages to the dispatcher on a detached task.
///
/// Delivery failures are recorded by the dispatcher itself; only a failure
/// to even record lands in the log here.
fn spawn_dispatch(
    state: &AppState,
    request_id: &RequestId,
    credential: &Credential,
    pages: Vec<CreatedPage>,
) {
    let dispatcher = state.dispatcher.clone();
    let request = DispatchRequest {
        request_id: request_id.clone(),
        credential_name: credential.name.clone(),
        pages,
        override_url: None,
    };

    tokio::spawn(async move {
        let request_id = request.request_id.clone();
        if let Err(dispatch_error) = dispatcher.dispatch(request).await {
            error!(request_id = %request_id, error = %dispatch_error, "webhook dispatch failed");
        }
    });
}

/// Creates a standardized error response.
fn create_error_response(
    status: StatusCode,
    code: &str,
    message: &str,
    request_id: &RequestId,
) -> Response {
    let error_response = ErrorResponse {
        error: ErrorDetail { code: code.to_string(), message: message.to_string() },
        request_id: request_id.to_string(),
    };

    (status, Json(error_response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_policy_matches_the_three_outcomes() {
        assert_eq!(batch_status(3, 0), (StatusCode::CREATED, RequestResult::Success));
        assert_eq!(batch_status(0, 3), (StatusCode::BAD_REQUEST, RequestResult::Failed));
        assert_eq!(batch_status(2, 1), (StatusCode::MULTI_STATUS, RequestResult::PartialSuccess));
    }

    #[test]
    fn provided_slug_wins_over_title() {
        assert_eq!(derive_slug(Some("Launch Notes"), "Something Else"), "launch-notes");
    }

    #[test]
    fn blank_slug_falls_back_to_title() {
        assert_eq!(derive_slug(Some("   "), "Release Notes 2026"), "release-notes-2026");
        assert_eq!(derive_slug(None, "Release Notes 2026"), "release-notes-2026");
    }

    #[test]
    fn error_response_carries_code_and_request_id() {
        let request_id = RequestId::from_string("req_0011aabbccdd".into());
        let response =
            create_error_response(StatusCode::UNAUTHORIZED, "invalid_credentials", "nope", &request_id);

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn success_body_omits_empty_errors() {
        let body = CreatePagesResponse {
            request_id: "req_0011aabbccdd".into(),
            total_created: 1,
            pages: vec![CreatedPage {
                id: spb_core::PageId(1),
                title: "Welcome".into(),
                url: "https://blog.example.com/pages/welcome".into(),
            }],
            errors: Vec::new(),
        };

        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("errors").is_none());
        assert_eq!(value["total_created"], 1);
    }
}
