//! HTTP client for webhook delivery with configurable timeouts.
//!
//! Handles request construction, response capture, and error categorization
//! for the dispatcher's attempt loop. A non-2xx response is not an error at
//! this layer; callers inspect `WebhookResponse::is_success`.

use std::time::Duration;

use bytes::Bytes;
use spb_core::RequestId;
use tracing::{info_span, Instrument};

use crate::error::{DeliveryError, Result};

/// Header carrying the hex HMAC-SHA256 of the request body.
///
/// Present on every dispatch; an empty value means no shared secret is
/// configured and receivers must not treat the request as authenticated.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Maximum stored length of a response body snapshot.
const MAX_RESPONSE_SNAPSHOT: usize = 4 * 1024;

/// Configuration for the webhook HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-attempt timeout covering connect, write, and read.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: "spb-webhook/1.0".to_string(),
            max_redirects: 3,
        }
    }
}

/// One delivery attempt to be sent.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// Correlation id of the originating request.
    pub request_id: RequestId,
    /// Destination URL.
    pub url: String,
    /// Serialized payload; the exact bytes the signature covers.
    pub body: Bytes,
    /// Hex HMAC-SHA256 of `body`, or empty when unsigned.
    pub signature: String,
    /// Attempt number within the dispatch sequence (1-based).
    pub attempt_number: u32,
}

/// Outcome of a delivery attempt that reached the remote.
#[derive(Debug, Clone)]
pub struct WebhookResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body snapshot, truncated to a bounded length.
    pub body: String,
    /// Total duration of the request.
    pub duration: Duration,
    /// Whether the status code is in [200, 300).
    pub is_success: bool,
}

/// HTTP client used by the dispatcher.
///
/// Connection pooling comes from the underlying `reqwest` client, so one
/// `WebhookClient` serves all dispatches for the process lifetime.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl WebhookClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built with the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a new client with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Sends one delivery attempt.
    ///
    /// Returns `Ok` whenever the remote produced a status line, regardless
    /// of the status code. The signature header is always attached, empty
    /// or not.
    ///
    /// # Errors
    ///
    /// - `DeliveryError::Timeout` when the per-attempt deadline passes
    /// - `DeliveryError::Network` for connection-level failures
    pub async fn send(&self, request: &WebhookRequest) -> Result<WebhookResponse> {
        let start_time = std::time::Instant::now();

        let span = info_span!(
            "webhook_attempt",
            request_id = %request.request_id,
            url = %request.url,
            attempt = request.attempt_number
        );

        async move {
            let response = self
                .client
                .post(&request.url)
                .header("content-type", "application/json")
                .header(SIGNATURE_HEADER, &request.signature)
                .body(request.body.clone())
                .send()
                .await;

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    let duration = start_time.elapsed();
                    tracing::warn!(duration_ms = duration.as_millis(), "request failed: {e}");

                    if e.is_timeout() {
                        return Err(DeliveryError::timeout(self.config.timeout.as_secs()));
                    }
                    if e.is_connect() {
                        return Err(DeliveryError::network(format!("connection failed: {e}")));
                    }
                    return Err(DeliveryError::network(e.to_string()));
                },
            };

            let duration = start_time.elapsed();
            let status_code = response.status().as_u16();
            let is_success = response.status().is_success();

            tracing::debug!(
                status = status_code,
                duration_ms = duration.as_millis(),
                "received response"
            );

            let body = match response.bytes().await {
                Ok(bytes) => snapshot_body(&bytes),
                Err(e) => {
                    tracing::warn!("failed to read response body: {e}");
                    format!("[failed to read response body: {e}]")
                },
            };

            Ok(WebhookResponse { status_code, body, duration, is_success })
        }
        .instrument(span)
        .await
    }
}

/// Converts response bytes to a bounded UTF-8 snapshot for the delivery
/// record.
fn snapshot_body(bytes: &[u8]) -> String {
    if bytes.len() <= MAX_RESPONSE_SNAPSHOT {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    let suffix = "... (truncated)";
    let keep = MAX_RESPONSE_SNAPSHOT - suffix.len();
    let truncated = String::from_utf8_lossy(&bytes[..keep]);
    format!("{truncated}{suffix}")
}
