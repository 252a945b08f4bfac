//! Webhook dispatch sequencing: payload build, signing, attempt loop,
//! record.
//!
//! A dispatch runs after the originating API response has been finalized,
//! on its own task. Whatever happens here, the caller's response is already
//! committed; failures end up in the delivery record and the log, nowhere
//! else.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::SecondsFormat;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use spb_core::{
    models::{CreatedPage, DeliveryStatus, RequestId},
    storage::webhook_deliveries::NewWebhookDelivery,
    Clock, HookRegistry, PipelineEvent,
};

use crate::{
    client::{ClientConfig, WebhookClient, WebhookRequest},
    error::{DeliveryError, Result},
    retry::{RetrySchedule, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_SECONDS},
    storage::DeliveryStorage,
};

type HmacSha256 = Hmac<Sha256>;

/// Event name carried in every dispatch payload.
pub const EVENT_PAGES_CREATED: &str = "pages_created";

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Destination used when a request carries no override. Empty disables
    /// dispatch.
    pub default_url: String,
    /// Shared secret for payload signing. Empty sends an empty signature.
    pub secret: String,
    /// Per-attempt HTTP timeout.
    pub timeout: Duration,
    /// Total attempt budget, including the initial attempt.
    pub max_attempts: u32,
    /// Delays between attempts; doubling extends the list if needed.
    pub retry_delays: Vec<Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_url: String::new(),
            secret: String::new(),
            timeout: Duration::from_secs(20),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delays: DEFAULT_RETRY_DELAY_SECONDS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        }
    }
}

/// What the orchestrator hands over for one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Correlation id of the originating request.
    pub request_id: RequestId,
    /// Name of the authenticated credential.
    pub credential_name: String,
    /// Successfully created pages; failed items are never included.
    pub pages: Vec<CreatedPage>,
    /// Per-request destination override.
    pub override_url: Option<String>,
}

/// Payload sent to the webhook destination.
///
/// Serialized exactly once per dispatch; the same bytes are signed and
/// sent, so receivers can verify the signature over the raw body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Always [`EVENT_PAGES_CREATED`].
    pub event: String,
    /// Dispatch time, RFC 3339 UTC.
    pub timestamp: String,
    /// Correlation id of the originating request.
    pub request_id: String,
    /// Name of the credential that made the request.
    pub api_key_name: String,
    /// Number of entries in `pages`.
    pub total_pages: usize,
    /// Created pages, in input order.
    pub pages: Vec<CreatedPage>,
}

/// Summary of a finished dispatch sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Whether any attempt got a 2xx response.
    pub delivered: bool,
    /// Attempts made; 0 when dispatch was skipped for lack of a URL.
    pub attempts: u32,
    /// Last HTTP status observed; 0 if no attempt ever connected.
    pub http_code: i32,
}

impl DispatchOutcome {
    fn skipped() -> Self {
        Self { delivered: false, attempts: 0, http_code: 0 }
    }
}

/// Runs the full dispatch sequence for batches of created pages.
///
/// Owns the HTTP client and the persistence seam. One instance is shared
/// across all requests; each `dispatch` call is independent.
pub struct WebhookDispatcher {
    client: WebhookClient,
    storage: Arc<dyn DeliveryStorage>,
    hooks: Arc<HookRegistry>,
    clock: Arc<dyn Clock>,
    config: DispatcherConfig,
}

impl WebhookDispatcher {
    /// Creates a dispatcher with the given configuration and collaborators.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(
        config: DispatcherConfig,
        storage: Arc<dyn DeliveryStorage>,
        hooks: Arc<HookRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let client =
            WebhookClient::new(ClientConfig { timeout: config.timeout, ..Default::default() })?;

        Ok(Self { client, storage, hooks, clock, config })
    }

    /// Resolves the destination URL for a dispatch.
    ///
    /// Override wins over the configured default; both are trimmed. `None`
    /// means dispatch is a no-op.
    pub fn resolve_url(&self, override_url: Option<&str>) -> Option<String> {
        override_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(ToOwned::to_owned)
            .or_else(|| {
                let default = self.config.default_url.trim();
                (!default.is_empty()).then(|| default.to_owned())
            })
    }

    /// Runs one dispatch sequence and writes its delivery record.
    ///
    /// Attempts run until a 2xx response or until the budget is exhausted,
    /// sleeping the scheduled delay between attempts. Exactly one record is
    /// written per non-skipped dispatch, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Serialization` if the payload cannot be
    /// encoded and `DeliveryError::Database` if the delivery record cannot
    /// be written. Attempt-level transport failures are consumed by the
    /// loop and never surface here.
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome> {
        let Some(url) = self.resolve_url(request.override_url.as_deref()) else {
            tracing::debug!(
                request_id = %request.request_id,
                "no webhook url configured, dispatch skipped"
            );
            return Ok(DispatchOutcome::skipped());
        };

        self.hooks
            .emit(&PipelineEvent::DispatchStarted {
                request_id: request.request_id.clone(),
                url: url.clone(),
            })
            .await;

        let payload = WebhookEvent {
            event: EVENT_PAGES_CREATED.to_string(),
            timestamp: self.clock.now_utc().to_rfc3339_opts(SecondsFormat::Secs, true),
            request_id: request.request_id.as_str().to_owned(),
            api_key_name: request.credential_name.clone(),
            total_pages: request.pages.len(),
            pages: request.pages.clone(),
        };

        let body = serde_json::to_vec(&payload)
            .map_err(|e| DeliveryError::serialization(e.to_string()))?;
        let signature = sign_payload(&self.config.secret, &body)?;
        let body = Bytes::from(body);

        let schedule =
            RetrySchedule::new(self.config.max_attempts, self.config.retry_delays.clone());

        let mut attempts_made = 0;
        let mut last_http_code = 0;
        let mut last_body = String::new();
        let mut delivered = false;

        for attempt in 1..=schedule.max_attempts() {
            attempts_made = attempt;

            let attempt_request = WebhookRequest {
                request_id: request.request_id.clone(),
                url: url.clone(),
                body: body.clone(),
                signature: signature.clone(),
                attempt_number: attempt,
            };

            match self.client.send(&attempt_request).await {
                Ok(response) => {
                    // http_code tracks the last status a remote actually
                    // produced; a later transport failure does not reset it.
                    last_http_code = i32::from(response.status_code);
                    last_body = response.body;

                    if response.is_success {
                        delivered = true;
                        break;
                    }

                    tracing::warn!(
                        request_id = %request.request_id,
                        status = response.status_code,
                        attempt,
                        "webhook attempt rejected by remote"
                    );
                },
                Err(error) => {
                    last_body = error.to_string();
                    tracing::warn!(
                        request_id = %request.request_id,
                        %error,
                        attempt,
                        "webhook attempt failed in transport"
                    );
                    if !error.is_retryable() {
                        break;
                    }
                },
            }

            match schedule.delay_after(attempt) {
                Some(delay) => self.clock.sleep(delay).await,
                None => break,
            }
        }

        let status = if delivered { DeliveryStatus::Success } else { DeliveryStatus::Failed };

        let record = NewWebhookDelivery {
            request_id: request.request_id.clone(),
            url: url.clone(),
            status,
            http_code: last_http_code,
            attempts: i32::try_from(attempts_made).unwrap_or(i32::MAX),
            response_body: last_body,
        };
        self.storage
            .record_delivery(record)
            .await
            .map_err(|e| DeliveryError::database(e.to_string()))?;

        if delivered {
            tracing::info!(
                request_id = %request.request_id,
                attempts = attempts_made,
                http_code = last_http_code,
                "webhook delivered"
            );
        } else {
            tracing::warn!(
                request_id = %request.request_id,
                attempts = attempts_made,
                http_code = last_http_code,
                "webhook delivery failed, attempts exhausted"
            );
        }

        self.hooks
            .emit(&PipelineEvent::DispatchCompleted {
                request_id: request.request_id.clone(),
                status,
                attempts: attempts_made,
            })
            .await;

        Ok(DispatchOutcome { delivered, attempts: attempts_made, http_code: last_http_code })
    }
}

/// Computes the hex HMAC-SHA256 signature for a payload body.
///
/// An empty secret yields an empty signature; the header is still sent so
/// receivers can tell "unsigned" from "header stripped".
///
/// # Errors
///
/// Returns `DeliveryError::Configuration` if HMAC key setup fails.
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String> {
    if secret.is_empty() {
        return Ok(String::new());
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| DeliveryError::configuration("webhook secret rejected by HMAC"))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}
