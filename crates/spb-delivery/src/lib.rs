//! Outbound webhook dispatch with bounded retries.
//!
//! This crate implements the delivery side of the page-creation pipeline:
//! after a batch has been created and the API response finalized, the
//! dispatcher notifies the configured webhook destination and records the
//! outcome.
//!
//! # Architecture
//!
//! Each dispatch is a self-contained sequence on the calling task:
//!
//! 1. **Resolve URL** - per-request override, else configured default;
//!    empty means no-op
//! 2. **Sign Payload** - serialize once, HMAC-SHA256 over the exact bytes
//!    sent
//! 3. **Attempt Loop** - up to the configured budget, sleeping the
//!    scheduled delay between failures
//! 4. **Record Outcome** - exactly one delivery record per dispatch,
//!    success or not
//!
//! Nothing here can affect the originating API response; it was committed
//! before dispatch began.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use spb_core::{HookRegistry, RealClock, RequestId};
//! use spb_delivery::{
//!     DispatchRequest, DispatcherConfig, PostgresDeliveryStorage, WebhookDispatcher,
//! };
//!
//! # async fn example(storage: Arc<spb_core::storage::Storage>) -> spb_delivery::Result<()> {
//! let config = DispatcherConfig {
//!     default_url: "https://example.com/hooks".to_string(),
//!     secret: "shared-secret".to_string(),
//!     ..Default::default()
//! };
//! let dispatcher = WebhookDispatcher::new(
//!     config,
//!     Arc::new(PostgresDeliveryStorage::new(storage)),
//!     Arc::new(HookRegistry::new()),
//!     Arc::new(RealClock),
//! )?;
//!
//! let outcome = dispatcher
//!     .dispatch(DispatchRequest {
//!         request_id: RequestId::generate(),
//!         credential_name: "Production Server".to_string(),
//!         pages: Vec::new(),
//!         override_url: None,
//!     })
//!     .await?;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod retry;
pub mod storage;

// Re-export main public API
pub use client::{ClientConfig, WebhookClient, WebhookRequest, WebhookResponse, SIGNATURE_HEADER};
pub use dispatcher::{
    sign_payload, DispatchOutcome, DispatchRequest, DispatcherConfig, WebhookDispatcher,
    WebhookEvent, EVENT_PAGES_CREATED,
};
pub use error::{DeliveryError, Result};
pub use retry::{RetrySchedule, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_SECONDS};
pub use storage::{DeliveryStorage, PostgresDeliveryStorage};

/// Default per-attempt HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 20;
