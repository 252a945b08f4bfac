//! HTTP gateway for authenticated batch page creation.
//!
//! Hosts the authenticator, the per-credential rate limiter, and the
//! request orchestration behind `POST /v1/create-pages`, built on the
//! domain and storage layers of `spb-core` and the webhook pipeline of
//! `spb-delivery`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use spb_core::{Clock, HookRegistry, Storage};
use spb_delivery::WebhookDispatcher;

pub mod auth;
pub mod config;
pub mod crypto;
pub mod handlers;
pub mod rate_limit;
pub mod server;
pub mod token;

pub use auth::{AuthError, Authenticator};
pub use config::Config;
pub use rate_limit::{MemoryRateStore, PostgresRateStore, RateLimiter, RateStore, RateStoreKind};
pub use server::{create_router, start_server};

/// Shared application state cloned into every handler.
///
/// Built once at startup from configuration and the database pool; all
/// fields are cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Repository aggregate for all database access.
    pub storage: Storage,
    /// Loaded service configuration.
    pub config: Arc<Config>,
    /// Clock behind expiry checks, rate windows, and timestamps.
    pub clock: Arc<dyn Clock>,
    /// Verifies inbound credentials.
    pub authenticator: Arc<Authenticator>,
    /// Per-credential fixed-window limiter.
    pub rate_limiter: Arc<RateLimiter>,
    /// Outbound webhook dispatcher.
    pub dispatcher: Arc<WebhookDispatcher>,
    /// Pipeline observation hooks.
    pub hooks: Arc<HookRegistry>,
}
