//! Test harness for the page service's integration tests.
//!
//! Provides per-test PostgreSQL databases, a recording webhook receiver,
//! credential fixtures, and a ready-to-route `AppState` wired the way the
//! binary wires production, but with a controllable clock and in-memory
//! rate windows.

pub mod database;
pub mod fixtures;
pub mod http;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::Router;
pub use database::TestDatabase;
pub use fixtures::{CredentialBuilder, IssuedCredential};
pub use http::WebhookReceiver;
use spb_api::{create_router, AppState, Authenticator, Config, MemoryRateStore, RateLimiter};
use spb_core::{Clock, HookRegistry, Storage, TestClock};
use spb_delivery::{DispatcherConfig, PostgresDeliveryStorage, WebhookDispatcher};
use tracing_subscriber::EnvFilter;

/// Everything one integration test needs.
///
/// Dropping the environment drops its database.
pub struct TestEnv {
    /// Dedicated database for this test.
    pub db: TestDatabase,
    /// Storage handle over the test database.
    pub storage: Storage,
    /// Controllable clock shared with every component built by
    /// [`TestEnv::app_state`].
    pub clock: Arc<TestClock>,
    /// Configuration states are built from. Adjust fields before calling
    /// `app_state`; changes have no effect on states already built.
    pub config: Config,
}

impl TestEnv {
    /// Creates an environment with test defaults: key/secret
    /// authentication, a rate limit high enough to stay out of the way,
    /// and no webhook destination.
    pub async fn new() -> Result<Self> {
        init_tracing();

        let db = TestDatabase::new().await.context("test database setup failed")?;
        let storage = Storage::new(db.pool());
        let clock = Arc::new(TestClock::new());

        Ok(Self { db, storage, clock, config: test_config() })
    }

    /// Builds an application state from the current configuration.
    pub fn app_state(&self) -> AppState {
        let config = Arc::new(self.config.clone());
        let clock: Arc<dyn Clock> = self.clock.clone();

        let authenticator =
            Arc::new(Authenticator::new(self.storage.clone(), config.clone(), clock.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(
            Arc::new(MemoryRateStore::new()),
            config.effective_rate_limit(),
            clock.clone(),
        ));
        let hooks = Arc::new(HookRegistry::new());
        let dispatcher = WebhookDispatcher::new(
            DispatcherConfig {
                default_url: config.webhook_url.clone(),
                secret: config.webhook_secret.clone(),
                timeout: config.webhook_timeout(),
                max_attempts: config.webhook_max_attempts,
                retry_delays: config.webhook_retry_delays(),
            },
            Arc::new(PostgresDeliveryStorage::new(Arc::new(self.storage.clone()))),
            hooks.clone(),
            clock.clone(),
        )
        .expect("webhook client construction does not fail with test settings");

        AppState {
            storage: self.storage.clone(),
            config,
            clock,
            authenticator,
            rate_limiter,
            dispatcher: Arc::new(dispatcher),
            hooks,
        }
    }

    /// Builds the full router for driving with `tower::ServiceExt`.
    pub fn router(&self) -> Router {
        create_router(self.app_state())
    }

    /// Binds the router to a local port and serves it on a background
    /// task. For tests that need a real TCP peer, such as client IP
    /// recording.
    pub async fn spawn_server(&self) -> Result<SocketAddr> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind test listener")?;
        let addr = listener.local_addr().context("listener has no local address")?;
        let app = self.router();

        tokio::spawn(async move {
            let service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(error) = axum::serve(listener, service).await {
                tracing::error!(%error, "test server exited");
            }
        });

        Ok(addr)
    }

    /// Issues an active credential named `name`.
    pub async fn issue_credential(&self, name: &str) -> Result<IssuedCredential> {
        CredentialBuilder::new(name).create(&self.storage).await
    }

    /// Moves the shared clock forward.
    pub fn advance_time(&self, duration: Duration) {
        self.clock.advance(duration);
    }
}

/// Defaults tuned for tests: deterministic URLs, no webhook destination,
/// and generous limits.
fn test_config() -> Config {
    Config {
        public_url: "https://blog.example.test".to_string(),
        jwt_secret: "test-signing-secret".to_string(),
        rate_limit_per_hour: 100,
        max_pages_per_request: 10,
        webhook_secret: "test-webhook-secret".to_string(),
        ..Config::default()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("warn,spb_api=debug,spb_core=debug,spb_delivery=debug")
        }))
        .with_test_writer()
        .try_init();
}
