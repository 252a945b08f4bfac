//! Batch page creation service.
//!
//! Entry point for the spb server. Loads configuration, connects to
//! PostgreSQL, wires the request pipeline, and serves the HTTP API until
//! a shutdown signal arrives.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use spb_api::{
    AppState, Authenticator, Config, MemoryRateStore, PostgresRateStore, RateLimiter, RateStore,
    RateStoreKind,
};
use spb_core::{Clock, HookRegistry, RealClock, Storage};
use spb_delivery::{DispatcherConfig, PostgresDeliveryStorage, WebhookDispatcher};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    init_tracing(&config.rust_log);

    info!(
        database_url = %config.database_url_masked(),
        host = %config.host,
        port = config.port,
        auth_mode = %config.auth_mode,
        rate_store = %config.rate_store,
        "configuration loaded"
    );

    let pool = connect_database(&config).await?;
    info!("database connection pool established");

    spb_core::run_migrations(&pool).await.context("database migration failed")?;
    info!("database schema is current");

    let addr = config.parse_server_addr()?;
    let state = build_state(config, pool)?;

    spb_api::start_server(state, addr).await.context("server exited with an error")?;

    info!("shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based filtering.
///
/// `RUST_LOG` wins when set; the configured default applies otherwise.
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with retry logic.
///
/// The database often comes up moments after the service in container
/// deployments, so connection failures retry a few times before giving up.
async fn connect_database(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut retries = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connection_timeout))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("failed to verify the database connection")?;

                return Ok(pool);
            },
            Err(_) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "database connection failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("failed to connect to the database after retries");
            },
        }
    }
}

/// Wires the full pipeline: storage, authentication, rate limiting, and
/// webhook dispatch, all sharing one clock.
fn build_state(config: Config, pool: sqlx::PgPool) -> Result<AppState> {
    let config = Arc::new(config);
    let storage = Storage::new(pool);
    let clock: Arc<dyn Clock> = Arc::new(RealClock::new());

    let authenticator =
        Arc::new(Authenticator::new(storage.clone(), config.clone(), clock.clone()));

    let rate_store: Arc<dyn RateStore> = match config.rate_store {
        RateStoreKind::Memory => Arc::new(MemoryRateStore::new()),
        RateStoreKind::Postgres => Arc::new(PostgresRateStore::new(storage.clone())),
    };
    let rate_limiter =
        Arc::new(RateLimiter::new(rate_store, config.effective_rate_limit(), clock.clone()));

    let hooks = Arc::new(HookRegistry::new());
    let dispatcher = WebhookDispatcher::new(
        DispatcherConfig {
            default_url: config.webhook_url.clone(),
            secret: config.webhook_secret.clone(),
            timeout: config.webhook_timeout(),
            max_attempts: config.webhook_max_attempts,
            retry_delays: config.webhook_retry_delays(),
        },
        Arc::new(PostgresDeliveryStorage::new(Arc::new(storage.clone()))),
        hooks.clone(),
        clock.clone(),
    )
    .context("failed to build the webhook dispatcher")?;

    Ok(AppState {
        storage,
        config,
        clock,
        authenticator,
        rate_limiter,
        dispatcher: Arc::new(dispatcher),
        hooks,
    })
}
