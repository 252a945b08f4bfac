//! Database access layer implementing the repository pattern.
//!
//! Repositories translate between domain models and the Postgres schema so
//! the schema can evolve without touching pipeline logic. All database
//! operations go through this module; direct SQL elsewhere is forbidden.

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

pub mod audit_log;
pub mod created_pages;
pub mod credentials;
pub mod pages;
pub mod rate_windows;
pub mod webhook_deliveries;

use crate::error::Result;

/// Schema statements applied at startup.
///
/// Idempotent by construction, so the binary and the test harness can both
/// apply them against a fresh or existing database.
const SCHEMA: &[(&str, &str)] = &[
    (
        "credentials table",
        r"
        CREATE TABLE IF NOT EXISTS credentials (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            key_hash TEXT NOT NULL,
            secret_hash TEXT NOT NULL,
            key_fingerprint TEXT NOT NULL UNIQUE,
            secret_fingerprint TEXT NOT NULL,
            key_hint TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            expires_at TIMESTAMPTZ,
            last_used_at TIMESTAMPTZ,
            request_count BIGINT NOT NULL DEFAULT 0,
            last_ip TEXT
        )
        ",
    ),
    (
        "pages table",
        r"
        CREATE TABLE IF NOT EXISTS pages (
            id BIGSERIAL PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            slug TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    ),
    (
        "created_pages table",
        r"
        CREATE TABLE IF NOT EXISTS created_pages (
            id BIGSERIAL PRIMARY KEY,
            page_id BIGINT NOT NULL REFERENCES pages(id),
            credential_id BIGINT NOT NULL REFERENCES credentials(id),
            request_id TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    ),
    (
        "created_pages request index",
        r"
        CREATE INDEX IF NOT EXISTS idx_created_pages_request
        ON created_pages (request_id)
        ",
    ),
    (
        "audit_log table",
        r"
        CREATE TABLE IF NOT EXISTS audit_log (
            id BIGSERIAL PRIMARY KEY,
            request_id TEXT NOT NULL,
            credential_id BIGINT REFERENCES credentials(id),
            endpoint TEXT NOT NULL,
            method TEXT NOT NULL,
            status_code INTEGER NOT NULL,
            result TEXT NOT NULL,
            client_ip TEXT,
            user_agent TEXT,
            message TEXT NOT NULL DEFAULT '',
            pages_created INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    ),
    (
        "audit_log request index",
        r"
        CREATE INDEX IF NOT EXISTS idx_audit_log_request
        ON audit_log (request_id)
        ",
    ),
    (
        "audit_log recency index",
        r"
        CREATE INDEX IF NOT EXISTS idx_audit_log_created
        ON audit_log (created_at DESC)
        ",
    ),
    (
        "webhook_deliveries table",
        r"
        CREATE TABLE IF NOT EXISTS webhook_deliveries (
            id BIGSERIAL PRIMARY KEY,
            request_id TEXT NOT NULL,
            url TEXT NOT NULL,
            status TEXT NOT NULL,
            http_code INTEGER NOT NULL DEFAULT 0,
            attempts INTEGER NOT NULL DEFAULT 0,
            response_body TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    ),
    (
        "webhook_deliveries request index",
        r"
        CREATE INDEX IF NOT EXISTS idx_webhook_deliveries_request
        ON webhook_deliveries (request_id)
        ",
    ),
    (
        "rate_windows table",
        r"
        CREATE TABLE IF NOT EXISTS rate_windows (
            credential_id BIGINT PRIMARY KEY REFERENCES credentials(id),
            count BIGINT NOT NULL DEFAULT 0,
            reset_at TIMESTAMPTZ NOT NULL
        )
        ",
    ),
];

/// Applies the schema to the given pool.
///
/// Safe to run repeatedly; every statement is `IF NOT EXISTS`. Called by
/// the binary at startup and by the test harness when provisioning
/// per-test databases.
///
/// # Errors
///
/// Returns an error naming the failed statement if any DDL fails.
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    for (label, statement) in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("creating {label}"))?;
    }

    Ok(())
}

/// Container for all repository instances providing unified database access.
///
/// Entry point for every database operation. Manages a shared connection
/// pool and exposes type-safe access to each domain repository.
#[derive(Clone)]
pub struct Storage {
    /// Repository for API credential records.
    pub credentials: Arc<credentials::Repository>,

    /// Repository for page content records.
    pub pages: Arc<pages::Repository>,

    /// Repository for per-request creation bookkeeping.
    pub created_pages: Arc<created_pages::Repository>,

    /// Repository for the request audit log.
    pub audit_log: Arc<audit_log::Repository>,

    /// Repository for webhook delivery records.
    pub webhook_deliveries: Arc<webhook_deliveries::Repository>,

    /// Repository for durable rate-limit windows.
    pub rate_windows: Arc<rate_windows::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    ///
    /// All repositories share the same pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            credentials: Arc::new(credentials::Repository::new(pool.clone())),
            pages: Arc::new(pages::Repository::new(pool.clone())),
            created_pages: Arc::new(created_pages::Repository::new(pool.clone())),
            audit_log: Arc::new(audit_log::Repository::new(pool.clone())),
            webhook_deliveries: Arc::new(webhook_deliveries::Repository::new(pool.clone())),
            rate_windows: Arc::new(rate_windows::Repository::new(pool)),
        }
    }

    /// Performs a health check on the database connection.
    ///
    /// Executes a trivial query to verify connectivity. Used by the
    /// health and readiness probes.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.credentials.pool()).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn storage_can_be_created() {
        // Instantiation only; real database coverage lives in the crate's
        // integration tests.
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _storage = Storage::new(pool);
    }
}
