//! Repository for durable rate-limit windows.
//!
//! Backs the Postgres rate store. Each credential owns at most one row
//! describing its current fixed window. Expired rows are reset in place on
//! the next check and swept opportunistically by `purge_expired`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{CredentialId, RateDecision, RateWindow},
};

/// Repository for rate window operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Atomically checks the window for a credential and consumes one slot
    /// if allowed.
    ///
    /// The row is locked for the duration of the transaction, so two
    /// concurrent requests for the same credential serialize and cannot
    /// both consume the final slot.
    ///
    /// A missing or expired window restarts at count 1. A full window
    /// denies without writing, leaving `reset_at` untouched.
    ///
    /// # Errors
    ///
    /// Returns error if the transaction fails.
    pub async fn check_and_consume(
        &self,
        credential_id: CredentialId,
        limit: i64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateDecision> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(i64, DateTime<Utc>)> = sqlx::query_as(
            r"
            SELECT count, reset_at
            FROM rate_windows
            WHERE credential_id = $1
            FOR UPDATE
            ",
        )
        .bind(credential_id)
        .fetch_optional(&mut *tx)
        .await?;

        let decision = match current {
            Some((count, reset_at)) if reset_at > now => {
                if count >= limit {
                    RateDecision { allowed: false, remaining: 0, reset_at }
                } else {
                    sqlx::query(
                        r"
                        UPDATE rate_windows
                        SET count = count + 1
                        WHERE credential_id = $1
                        ",
                    )
                    .bind(credential_id)
                    .execute(&mut *tx)
                    .await?;

                    RateDecision {
                        allowed: true,
                        remaining: (limit - (count + 1)).max(0),
                        reset_at,
                    }
                }
            }
            _ => {
                let reset_at = now + window;
                sqlx::query(
                    r"
                    INSERT INTO rate_windows (credential_id, count, reset_at)
                    VALUES ($1, 1, $2)
                    ON CONFLICT (credential_id)
                    DO UPDATE SET count = 1, reset_at = $2
                    ",
                )
                .bind(credential_id)
                .bind(reset_at)
                .execute(&mut *tx)
                .await?;

                RateDecision { allowed: true, remaining: (limit - 1).max(0), reset_at }
            }
        };

        tx.commit().await?;

        Ok(decision)
    }

    /// Reads the current window for a credential without consuming.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find(&self, credential_id: CredentialId) -> Result<Option<RateWindow>> {
        let row: Option<(i64, DateTime<Utc>)> = sqlx::query_as(
            r"
            SELECT count, reset_at
            FROM rate_windows
            WHERE credential_id = $1
            ",
        )
        .bind(credential_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|(count, reset_at)| RateWindow { count, reset_at }))
    }

    /// Clears the window for a credential.
    ///
    /// The next check starts a fresh window.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn reset(&self, credential_id: CredentialId) -> Result<()> {
        sqlx::query(
            r"
            DELETE FROM rate_windows
            WHERE credential_id = $1
            ",
        )
        .bind(credential_id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Deletes windows that expired before `now`.
    ///
    /// Expired rows are harmless (checks reset them in place) but this
    /// keeps the table from accumulating rows for idle credentials.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r"
            DELETE FROM rate_windows
            WHERE reset_at <= $1
            ",
        )
        .bind(now)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
