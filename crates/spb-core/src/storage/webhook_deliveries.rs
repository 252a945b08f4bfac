//! Repository for webhook delivery records.
//!
//! Exactly one row is written per dispatch sequence, after its final
//! attempt. Rows are immutable once written.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{DeliveryStatus, RequestId, WebhookDelivery},
};

/// Fields for one delivery record.
#[derive(Debug, Clone)]
pub struct NewWebhookDelivery {
    /// Correlation id of the originating request.
    pub request_id: RequestId,
    /// Destination the dispatch was sent to.
    pub url: String,
    /// Final outcome of the attempt sequence.
    pub status: DeliveryStatus,
    /// Last HTTP status observed; 0 if no attempt ever connected.
    pub http_code: i32,
    /// Total attempts made.
    pub attempts: i32,
    /// Snapshot of the last response body or transport error.
    pub response_body: String,
}

/// Repository for delivery record operations.
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

    /// Records one completed dispatch sequence and returns the row id.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn record(&self, new: &NewWebhookDelivery) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r"
            INSERT INTO webhook_deliveries (
                request_id, url, status, http_code, attempts, response_body
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            ",
        )
        .bind(&new.request_id)
        .bind(&new.url)
        .bind(new.status)
        .bind(new.http_code)
        .bind(new.attempts)
        .bind(&new.response_body)
        .fetch_one(&*self.pool)
        .await?;

        Ok(row.0)
    }

    /// Returns the most recent delivery records, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn recent(&self, limit: i64) -> Result<Vec<WebhookDelivery>> {
        let deliveries = sqlx::query_as::<_, WebhookDelivery>(
            r"
            SELECT id, request_id, url, status, http_code, attempts,
                   response_body, created_at
            FROM webhook_deliveries
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(deliveries)
    }

    /// Finds delivery records for a request.
    ///
    /// At most one row exists per request in normal operation.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_request(&self, request_id: &RequestId) -> Result<Vec<WebhookDelivery>> {
        let deliveries = sqlx::query_as::<_, WebhookDelivery>(
            r"
            SELECT id, request_id, url, status, http_code, attempts,
                   response_body, created_at
            FROM webhook_deliveries
            WHERE request_id = $1
            ORDER BY id
            ",
        )
        .bind(request_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(deliveries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repository_can_be_created() {
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _repo = Repository::new(Arc::new(pool));
    }
}
