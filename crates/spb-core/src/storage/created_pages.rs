//! Repository for per-request page creation bookkeeping.
//!
//! Records which credential created which pages under which request, so
//! operators can trace any page back to the API call that produced it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{CreatedPage, CredentialId, PageId, RequestId},
};

/// A stored bookkeeping row linking a page to its originating request.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CreationRecord {
    /// Row id.
    pub id: i64,
    /// The page that was created.
    pub page_id: PageId,
    /// Credential that authenticated the request.
    pub credential_id: CredentialId,
    /// Correlation id of the request.
    pub request_id: RequestId,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

/// Repository for creation bookkeeping operations.
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

    /// Records every page created by one request, atomically.
    ///
    /// Empty batches write nothing.
    ///
    /// # Errors
    ///
    /// Returns error if any insert fails; the transaction rolls back.
    pub async fn record_batch(
        &self,
        request_id: &RequestId,
        credential_id: CredentialId,
        pages: &[CreatedPage],
    ) -> Result<()> {
        if pages.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for page in pages {
            sqlx::query(
                r"
                INSERT INTO created_pages (page_id, credential_id, request_id)
                VALUES ($1, $2, $3)
                ",
            )
            .bind(page.id)
            .bind(credential_id)
            .bind(request_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Finds all creation records for a request.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_request(&self, request_id: &RequestId) -> Result<Vec<CreationRecord>> {
        let records = sqlx::query_as::<_, CreationRecord>(
            r"
            SELECT id, page_id, credential_id, request_id, created_at
            FROM created_pages
            WHERE request_id = $1
            ORDER BY id
            ",
        )
        .bind(request_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(records)
    }

    /// Counts pages created by a credential over its lifetime.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_for_credential(&self, credential_id: CredentialId) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*) FROM created_pages
            WHERE credential_id = $1
            ",
        )
        .bind(credential_id)
        .fetch_one(&*self.pool)
        .await?;

        Ok(count.0)
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
