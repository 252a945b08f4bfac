//! Repository for the request audit log.
//!
//! One row per request outcome: successes, partial successes, validation
//! failures, and auth or rate-limit rejections all land here. The log is
//! append-only; nothing updates or deletes rows.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{AuditEntry, CredentialId, RequestId, RequestResult},
};

/// Fields for one audit row.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    /// Correlation id of the request.
    pub request_id: RequestId,
    /// Authenticated credential, when authentication got that far.
    pub credential_id: Option<CredentialId>,
    /// Request path.
    pub endpoint: String,
    /// HTTP method.
    pub method: String,
    /// Status code returned to the caller.
    pub status_code: i32,
    /// Terminal request classification.
    pub result: RequestResult,
    /// Resolved client IP, if any.
    pub client_ip: Option<String>,
    /// Caller's User-Agent header, if any.
    pub user_agent: Option<String>,
    /// Rejection reason or serialized per-item errors; empty on success.
    pub message: String,
    /// Count of successfully created items.
    pub pages_created: i32,
}

/// Repository for audit log operations.
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

    /// Appends one audit row and returns its id.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn append(&self, entry: &NewAuditEntry) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r"
            INSERT INTO audit_log (
                request_id, credential_id, endpoint, method, status_code,
                result, client_ip, user_agent, message, pages_created
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            ",
        )
        .bind(&entry.request_id)
        .bind(entry.credential_id)
        .bind(&entry.endpoint)
        .bind(&entry.method)
        .bind(entry.status_code)
        .bind(entry.result)
        .bind(entry.client_ip.as_deref())
        .bind(entry.user_agent.as_deref())
        .bind(&entry.message)
        .bind(entry.pages_created)
        .fetch_one(&*self.pool)
        .await?;

        Ok(row.0)
    }

    /// Returns the most recent audit rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn recent(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            r"
            SELECT id, request_id, credential_id, endpoint, method,
                   status_code, result, client_ip, user_agent, message,
                   pages_created, created_at
            FROM audit_log
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(entries)
    }

    /// Finds the audit row for a request, if one was written.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_request(&self, request_id: &RequestId) -> Result<Option<AuditEntry>> {
        let entry = sqlx::query_as::<_, AuditEntry>(
            r"
            SELECT id, request_id, credential_id, endpoint, method,
                   status_code, result, client_ip, user_agent, message,
                   pages_created, created_at
            FROM audit_log
            WHERE request_id = $1
            ",
        )
        .bind(request_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(entry)
    }

    /// Counts rows with a given result classification.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_by_result(&self, result: RequestResult) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*) FROM audit_log
            WHERE result = $1
            ",
        )
        .bind(result)
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
