//! Repository for page content records.
//!
//! Pages are the records the batch endpoint exists to create. Content
//! arrives pre-sanitized from the pipeline; this layer only persists it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{error::Result, models::PageId};

/// Fields required to create a page.
#[derive(Debug, Clone)]
pub struct NewPage {
    /// Sanitized title.
    pub title: String,
    /// Body content, possibly empty.
    pub content: String,
    /// URL slug, caller-supplied or derived from the title.
    pub slug: String,
}

/// A stored page row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PageRecord {
    /// Unique identifier.
    pub id: PageId,
    /// Sanitized title.
    pub title: String,
    /// Body content.
    pub content: String,
    /// URL slug.
    pub slug: String,
    /// Publication status; new pages start as `draft`.
    pub status: String,
    /// When the page was created.
    pub created_at: DateTime<Utc>,
}

/// Repository for page database operations.
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

    /// Inserts a page and returns the stored row.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn create(&self, new: &NewPage) -> Result<PageRecord> {
        let page = sqlx::query_as::<_, PageRecord>(
            r"
            INSERT INTO pages (title, content, slug)
            VALUES ($1, $2, $3)
            RETURNING id, title, content, slug, status, created_at
            ",
        )
        .bind(&new.title)
        .bind(&new.content)
        .bind(&new.slug)
        .fetch_one(&*self.pool)
        .await?;

        Ok(page)
    }

    /// Finds a page by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find(&self, id: PageId) -> Result<Option<PageRecord>> {
        let page = sqlx::query_as::<_, PageRecord>(
            r"
            SELECT id, title, content, slug, status, created_at
            FROM pages
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(page)
    }

    /// Counts all pages.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pages")
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
