//! Repository for API credential database operations.
//!
//! Manages the credential lifecycle: issuance, fingerprint lookup during
//! authentication, soft revocation, and per-request bookkeeping. Secret
//! material is hashed before it reaches this layer; the repository only
//! ever sees digests.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{Credential, CredentialId, CredentialStatus},
};

/// Fields required to issue a new credential.
///
/// Produced by the issuance path after hashing; plaintext key and secret
/// never appear here.
#[derive(Debug, Clone)]
pub struct NewCredential {
    /// Operator-facing label.
    pub name: String,
    /// Salted one-way hash of the API key.
    pub key_hash: String,
    /// Salted one-way hash of the API secret.
    pub secret_hash: String,
    /// Deterministic fingerprint of the API key.
    pub key_fingerprint: String,
    /// Deterministic fingerprint of the API secret.
    pub secret_fingerprint: String,
    /// Display hint (first and last four characters of the key).
    pub key_hint: String,
    /// Optional hard expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Repository for credential database operations.
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

    /// Inserts a new credential and returns the stored row.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if the key fingerprint already exists.
    pub async fn create(&self, new: &NewCredential) -> Result<Credential> {
        let credential = sqlx::query_as::<_, Credential>(
            r"
            INSERT INTO credentials (
                name, key_hash, secret_hash, key_fingerprint,
                secret_fingerprint, key_hint, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, name, key_hash, secret_hash, key_fingerprint,
                      secret_fingerprint, key_hint, status, created_at,
                      expires_at, last_used_at, request_count, last_ip
            ",
        )
        .bind(&new.name)
        .bind(&new.key_hash)
        .bind(&new.secret_hash)
        .bind(&new.key_fingerprint)
        .bind(&new.secret_fingerprint)
        .bind(&new.key_hint)
        .bind(new.expires_at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(credential)
    }

    /// Finds a credential by its key fingerprint.
    ///
    /// The fingerprint is the authentication lookup index. Status and
    /// expiry are NOT filtered here: the authenticator needs the row to
    /// distinguish revoked and expired rejections from unknown keys.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Credential>> {
        let credential = sqlx::query_as::<_, Credential>(
            r"
            SELECT id, name, key_hash, secret_hash, key_fingerprint,
                   secret_fingerprint, key_hint, status, created_at,
                   expires_at, last_used_at, request_count, last_ip
            FROM credentials
            WHERE key_fingerprint = $1
            ",
        )
        .bind(fingerprint)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(credential)
    }

    /// Finds a credential by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: CredentialId) -> Result<Option<Credential>> {
        let credential = sqlx::query_as::<_, Credential>(
            r"
            SELECT id, name, key_hash, secret_hash, key_fingerprint,
                   secret_fingerprint, key_hint, status, created_at,
                   expires_at, last_used_at, request_count, last_ip
            FROM credentials
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(credential)
    }

    /// Sets the lifecycle status of a credential.
    ///
    /// Revocation and restoration are both status flips; rows are never
    /// deleted.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no credential has the given id.
    pub async fn set_status(&self, id: CredentialId, status: CredentialStatus) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE credentials
            SET status = $2
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(status)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }

        Ok(())
    }

    /// Records a successful authenticated request.
    ///
    /// Updates last-used timestamp and client IP, and increments the
    /// lifetime request counter, in one atomic statement.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no credential has the given id.
    pub async fn touch(
        &self,
        id: CredentialId,
        now: DateTime<Utc>,
        client_ip: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE credentials
            SET last_used_at = $2,
                last_ip = $3,
                request_count = request_count + 1
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(now)
        .bind(client_ip)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }

        Ok(())
    }

    /// Lists credentials newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn list(&self, include_revoked: bool) -> Result<Vec<Credential>> {
        let query = if include_revoked {
            r"
            SELECT id, name, key_hash, secret_hash, key_fingerprint,
                   secret_fingerprint, key_hint, status, created_at,
                   expires_at, last_used_at, request_count, last_ip
            FROM credentials
            ORDER BY created_at DESC
            "
        } else {
            r"
            SELECT id, name, key_hash, secret_hash, key_fingerprint,
                   secret_fingerprint, key_hint, status, created_at,
                   expires_at, last_used_at, request_count, last_ip
            FROM credentials
            WHERE status = 'active'
            ORDER BY created_at DESC
            "
        };

        let credentials = sqlx::query_as::<_, Credential>(query).fetch_all(&*self.pool).await?;

        Ok(credentials)
    }
}
