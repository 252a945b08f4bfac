//! Error types for storage and domain operations.

use thiserror::Error;

/// Errors produced by the storage layer and core domain operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Requested row does not exist.
    #[error("record not found")]
    NotFound,

    /// Write violated a uniqueness, foreign-key, or check constraint.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Caller-supplied value failed domain validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation()
                    || db_err.is_foreign_key_violation()
                    || db_err.is_check_violation()
                {
                    Self::ConstraintViolation(db_err.to_string())
                } else {
                    Self::Database(err.to_string())
                }
            }
            _ => Self::Database(err.to_string()),
        }
    }
}

/// Convenience alias for core results.
pub type Result<T> = std::result::Result<T, CoreError>;
