//! Error types for webhook dispatch operations.
//!
//! Distinguishes transport failures (retried inside the attempt loop) from
//! setup and persistence failures (which abort the dispatch). None of these
//! errors ever reach the API caller; the originating request has already
//! been answered by the time dispatch runs.

use thiserror::Error;

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error conditions raised while dispatching a webhook.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Network-level connectivity failure before a response arrived.
    #[error("network connection failed: {message}")]
    Network {
        /// Error message describing the network failure
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Number of seconds before the request timed out
        timeout_seconds: u64,
    },

    /// The payload could not be serialized.
    #[error("payload serialization failed: {message}")]
    Serialization {
        /// Serialization error message
        message: String,
    },

    /// Writing the delivery record failed.
    #[error("database error: {message}")]
    Database {
        /// Database error message
        message: String,
    },

    /// Invalid dispatcher or HTTP client configuration.
    #[error("invalid dispatcher configuration: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into() }
    }

    /// Creates a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Whether the attempt loop should retry after this error.
    ///
    /// Transport failures (network, timeout) consume an attempt and are
    /// retried while budget remains. Setup and persistence failures abort
    /// the dispatch instead.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Serialization { .. } | Self::Database { .. } | Self::Configuration { .. } => {
                false
            },
        }
    }
}
