//! Request authentication for the page creation endpoint.
//!
//! Two schemes, selected by configuration and never negotiated per
//! request: paired API key/secret headers, or an HS256 bearer token whose
//! fingerprint claim resolves to a stored credential. Both schemes share
//! the same credential store and the same rejection taxonomy, so callers
//! cannot distinguish an unknown key from a wrong secret.

use axum::http::{HeaderMap, StatusCode};
use std::sync::Arc;
use thiserror::Error;

use spb_core::{AuthMode, Clock, Credential, CredentialStatus, Storage};

use crate::{
    config::Config,
    crypto,
    token::{self, TokenError},
};

/// Header carrying the API key.
pub const HEADER_API_KEY: &str = "x-spb-api-key";
/// Header carrying the API secret.
pub const HEADER_API_SECRET: &str = "x-spb-api-secret";
/// Fallback header carrying a bearer token when `Authorization` is taken
/// by a proxy.
pub const HEADER_JWT: &str = "x-spb-jwt";

/// Authentication rejection reasons.
///
/// Display text is for logs and the audit trail; the wire message comes
/// from [`public_message`](Self::public_message) so internals never leak
/// to callers.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The API master switch is off.
    #[error("API access is disabled")]
    ApiDisabled,

    /// Key or secret header is missing or empty.
    #[error("API key and secret headers are required")]
    MissingApiKey,

    /// No bearer token in `Authorization` or the fallback header.
    #[error("bearer token is required")]
    MissingToken,

    /// Unknown fingerprint or failed hash verification.
    #[error("invalid API credentials")]
    InvalidCredentials,

    /// Token failed structural or signature verification.
    #[error("invalid bearer token: {0}")]
    InvalidToken(#[from] TokenError),

    /// The credential is revoked.
    #[error("API key has been revoked")]
    Revoked,

    /// The credential is past its expiry.
    #[error("API key has expired")]
    Expired,

    /// Credential lookup failed.
    #[error("credential lookup failed: {0}")]
    Database(String),
}

impl AuthError {
    /// HTTP status for this rejection.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ApiDisabled => StatusCode::SERVICE_UNAVAILABLE,
            Self::MissingApiKey
            | Self::MissingToken
            | Self::InvalidCredentials
            | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::Revoked | Self::Expired => StatusCode::FORBIDDEN,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ApiDisabled => "api_disabled",
            Self::MissingApiKey | Self::MissingToken => "missing_credentials",
            Self::InvalidCredentials => "invalid_credentials",
            Self::InvalidToken(_) => "invalid_token",
            Self::Revoked => "key_revoked",
            Self::Expired => "key_expired",
            Self::Database(_) => "internal_error",
        }
    }

    /// Message safe to return to the caller.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::ApiDisabled => "API access is disabled",
            Self::MissingApiKey => "API key and secret are required",
            Self::MissingToken => "Bearer token is required",
            Self::InvalidCredentials => "Invalid API credentials",
            Self::InvalidToken(_) => "Invalid bearer token",
            Self::Revoked => "API key has been revoked",
            Self::Expired => "API key has expired",
            Self::Database(_) => "Internal server error",
        }
    }
}

/// Authenticates requests against the credential store.
#[derive(Clone)]
pub struct Authenticator {
    storage: Storage,
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
}

impl Authenticator {
    /// Creates an authenticator over the given store and configuration.
    pub fn new(storage: Storage, config: Arc<Config>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, config, clock }
    }

    /// Authenticates a request from its headers.
    ///
    /// Check order is fixed: the API master switch first, then the scheme
    /// selected by configuration. On success returns the credential for
    /// rate limiting and bookkeeping downstream.
    ///
    /// # Errors
    ///
    /// Returns the first gate that rejects; see [`AuthError`] for the
    /// status mapping.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Credential, AuthError> {
        if !self.config.api_enabled {
            return Err(AuthError::ApiDisabled);
        }

        match self.config.auth_mode {
            AuthMode::ApiKey => self.authenticate_api_key(headers).await,
            AuthMode::Jwt => self.authenticate_bearer(headers).await,
        }
    }

    async fn authenticate_api_key(&self, headers: &HeaderMap) -> Result<Credential, AuthError> {
        let (key, secret) = extract_key_pair(headers).ok_or(AuthError::MissingApiKey)?;

        let credential = self.lookup(&crypto::fingerprint(&key)).await?;
        self.check_status(&credential)?;

        // Both hashes are always verified before the result is inspected;
        // no early exit between the two.
        let key_ok = crypto::verify_credential(&key, &credential.key_hash);
        let secret_ok = crypto::verify_credential(&secret, &credential.secret_hash);
        if !(key_ok && secret_ok) {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(credential)
    }

    async fn authenticate_bearer(&self, headers: &HeaderMap) -> Result<Credential, AuthError> {
        let token = extract_bearer(headers).ok_or(AuthError::MissingToken)?;

        let claims = token::verify(&token, &self.config.jwt_secret, self.clock.now_utc())?;

        let credential = self.lookup(&claims.key_fingerprint).await?;
        self.check_status(&credential)?;

        Ok(credential)
    }

    async fn lookup(&self, fingerprint: &str) -> Result<Credential, AuthError> {
        self.storage
            .credentials
            .find_by_fingerprint(fingerprint)
            .await
            .map_err(|e| AuthError::Database(e.to_string()))?
            .ok_or(AuthError::InvalidCredentials)
    }

    fn check_status(&self, credential: &Credential) -> Result<(), AuthError> {
        if credential.status == CredentialStatus::Revoked {
            return Err(AuthError::Revoked);
        }

        if credential.is_expired(self.clock.now_utc()) {
            return Err(AuthError::Expired);
        }

        Ok(())
    }
}

/// Extracts the key/secret header pair. Empty values count as missing.
fn extract_key_pair(headers: &HeaderMap) -> Option<(String, String)> {
    let key = header_value(headers, HEADER_API_KEY)?;
    let secret = header_value(headers, HEADER_API_SECRET)?;
    Some((key, secret))
}

/// Extracts a bearer token from `Authorization` or the fallback header.
fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    header_value(headers, HEADER_JWT)
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(String::from)
}
