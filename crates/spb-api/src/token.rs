//! Bearer token verification and minting.
//!
//! Tokens are compact three-segment HS256 JWTs signed with the gateway's
//! configured secret. Verification is deliberately self-contained: exactly
//! one algorithm is accepted, the signature is checked in constant time,
//! and the only claim the gateway trusts is the key fingerprint that links
//! the token back to a stored credential.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto;

/// The only accepted signing algorithm.
const ALGORITHM: &str = "HS256";

/// Token verification errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Token structure or encoding is invalid.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// Header names an algorithm other than HS256.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Signature does not match the signing input.
    #[error("signature verification failed")]
    InvalidSignature,

    /// The `exp` claim is in the past.
    #[error("token expired")]
    Expired,

    /// The key fingerprint claim is missing or empty.
    #[error("missing key fingerprint claim")]
    MissingFingerprint,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawClaims {
    #[serde(rename = "ak_fp", skip_serializing_if = "Option::is_none")]
    key_fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
}

/// Verified claims from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Fingerprint of the API key this token represents.
    pub key_fingerprint: String,
    /// Expiry as a unix timestamp, if the token carries one.
    pub expires_at: Option<i64>,
    /// Subject, if the token carries one.
    pub subject: Option<String>,
}

/// Verifies a bearer token and extracts its claims.
///
/// Checks, in order: three-segment structure, base64url encoding, the
/// HS256 algorithm header, the signature over `header.payload`, the `exp`
/// claim against `now`, and finally the presence of the key fingerprint
/// claim. The fingerprint still has to resolve to an active credential;
/// that check belongs to the authenticator, not this function.
///
/// # Errors
///
/// Returns the first check that fails.
pub fn verify(token: &str, secret: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(TokenError::Malformed("expected three segments".into()));
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(segments[0])
        .map_err(|_| TokenError::Malformed("header is not valid base64url".into()))?;
    let header: Header = serde_json::from_slice(&header_bytes)
        .map_err(|_| TokenError::Malformed("header is not valid JSON".into()))?;

    if header.alg != ALGORITHM {
        return Err(TokenError::UnsupportedAlgorithm(header.alg));
    }

    let signing_input = format!("{}.{}", segments[0], segments[1]);
    let expected = crypto::generate_hmac_hex(signing_input.as_bytes(), secret)
        .map_err(|_| TokenError::InvalidSignature)?;
    let provided_bytes = URL_SAFE_NO_PAD
        .decode(segments[2])
        .map_err(|_| TokenError::Malformed("signature is not valid base64url".into()))?;

    if !crypto::timing_safe_eq(&expected, &hex::encode(provided_bytes)) {
        return Err(TokenError::InvalidSignature);
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(segments[1])
        .map_err(|_| TokenError::Malformed("payload is not valid base64url".into()))?;
    let claims: RawClaims = serde_json::from_slice(&payload_bytes)
        .map_err(|_| TokenError::Malformed("payload is not valid JSON".into()))?;

    // exp marks the first instant the token is invalid, so the boundary
    // second already rejects. Credential expiry works the other way.
    if let Some(exp) = claims.exp {
        if now.timestamp() >= exp {
            return Err(TokenError::Expired);
        }
    }

    let key_fingerprint = match claims.key_fingerprint {
        Some(fp) if !fp.is_empty() => fp,
        _ => return Err(TokenError::MissingFingerprint),
    };

    Ok(TokenClaims { key_fingerprint, expires_at: claims.exp, subject: claims.sub })
}

/// Mints a bearer token for a key fingerprint.
///
/// Used by the credential issuance path so operators can hand out tokens
/// without a separate tool, and by tests. Issued-at is always set; expiry
/// only when given.
///
/// # Errors
///
/// Returns `TokenError::Malformed` if claim serialization fails, which
/// would require a broken serde setup.
pub fn mint(
    key_fingerprint: &str,
    secret: &str,
    issued_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<String, TokenError> {
    let header = Header { alg: ALGORITHM.to_string(), typ: Some("JWT".to_string()) };
    let claims = RawClaims {
        key_fingerprint: Some(key_fingerprint.to_string()),
        exp: expires_at.map(|t| t.timestamp()),
        iat: Some(issued_at.timestamp()),
        sub: None,
    };

    let header_json = serde_json::to_vec(&header)
        .map_err(|e| TokenError::Malformed(format!("header serialization: {e}")))?;
    let claims_json = serde_json::to_vec(&claims)
        .map_err(|e| TokenError::Malformed(format!("claims serialization: {e}")))?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header_json),
        URL_SAFE_NO_PAD.encode(claims_json)
    );
    let signature_hex = crypto::generate_hmac_hex(signing_input.as_bytes(), secret)
        .map_err(|_| TokenError::InvalidSignature)?;
    let signature_bytes =
        hex::decode(signature_hex).map_err(|e| TokenError::Malformed(e.to_string()))?;

    Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature_bytes)))
}
