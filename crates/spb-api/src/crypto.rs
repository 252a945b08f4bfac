//! Cryptographic primitives for credential handling and payload signing.
//!
//! Covers the full credential lifecycle: random key material at issuance,
//! Argon2id hashes for verification, SHA-256 fingerprints for lookup, and
//! HMAC-SHA256 for webhook signatures and bearer tokens. Nothing here
//! stores plaintext secrets.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Prefix on every issued API key.
const KEY_PREFIX: &str = "spb_";

/// Cryptographic operation errors.
#[derive(Debug, Clone, Error)]
pub enum CryptoError {
    /// Password hashing or parsing failed.
    #[error("hash operation failed: {0}")]
    Hash(String),

    /// HMAC key setup rejected the secret.
    #[error("invalid signing secret")]
    InvalidSecret,
}

/// Generates a fresh API key.
///
/// Format is `spb_` followed by 32 hex characters (16 random bytes). The
/// prefix makes keys greppable in logs and config without revealing
/// anything about their value.
pub fn generate_key() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    format!("{KEY_PREFIX}{}", hex::encode(bytes))
}

/// Generates a fresh API secret: 64 hex characters (32 random bytes).
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes)
}

/// Computes the deterministic fingerprint of a credential value.
///
/// SHA-256 hex digest. Fingerprints are lookup indexes, never proof of
/// possession; possession is only established by Argon2 verification
/// against the stored hash.
pub fn fingerprint(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(digest)
}

/// Hashes a credential value for storage using Argon2id.
///
/// Returns a PHC-format string embedding the salt and parameters.
///
/// # Errors
///
/// Returns `CryptoError::Hash` if hashing fails.
pub fn hash_credential(value: &str) -> Result<String, CryptoError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(value.as_bytes(), &salt)
        .map_err(|e| CryptoError::Hash(e.to_string()))?;

    Ok(hash.to_string())
}

/// Verifies a credential value against a stored Argon2id hash.
///
/// Unparseable hashes verify as false rather than erroring, so corrupt
/// rows reject authentication instead of breaking it.
pub fn verify_credential(value: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };

    Argon2::default().verify_password(value.as_bytes(), &parsed).is_ok()
}

/// Builds the operator display hint for a key: first and last four
/// characters joined by an ellipsis.
///
/// Keys shorter than eight characters are masked entirely.
pub fn key_hint(key: &str) -> String {
    if key.len() < 8 {
        return "****".to_string();
    }

    format!("{}...{}", &key[..4], &key[key.len() - 4..])
}

/// Generates an HMAC-SHA256 signature as a lowercase hex string.
///
/// Used for both webhook payload signatures and bearer token verification.
///
/// # Errors
///
/// Returns `CryptoError::InvalidSecret` if the key setup fails.
pub fn generate_hmac_hex(payload: &[u8], secret: &str) -> Result<String, CryptoError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| CryptoError::InvalidSecret)?;

    mac.update(payload);
    let result = mac.finalize();
    Ok(hex::encode(result.into_bytes()))
}

/// Timing-safe string comparison.
///
/// Constant-time over the shared length to avoid leaking the expected
/// value through timing analysis.
pub fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (a_byte, b_byte) in a.as_bytes().iter().zip(b.as_bytes()) {
        result |= a_byte ^ b_byte;
    }

    result == 0
}
