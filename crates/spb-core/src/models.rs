//! Core domain models and strongly-typed identifiers.
//!
//! Defines credentials, created pages, audit entries, webhook delivery
//! records, and newtype ID wrappers for compile-time type safety. Includes
//! database serialization traits for the Postgres repositories.

use std::{cmp::Ordering, fmt};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Strongly-typed credential identifier.
///
/// Wraps the database row id to prevent mixing with other integer ids.
/// Callers never see credential ids on the wire; they exist for storage
/// lookups, rate-window keys, and audit correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialId(pub i64);

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for CredentialId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl PartialEq<i64> for CredentialId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl PartialOrd<i64> for CredentialId {
    fn partial_cmp(&self, other: &i64) -> Option<Ordering> {
        self.0.partial_cmp(other)
    }
}

impl sqlx::Type<PgDb> for CredentialId {
    fn type_info() -> PgTypeInfo {
        <i64 as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for CredentialId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let id = <i64 as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(id))
    }
}

impl sqlx::Encode<'_, PgDb> for CredentialId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <i64 as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed page identifier.
///
/// Identifies a content record created through the batch endpoint. Exposed
/// to callers in responses and webhook payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub i64);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl sqlx::Type<PgDb> for PageId {
    fn type_info() -> PgTypeInfo {
        <i64 as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for PageId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let id = <i64 as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(id))
    }
}

impl sqlx::Encode<'_, PgDb> for PageId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <i64 as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Request correlation identifier.
///
/// Format is `req_` followed by 12 lowercase hex characters. One id is
/// generated per inbound request and threads through the audit log, the
/// webhook payload, and the delivery record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generates a fresh random request id.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let bytes: [u8; 6] = rng.random();
        Self(format!("req_{}", hex::encode(bytes)))
    }

    /// Wraps an existing id without validation.
    ///
    /// Used by tests and by storage reads where the value was produced by
    /// `generate` earlier.
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl sqlx::Type<PgDb> for RequestId {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for RequestId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <String as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(s))
    }
}

impl sqlx::Encode<'_, PgDb> for RequestId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Credential lifecycle status.
///
/// Credentials are never physically deleted: revocation flips the status
/// and restoration flips it back. Authentication honors the status before
/// any hash verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    /// Credential may authenticate requests.
    Active,
    /// Credential is soft-disabled; authentication rejects with 403.
    Revoked,
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Revoked => write!(f, "revoked"),
        }
    }
}

impl sqlx::Type<PgDb> for CredentialStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for CredentialStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "active" => Ok(Self::Active),
            "revoked" => Ok(Self::Revoked),
            _ => Err(format!("invalid credential status: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for CredentialStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// An issued API credential.
///
/// Secret material is never stored in recoverable form: `key_hash` and
/// `secret_hash` are salted one-way hashes used for verification, and the
/// fingerprints are deterministic SHA-256 digests used purely as lookup
/// keys. The fingerprint is an index, not proof of possession.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Credential {
    /// Unique identifier for this credential.
    pub id: CredentialId,

    /// Operator-facing label.
    pub name: String,

    /// Salted one-way hash of the API key.
    pub key_hash: String,

    /// Salted one-way hash of the API secret.
    pub secret_hash: String,

    /// Deterministic fingerprint of the API key (lookup index).
    pub key_fingerprint: String,

    /// Deterministic fingerprint of the API secret.
    pub secret_fingerprint: String,

    /// Display hint for operators: first and last four characters of the
    /// issued key.
    pub key_hint: String,

    /// Soft-delete lifecycle status.
    pub status: CredentialStatus,

    /// When this credential was issued.
    pub created_at: DateTime<Utc>,

    /// Optional hard expiry. Past this instant the credential rejects with
    /// 403 regardless of status.
    pub expires_at: Option<DateTime<Utc>>,

    /// Last successful authenticated request.
    pub last_used_at: Option<DateTime<Utc>>,

    /// Lifetime count of authenticated requests.
    pub request_count: i64,

    /// Client IP observed on the most recent request.
    pub last_ip: Option<String>,
}

impl Credential {
    /// Whether the credential is past its expiry at `now`.
    ///
    /// Credentials without an expiry never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| now > expires)
    }
}

/// Which authentication scheme the gateway accepts.
///
/// Selected by configuration, never negotiated per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Paired `X-SPB-API-Key` / `X-SPB-API-Secret` headers.
    ApiKey,
    /// HS256 bearer token carrying a key-fingerprint claim.
    Jwt,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey => write!(f, "api_key"),
            Self::Jwt => write!(f, "jwt"),
        }
    }
}

/// Summary of one successfully created page.
///
/// Appears in API responses, webhook payloads, and bookkeeping rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPage {
    /// Identifier of the new record.
    pub id: PageId,
    /// Title after markup stripping.
    pub title: String,
    /// Public URL of the record.
    pub url: String,
}

/// A per-item batch failure.
///
/// `index` refers to the item's zero-based position in the submitted
/// `pages` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    /// Zero-based index into the submitted batch.
    pub index: usize,
    /// Human-readable failure reason.
    pub message: String,
}

/// Terminal classification of a request, recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestResult {
    /// Every batch item was created.
    Success,
    /// No batch item was created, or a pre-batch gate failed validation.
    Failed,
    /// Some but not all items were created.
    PartialSuccess,
    /// Authentication rejected the request.
    AuthFailed,
    /// The rate limiter rejected the request.
    RateLimited,
}

impl fmt::Display for RequestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::PartialSuccess => write!(f, "partial_success"),
            Self::AuthFailed => write!(f, "auth_failed"),
            Self::RateLimited => write!(f, "rate_limited"),
        }
    }
}

impl sqlx::Type<PgDb> for RequestResult {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for RequestResult {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "partial_success" => Ok(Self::PartialSuccess),
            "auth_failed" => Ok(Self::AuthFailed),
            "rate_limited" => Ok(Self::RateLimited),
            _ => Err(format!("invalid request result: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for RequestResult {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// One audit-log row. Exactly one is written per request that clears the
/// body-shape gate (plus one for every auth or rate-limit rejection).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditEntry {
    /// Row id.
    pub id: i64,

    /// Correlation id, shared with the response and webhook payload.
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

    /// Empty on full success, otherwise a JSON dump of per-item errors or
    /// the rejection message.
    pub message: String,

    /// Count of successfully created items.
    pub pages_created: i32,

    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

/// Final status of a webhook dispatch sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Some attempt completed with a 2xx response.
    Success,
    /// Every attempt in the budget failed.
    Failed,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl sqlx::Type<PgDb> for DeliveryStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for DeliveryStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid delivery status: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for DeliveryStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// Record of one completed webhook dispatch sequence.
///
/// Written exactly once after the retry loop finishes, successful or not.
/// Never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookDelivery {
    /// Row id.
    pub id: i64,

    /// Correlation id of the originating request.
    pub request_id: RequestId,

    /// Destination the dispatch was sent to.
    pub url: String,

    /// Final outcome of the attempt sequence.
    pub status: DeliveryStatus,

    /// Last HTTP status observed; 0 if no attempt ever connected.
    pub http_code: i32,

    /// Total attempts made (1 to the configured budget).
    pub attempts: i32,

    /// Snapshot of the last response body, or the transport error message.
    pub response_body: String,

    /// When the record was written.
    pub created_at: DateTime<Utc>,
}

/// Per-credential fixed-window counter state.
///
/// Ephemeral by default; reconstructing the window as empty is always safe
/// (the limiter fails open to "window just started").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Requests consumed in the current window.
    pub count: i64,
    /// Absolute instant the window expires.
    pub reset_at: DateTime<Utc>,
}

/// Outcome of one atomic check-and-consume against a rate window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests left in the window after this decision.
    pub remaining: i64,
    /// When the current window expires.
    pub reset_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn request_id_has_expected_shape() {
        let id = RequestId::generate();
        let s = id.as_str();
        assert!(s.starts_with("req_"));
        assert_eq!(s.len(), 16);
        assert!(s[4..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn request_ids_are_unique_enough() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn credential_status_display_matches_storage_format() {
        assert_eq!(CredentialStatus::Active.to_string(), "active");
        assert_eq!(CredentialStatus::Revoked.to_string(), "revoked");
    }

    #[test]
    fn request_result_display_matches_storage_format() {
        assert_eq!(RequestResult::Success.to_string(), "success");
        assert_eq!(RequestResult::Failed.to_string(), "failed");
        assert_eq!(RequestResult::PartialSuccess.to_string(), "partial_success");
        assert_eq!(RequestResult::AuthFailed.to_string(), "auth_failed");
        assert_eq!(RequestResult::RateLimited.to_string(), "rate_limited");
    }

    #[test]
    fn credential_without_expiry_never_expires() {
        let credential = sample_credential(None);
        let far_future = Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).single().unwrap();
        assert!(!credential.is_expired(far_future));
    }

    #[test]
    fn credential_expiry_is_exclusive_at_the_boundary() {
        let expires = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).single().unwrap();
        let credential = sample_credential(Some(expires));

        assert!(!credential.is_expired(expires));
        assert!(credential.is_expired(expires + chrono::Duration::seconds(1)));
    }

    fn sample_credential(expires_at: Option<DateTime<Utc>>) -> Credential {
        Credential {
            id: CredentialId(1),
            name: "test".into(),
            key_hash: String::new(),
            secret_hash: String::new(),
            key_fingerprint: String::new(),
            secret_fingerprint: String::new(),
            key_hint: String::new(),
            status: CredentialStatus::Active,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().unwrap(),
            expires_at,
            last_used_at: None,
            request_count: 0,
            last_ip: None,
        }
    }
}
