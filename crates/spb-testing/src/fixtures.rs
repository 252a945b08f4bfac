//! Builders for credentials, tokens, and request bodies.
//!
//! Credentials go through the production hashing path so integration tests
//! exercise the same verification code the server runs.

use anyhow::{Context, Result};
use axum::{body::Body, http::Request};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use spb_api::{
    auth::{HEADER_API_KEY, HEADER_API_SECRET},
    crypto,
    handlers::create_pages::ENDPOINT,
    token,
};
use spb_core::{storage::credentials::NewCredential, Credential, CredentialStatus, Storage};

/// A stored credential together with its plaintext key and secret.
///
/// The plaintext pair exists only here; the database keeps hashes.
pub struct IssuedCredential {
    /// The stored row, as the server sees it.
    pub credential: Credential,
    /// Plaintext API key.
    pub key: String,
    /// Plaintext API secret.
    pub secret: String,
}

impl IssuedCredential {
    /// Mints a bearer token for this credential, valid for one hour.
    pub fn bearer_token(&self, jwt_secret: &str, now: DateTime<Utc>) -> String {
        token::mint(
            &self.credential.key_fingerprint,
            jwt_secret,
            now,
            Some(now + Duration::hours(1)),
        )
        .expect("token minting only fails on broken serialization")
    }
}

/// Builds credentials through the production issuance path.
pub struct CredentialBuilder {
    name: String,
    expires_at: Option<DateTime<Utc>>,
    revoked: bool,
}

impl CredentialBuilder {
    /// Starts a builder for an active, non-expiring credential.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), expires_at: None, revoked: false }
    }

    /// Sets a hard expiry on the credential.
    pub fn expires_at(mut self, when: DateTime<Utc>) -> Self {
        self.expires_at = Some(when);
        self
    }

    /// Stores the credential already revoked.
    pub fn revoked(mut self) -> Self {
        self.revoked = true;
        self
    }

    /// Generates a key pair, hashes it, and stores the credential.
    pub async fn create(self, storage: &Storage) -> Result<IssuedCredential> {
        let key = crypto::generate_key();
        let secret = crypto::generate_secret();

        let new = NewCredential {
            name: self.name,
            key_hash: crypto::hash_credential(&key).context("key hashing failed")?,
            secret_hash: crypto::hash_credential(&secret).context("secret hashing failed")?,
            key_fingerprint: crypto::fingerprint(&key),
            secret_fingerprint: crypto::fingerprint(&secret),
            key_hint: crypto::key_hint(&key),
            expires_at: self.expires_at,
        };

        let mut credential = storage.credentials.create(&new).await?;
        if self.revoked {
            storage.credentials.set_status(credential.id, CredentialStatus::Revoked).await?;
            credential.status = CredentialStatus::Revoked;
        }

        Ok(IssuedCredential { credential, key, secret })
    }
}

/// Body with one page per title, no content or slug.
pub fn pages_body(titles: &[&str]) -> Value {
    json!({ "pages": titles.iter().map(|title| json!({ "title": title })).collect::<Vec<_>>() })
}

/// A single fully specified page item.
pub fn page_item(title: &str, content: &str, slug: Option<&str>) -> Value {
    match slug {
        Some(slug) => json!({ "title": title, "content": content, "slug": slug }),
        None => json!({ "title": title, "content": content }),
    }
}

/// POST to the batch endpoint authenticated with a key/secret pair.
pub fn api_key_request(key: &str, secret: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(ENDPOINT)
        .header("content-type", "application/json")
        .header(HEADER_API_KEY, key)
        .header(HEADER_API_SECRET, secret)
        .body(Body::from(body.to_string()))
        .expect("request construction")
}

/// POST to the batch endpoint authenticated with a bearer token.
pub fn bearer_request(token: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(ENDPOINT)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .expect("request construction")
}

/// POST to the batch endpoint with no authentication at all.
pub fn anonymous_request(body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(ENDPOINT)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request construction")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_body_carries_one_item_per_title() {
        let body = pages_body(&["First", "Second"]);

        let items = body["pages"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["title"], "First");
        assert_eq!(items[1]["title"], "Second");
    }

    #[test]
    fn page_item_omits_absent_slug() {
        let without = page_item("Title", "Content", None);
        let with = page_item("Title", "Content", Some("custom"));

        assert!(without.get("slug").is_none());
        assert_eq!(with["slug"], "custom");
    }
}
