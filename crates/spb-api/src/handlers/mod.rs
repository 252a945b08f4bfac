//! HTTP request handlers for the page creation gateway.
//!
//! Handlers are grouped by functionality:
//! - `create_pages` - the batch creation endpoint and its orchestration
//! - `health` - health check and readiness probes
//!
//! Every handler follows the same pattern: extract request metadata,
//! validate gate by gate with standardized error responses, and trace
//! the outcome with the request's correlation id.

use std::{convert::Infallible, net::SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use spb_core::RequestId;

pub mod create_pages;
pub mod health;

pub use create_pages::create_pages;
pub use health::{health_check, liveness_check, readiness_check};

/// Per-request metadata resolved before a handler body runs.
///
/// The correlation id comes from the request-id middleware when mounted,
/// so the id in the response body matches the `X-Request-Id` header; a
/// fresh id is generated when the middleware is absent. The client IP
/// prefers proxy headers over the socket peer.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    /// Correlation id threaded through audit rows and webhook payloads.
    pub request_id: RequestId,
    /// Resolved client address, if any.
    pub client_ip: Option<String>,
    /// Caller's User-Agent header, if any.
    pub user_agent: Option<String>,
}

impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Infallible> {
        let request_id =
            parts.extensions.get::<RequestId>().cloned().unwrap_or_else(RequestId::generate);

        let peer = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|info| info.0);

        Ok(Self {
            request_id,
            client_ip: resolve_client_ip(&parts.headers, peer),
            user_agent: header_string(&parts.headers, "user-agent"),
        })
    }
}

/// Resolves the client address: `X-Forwarded-For` first entry, then
/// `X-Real-IP`, then the connection's peer address.
fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }

    if let Some(real_ip) = header_string(headers, "x-real-ip") {
        return Some(real_ip);
    }

    peer.map(|addr| addr.ip().to_string())
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
