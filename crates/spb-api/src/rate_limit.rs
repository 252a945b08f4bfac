//! Per-credential fixed-window rate limiting.
//!
//! Every credential gets an hourly window. The check and the consume are
//! one atomic operation against the backing store, so two racing requests
//! cannot both take the final slot. Two stores exist: an in-process map
//! (default; counters reset on restart, which only ever under-counts) and
//! a Postgres-backed store for deployments that need windows to survive
//! restarts or span replicas.

use std::{collections::HashMap, fmt, future::Future, pin::Pin, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use spb_core::{Clock, CredentialId, RateDecision, RateWindow, Storage};

/// Fixed window length in seconds.
pub const WINDOW_SECS: i64 = 3600;

/// Rate limiting errors.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The backing store failed.
    #[error("rate store error: {0}")]
    Store(String),
}

/// Which rate store backs the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateStoreKind {
    /// In-process map. Windows reset on restart.
    Memory,
    /// Postgres-backed windows shared across processes.
    Postgres,
}

impl fmt::Display for RateStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Postgres => write!(f, "postgres"),
        }
    }
}

/// Storage backend for rate windows.
///
/// Implementations must make `check_and_consume` atomic with respect to
/// concurrent calls for the same credential.
pub trait RateStore: Send + Sync {
    /// Atomically checks the window and consumes one slot if allowed.
    fn check_and_consume(
        &self,
        credential_id: CredentialId,
        limit: i64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<RateDecision, RateLimitError>> + Send + '_>>;

    /// Clears the window for one credential.
    fn reset(
        &self,
        credential_id: CredentialId,
    ) -> Pin<Box<dyn Future<Output = Result<(), RateLimitError>> + Send + '_>>;

    /// Removes windows that expired before `now`, returning how many.
    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, RateLimitError>> + Send + '_>>;
}

/// In-process rate store backed by a mutex-guarded map.
///
/// The mutex spans the whole check-then-record sequence, which is what
/// makes the operation atomic.
#[derive(Clone, Default)]
pub struct MemoryRateStore {
    windows: Arc<Mutex<HashMap<CredentialId, RateWindow>>>,
}

impl MemoryRateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a window without consuming. Test and inspection helper.
    pub fn window(&self, credential_id: CredentialId) -> Option<RateWindow> {
        self.windows.lock().get(&credential_id).copied()
    }

    fn decide(
        &self,
        credential_id: CredentialId,
        limit: i64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> RateDecision {
        let mut windows = self.windows.lock();

        match windows.get_mut(&credential_id) {
            Some(entry) if entry.reset_at > now => {
                if entry.count >= limit {
                    RateDecision { allowed: false, remaining: 0, reset_at: entry.reset_at }
                } else {
                    entry.count += 1;
                    RateDecision {
                        allowed: true,
                        remaining: (limit - entry.count).max(0),
                        reset_at: entry.reset_at,
                    }
                }
            }
            _ => {
                let reset_at = now + window;
                windows.insert(credential_id, RateWindow { count: 1, reset_at });
                RateDecision { allowed: true, remaining: (limit - 1).max(0), reset_at }
            }
        }
    }
}

impl RateStore for MemoryRateStore {
    fn check_and_consume(
        &self,
        credential_id: CredentialId,
        limit: i64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<RateDecision, RateLimitError>> + Send + '_>> {
        let decision = self.decide(credential_id, limit, window, now);
        Box::pin(async move { Ok(decision) })
    }

    fn reset(
        &self,
        credential_id: CredentialId,
    ) -> Pin<Box<dyn Future<Output = Result<(), RateLimitError>> + Send + '_>> {
        self.windows.lock().remove(&credential_id);
        Box::pin(async move { Ok(()) })
    }

    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, RateLimitError>> + Send + '_>> {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, w| w.reset_at > now);
        let removed = (before - windows.len()) as u64;
        Box::pin(async move { Ok(removed) })
    }
}

/// Postgres-backed rate store.
///
/// Delegates to the rate window repository, which serializes concurrent
/// checks with a row lock.
pub struct PostgresRateStore {
    storage: Storage,
}

impl PostgresRateStore {
    /// Creates a store over the given storage.
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

impl RateStore for PostgresRateStore {
    fn check_and_consume(
        &self,
        credential_id: CredentialId,
        limit: i64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<RateDecision, RateLimitError>> + Send + '_>> {
        let repo = self.storage.rate_windows.clone();
        Box::pin(async move {
            repo.check_and_consume(credential_id, limit, window, now)
                .await
                .map_err(|e| RateLimitError::Store(e.to_string()))
        })
    }

    fn reset(
        &self,
        credential_id: CredentialId,
    ) -> Pin<Box<dyn Future<Output = Result<(), RateLimitError>> + Send + '_>> {
        let repo = self.storage.rate_windows.clone();
        Box::pin(async move {
            repo.reset(credential_id).await.map_err(|e| RateLimitError::Store(e.to_string()))
        })
    }

    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, RateLimitError>> + Send + '_>> {
        let repo = self.storage.rate_windows.clone();
        Box::pin(async move {
            repo.purge_expired(now).await.map_err(|e| RateLimitError::Store(e.to_string()))
        })
    }
}

/// Fixed-window limiter owning the rate policy.
///
/// The store holds counters; the limiter holds the limit and window
/// length. Limits below 1 are clamped to 1 so a misconfigured limit
/// throttles instead of blocking everything.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateStore>,
    limit: i64,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Creates a limiter with the hourly window.
    pub fn new(store: Arc<dyn RateStore>, limit: i64, clock: Arc<dyn Clock>) -> Self {
        Self { store, limit: limit.max(1), window: Duration::seconds(WINDOW_SECS), clock }
    }

    /// The effective per-window limit.
    pub fn limit(&self) -> i64 {
        self.limit
    }

    /// Checks the window for a credential, consuming one slot if allowed.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError::Store` if the backing store fails.
    pub async fn check(&self, credential_id: CredentialId) -> Result<RateDecision, RateLimitError> {
        self.store.check_and_consume(credential_id, self.limit, self.window, self.clock.now_utc()).await
    }

    /// Clears the window for one credential.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError::Store` if the backing store fails.
    pub async fn reset(&self, credential_id: CredentialId) -> Result<(), RateLimitError> {
        self.store.reset(credential_id).await
    }

    /// Sweeps expired windows from the store.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError::Store` if the backing store fails.
    pub async fn purge_expired(&self) -> Result<u64, RateLimitError> {
        self.store.purge_expired(self.clock.now_utc()).await
    }
}
