//! Health check handlers for service monitoring.
//!
//! Liveness, readiness, and health endpoints with a database connectivity
//! probe, shaped for orchestration systems and load balancers.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use spb_core::{Clock, Storage};
use tracing::{debug, error, instrument};

use crate::AppState;

/// Health check response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service health status.
    pub status: HealthStatus,
    /// Timestamp when the health check was performed.
    pub timestamp: DateTime<Utc>,
    /// Individual component health checks.
    pub checks: HealthChecks,
    /// Service version information.
    pub version: String,
}

/// Overall health status enumeration.
#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational.
    Healthy,
    /// Some non-critical issues detected.
    Degraded,
    /// Critical systems failing.
    Unhealthy,
}

/// Individual component health check results.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Database connectivity and basic query test.
    pub database: ComponentHealth,
}

/// Health status for individual components.
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    /// Component status.
    pub status: ComponentStatus,
    /// Optional error message if unhealthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Response time in milliseconds.
    pub response_time_ms: u64,
}

/// Component-level health status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is healthy.
    Up,
    /// Component is experiencing issues.
    Down,
}

/// Health service that encapsulates the clock dependency so probe timing
/// is testable.
pub struct HealthService {
    clock: Arc<dyn Clock>,
}

impl HealthService {
    /// Creates a new health service with the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Performs the full service health check.
    pub async fn health_check(&self, storage: &Storage) -> HealthResponse {
        debug!("performing health check");

        let timestamp = self.clock.now_utc();
        let start_time = self.clock.now();

        let db_health = self.check_database_health(storage).await;
        let db_duration = self.clock.now().duration_since(start_time);

        let overall_status = match db_health.status {
            ComponentStatus::Up => HealthStatus::Healthy,
            ComponentStatus::Down => HealthStatus::Unhealthy,
        };

        HealthResponse {
            status: overall_status,
            timestamp,
            checks: HealthChecks {
                database: ComponentHealth {
                    status: db_health.status,
                    message: db_health.message,
                    response_time_ms: u64::try_from(db_duration.as_millis()).unwrap_or(u64::MAX),
                },
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Checks database connectivity with a lightweight query.
    async fn check_database_health(&self, storage: &Storage) -> DatabaseHealth {
        match storage.health_check().await {
            Ok(()) => {
                debug!("database health check passed");
                DatabaseHealth { status: ComponentStatus::Up, message: None }
            },
            Err(probe_error) => {
                error!("database health check failed: {probe_error}");
                DatabaseHealth {
                    status: ComponentStatus::Down,
                    message: Some(format!("Database connection failed: {probe_error}")),
                }
            },
        }
    }
}

/// Internal structure for database health check results.
struct DatabaseHealth {
    status: ComponentStatus,
    message: Option<String>,
}

/// Health check endpoint handler.
///
/// Called frequently by orchestration systems and load balancers, so it
/// avoids expensive operations.
#[instrument(name = "health_check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Response {
    let service = HealthService::new(state.clock.clone());
    let response = service.health_check(&state.storage).await;

    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    debug!(
        status = ?response.status,
        db_status = ?response.checks.database.status,
        "health check completed"
    );

    (status_code, Json(response)).into_response()
}

/// Readiness check endpoint for orchestrator probes.
///
/// Ready means the service can do useful work, which for this gateway is
/// the same question the health check answers.
#[instrument(name = "readiness_check", skip(state))]
pub async fn readiness_check(State(state): State<AppState>) -> Response {
    health_check(State(state)).await
}

/// Liveness check endpoint for orchestrator probes.
///
/// A minimal check that does not touch external dependencies; it only
/// confirms the HTTP server is responding.
#[instrument(name = "liveness_check", skip(state))]
pub async fn liveness_check(State(state): State<AppState>) -> Response {
    debug!("performing liveness check");

    let response = serde_json::json!({
        "status": "alive",
        "timestamp": state.clock.now_utc(),
        "service": "spb-api"
    });

    (StatusCode::OK, Json(response)).into_response()
}
