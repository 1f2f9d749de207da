//! Health check handlers for service monitoring.
//!
//! `/health` checks the event store, `/live` only proves the process
//! answers, and `/integrations/health` asks every loaded adapter.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use staffsync_core::Clock;
use staffsync_delivery::{AdapterHealthReport, EventStore};
use tracing::{debug, error, instrument};

use crate::AppState;

/// Health check response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service health status
    pub status: HealthStatus,
    /// Timestamp when health check was performed
    pub timestamp: DateTime<Utc>,
    /// Individual component health checks
    pub checks: HealthChecks,
    /// Service version information
    pub version: String,
}

/// Overall health status enumeration.
#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Healthy,
    /// Some integrations are failing
    Degraded,
    /// Critical systems failing
    Unhealthy,
}

/// Individual component health check results.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Event store connectivity
    pub database: ComponentHealth,
}

/// Health status for individual components.
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    /// Component status
    pub status: ComponentStatus,
    /// Optional error message if unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Response time in milliseconds
    pub response_time_ms: u64,
}

/// Component-level health status.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is healthy
    Up,
    /// Component is experiencing issues
    Down,
}

/// Health service that encapsulates the clock for testable health checks.
pub struct HealthService {
    clock: Arc<dyn Clock>,
}

impl HealthService {
    /// Creates a new health service with the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Checks the event store.
    pub async fn health_check(&self, store: &dyn EventStore) -> HealthResponse {
        debug!("Performing health check");

        let timestamp = self.clock.now_utc();
        let start_time = self.clock.now();

        let (status, message) = match store.health_check().await {
            Ok(()) => (ComponentStatus::Up, None),
            Err(e) => {
                error!("Event store health check failed: {}", e);
                (ComponentStatus::Down, Some(format!("Event store unavailable: {e}")))
            },
        };
        let elapsed = self.clock.now().saturating_duration_since(start_time);

        let overall = match status {
            ComponentStatus::Up => HealthStatus::Healthy,
            ComponentStatus::Down => HealthStatus::Unhealthy,
        };

        HealthResponse {
            status: overall,
            timestamp,
            checks: HealthChecks {
                database: ComponentHealth {
                    status,
                    message,
                    response_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                },
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Health check endpoint handler.
#[instrument(name = "health_check", skip(app_state))]
pub async fn health_check(State(app_state): State<AppState>) -> Response {
    let health_service = HealthService::new(app_state.clock.clone());
    let response = health_service.health_check(app_state.store.as_ref()).await;

    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    debug!(status = ?response.status, "Health check completed");

    (status_code, Json(response)).into_response()
}

/// Liveness check endpoint.
///
/// Does not touch external dependencies.
#[instrument(name = "liveness_check", skip(app_state))]
pub async fn liveness_check(State(app_state): State<AppState>) -> Response {
    let response = serde_json::json!({
        "status": "alive",
        "timestamp": app_state.clock.now_utc(),
        "service": "staffsync-api"
    });

    (StatusCode::OK, Json(response)).into_response()
}

/// Aggregate health of the loaded integrations.
#[derive(Debug, Serialize)]
pub struct IntegrationsHealth {
    /// `healthy` when every adapter is, `degraded` otherwise.
    pub status: HealthStatus,
    /// Per-adapter reports.
    pub adapters: Vec<AdapterHealthReport>,
}

/// Probes every loaded adapter.
///
/// Always answers `200 OK`; an unhealthy integration degrades the report
/// without failing the check.
#[instrument(name = "integrations_health", skip(app_state))]
pub async fn integrations_health(State(app_state): State<AppState>) -> Json<IntegrationsHealth> {
    let adapters = app_state.registry.health_check_all().await;
    let status = if adapters.iter().all(|report| report.healthy) {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    debug!(adapters = adapters.len(), status = ?status, "Integration health check completed");

    Json(IntegrationsHealth { status, adapters })
}
