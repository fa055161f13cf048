//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use ticket_relay_runtime::{ConnectionPhase, HealthCheck, HealthStatus};

/// Static liveness body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Always `"ok"`
    pub status: String,
    /// Service banner
    pub message: String,
}

/// Readiness body.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Whether the service can accept tickets right now
    pub ready: bool,
    /// Current broker connection lifecycle
    pub connection: ConnectionPhase,
}

/// Simple health check endpoint.
///
/// Returns 200 OK to indicate the process is running. Does NOT check the
/// broker.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "ok",
///   "message": "CRM Backend Service is running"
/// }
/// ```
#[allow(clippy::unused_async)]
pub async fn health() -> Json<ServiceStatus> {
    Json(ServiceStatus {
        status: "ok".to_string(),
        message: "CRM Backend Service is running".to_string(),
    })
}

/// Readiness check based on the cached connection state.
///
/// Never touches the network.
///
/// # Status Codes
///
/// - 200 OK: connected to the broker
/// - 503 Service Unavailable: disconnected, reconnecting or closed
///
/// # Endpoint
///
/// ```text
/// GET /health/ready
/// ```
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let ready = state.client.is_connected();
    let connection = state.client.phase().await;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(ReadinessResponse { ready, connection }))
}

/// Active broker probe.
///
/// Passively inspects the ticket queue, which tells "socket open" apart from
/// "broker answering".
///
/// # Status Codes
///
/// - 200 OK: Healthy or Degraded
/// - 503 Service Unavailable: Unhealthy
///
/// # Endpoint
///
/// ```text
/// GET /health/live
/// ```
///
/// # Response
///
/// ```json
/// {
///   "component": "broker",
///   "status": "healthy",
///   "metadata": [["queue", "support_tickets_queue"], ["messages", "0"], ["consumers", "1"]],
///   "checked_at": "2025-01-01T00:00:00Z"
/// }
/// ```
pub async fn liveness(State(state): State<AppState>) -> (StatusCode, Json<HealthCheck>) {
    let check = state.client.health().await;

    let status = match check.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(check))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_health_check() {
        let Json(body) = health().await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.message, "CRM Backend Service is running");
    }
}
