use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use matcha_shared::{HealthCheck, HealthResponse, HealthStatus};

use crate::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let mut checks = Vec::new();
    if let Some(db) = &state.database {
        checks.push(match db.ping() {
            Ok(()) => HealthCheck::passed("database"),
            Err(e) => HealthCheck::failed("database", e.public_message()),
        });
    }

    let response = HealthResponse::healthy("matcha-social", env!("CARGO_PKG_VERSION")).with_checks(checks);
    let status = match response.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(response)).into_response()
}

/// Returns Prometheus metrics.
pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}
