use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    pub active_legs: usize,
    pub active_batches: usize,
}

/// Liveness probe with a glimpse of the simulation load.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "up",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: state.orchestrator.clock().now().to_rfc3339(),
        active_legs: state.orchestrator.scheduler().active_legs(),
        active_batches: state.orchestrator.active_batches().len(),
    })
}
