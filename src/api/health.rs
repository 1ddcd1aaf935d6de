//! Liveness probe shared by both services

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::middleware::RequestStats;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub avg_response_time_ms: f64,
}

/// Build the health router for any state that exposes request statistics
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    Arc<RequestStats>: axum::extract::FromRef<S>,
{
    Router::new().route("/health", get(health))
}

/// GET /health
async fn health(State(stats): State<Arc<RequestStats>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: stats.uptime_seconds(),
        total_requests: stats.total_requests(),
        avg_response_time_ms: stats.avg_response_time_us() / 1000.0,
    })
}
