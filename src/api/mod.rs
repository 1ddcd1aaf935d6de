//! API layer - HTTP handlers and routing
//!
//! This module contains the HTTP endpoints of both services:
//! - Chat session endpoints (ai-client)
//! - Contract notification endpoints (email-client)
//! - Health endpoint (both)

pub mod health;
pub mod middleware;
pub mod notify;
pub mod sessions;

use axum::{middleware as axum_middleware, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState, MailState, RequestStats};

/// Build the ai-client router with middleware
pub fn build_session_router(state: AppState) -> Router {
    let max_file_size = state.upload_config.max_file_size;

    Router::<AppState>::new()
        .nest("/sessions", sessions::router(max_file_size))
        .merge(health::router::<AppState>())
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn_with_state(
            state.request_stats.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}

/// Build the email-client router with middleware
pub fn build_notify_router(state: MailState) -> Router {
    notify::router()
        .merge(health::router::<MailState>())
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn_with_state(
            state.request_stats.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}

/// Resolves on ctrl-c. If the handler cannot be installed the server keeps
/// running instead of shutting down immediately.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Browser clients call both services cross-origin with credentials
fn cors() -> CorsLayer {
    CorsLayer::very_permissive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;
    use crate::services::chat::testing::FakeBackend;
    use crate::services::SessionStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_counts_requests() {
        let store = Arc::new(SessionStore::new(Duration::from_secs(30)));
        let state = AppState::new(store, Arc::new(FakeBackend::default()), UploadConfig::default());
        let app = build_session_router(state.clone());

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(Request::get("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert_eq!(state.request_stats.total_requests(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_signal_waits_for_ctrl_c() {
        let result =
            tokio::time::timeout(Duration::from_millis(50), shutdown_signal()).await;
        assert!(result.is_err());
    }
}
