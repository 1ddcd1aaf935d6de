//! API middleware and shared state
//!
//! Contains:
//! - Application state for both services
//! - The API error envelope and its status mapping
//! - Request statistics middleware

use axum::{
    extract::{FromRef, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::UploadConfig;
use crate::services::{
    ChatDispatcher, ChatError, DocumentUploader, EmailService, GenerativeBackend, SessionError,
    SessionStore,
};

// ============================================================================
// Request Statistics
// ============================================================================

/// Lightweight request statistics using atomic operations (no locks)
pub struct RequestStats {
    /// Total number of requests processed
    total_requests: AtomicU64,
    /// Total response time in microseconds (for calculating average)
    total_response_time_us: AtomicU64,
    /// Application start time
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a request with its response time
    pub fn record(&self, duration_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Average response time in microseconds
    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let total_time = self.total_response_time_us.load(Ordering::Relaxed);
        total_time as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Application State
// ============================================================================

/// State shared by the chat session handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub chat: Arc<ChatDispatcher>,
    pub uploader: Arc<DocumentUploader>,
    pub upload_config: Arc<UploadConfig>,
    pub request_stats: Arc<RequestStats>,
}

impl AppState {
    /// Wire the chat services around one store and one backend
    pub fn new(
        sessions: Arc<SessionStore>,
        backend: Arc<dyn GenerativeBackend>,
        upload_config: UploadConfig,
    ) -> Self {
        Self {
            chat: Arc::new(ChatDispatcher::new(sessions.clone(), backend.clone())),
            uploader: Arc::new(DocumentUploader::new(sessions.clone(), backend)),
            sessions,
            upload_config: Arc::new(upload_config),
            request_stats: Arc::new(RequestStats::new()),
        }
    }
}

/// State shared by the notification handlers
#[derive(Clone)]
pub struct MailState {
    pub email_service: Arc<EmailService>,
    pub request_stats: Arc<RequestStats>,
}

impl MailState {
    pub fn new(email_service: Arc<EmailService>) -> Self {
        Self {
            email_service,
            request_stats: Arc::new(RequestStats::new()),
        }
    }
}

impl FromRef<AppState> for Arc<RequestStats> {
    fn from_ref(state: &AppState) -> Self {
        state.request_stats.clone()
    }
}

impl FromRef<MailState> for Arc<RequestStats> {
    fn from_ref(state: &MailState) -> Self {
        state.request_stats.clone()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    /// The session is unusable (unknown, ended or expired)
    pub fn gone(message: impl Into<String>) -> Self {
        Self::new("GONE", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new("PAYLOAD_TOO_LARGE", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "GONE" => StatusCode::GONE,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "PAYLOAD_TOO_LARGE" => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound => ApiError::gone("invalid_or_expired_session"),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Session(e) => e.into(),
            // Details are logged where the call failed; clients get an opaque error
            ChatError::Backend(_) => ApiError::internal_error("generative_backend_error"),
        }
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Request statistics middleware
///
/// Records request count and response time for the health endpoint.
pub async fn request_stats_middleware(
    State(stats): State<Arc<RequestStats>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    stats.record(start.elapsed().as_micros() as u64);
    response
}
