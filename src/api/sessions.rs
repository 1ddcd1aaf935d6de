//! Chat session API endpoints
//!
//! - POST /sessions/start   - upload a document and open a session
//! - GET  /sessions/poll    - check whether a session is still alive
//! - POST /sessions/message - ask about the document
//! - POST /sessions/end     - close a session

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::api::middleware::{ApiError, AppState};
use crate::services::SessionError;

/// Multipart field carrying the document
const DOCUMENT_FIELD: &str = "document";

/// Response for a started session
#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub session_id: String,
    pub document_uri: String,
}

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    pub session_id: Option<String>,
}

/// Poll result; `has_document` is omitted for dead sessions
#[derive(Debug, Serialize, Deserialize)]
pub struct PollResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_document: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub session_id: String,
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub reply: String,
}

#[derive(Debug, Deserialize)]
pub struct EndRequest {
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EndResponse {
    pub ended: bool,
}

/// Build the sessions router
pub fn router(max_file_size: u64) -> Router<AppState> {
    // Leave room for the multipart framing around the document
    let body_limit = usize::try_from(max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(64 * 1024);

    Router::new()
        .route(
            "/start",
            post(start_session).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/poll", get(poll_session))
        .route("/message", post(post_message))
        .route("/end", post(end_session))
}

/// POST /sessions/start - Open a session for an uploaded document
///
/// Accepts multipart/form-data with a single file field named "document".
async fn start_session(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StartResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Failed to read multipart", e))?
    {
        if field.name() != Some(DOCUMENT_FIELD) {
            continue;
        }

        let filename = sanitize_filename(field.file_name());
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error("Failed to read file", e))?;

        if data.len() as u64 > state.upload_config.max_file_size {
            return Err(file_too_large(state.upload_config.max_file_size));
        }

        let session_id = state.sessions.create().await;

        // The spooled copy only lives for the duration of the request
        let tmp = tempfile::tempdir()
            .map_err(|e| ApiError::internal_error(format!("Failed to create temp dir: {}", e)))?;
        let temp_path = tmp.path().join(&filename);
        tokio::fs::write(&temp_path, &data)
            .await
            .map_err(|e| ApiError::internal_error(format!("Failed to spool file: {}", e)))?;

        let document_uri = state
            .uploader
            .upload(&session_id, &temp_path, &filename, &content_type)
            .await?;

        tracing::info!(session_id = %session_id, file = %filename, "session started");
        return Ok(Json(StartResponse {
            session_id,
            document_uri,
        }));
    }

    Err(ApiError::validation_error("No document provided"))
}

/// GET /sessions/poll?session_id= - Keep a session alive and report its state
async fn poll_session(
    State(state): State<AppState>,
    Query(query): Query<PollQuery>,
) -> Result<Json<PollResponse>, ApiError> {
    let session_id = required_session_id(query.session_id.as_deref())?;

    let session = match state.sessions.touch(session_id).await {
        Ok(()) => state.sessions.get(session_id).await,
        Err(e) => Err(e),
    };

    Ok(Json(match session {
        Ok(session) => PollResponse {
            active: true,
            has_document: Some(session.has_document()),
        },
        Err(SessionError::NotFound) => PollResponse {
            active: false,
            has_document: None,
        },
    }))
}

/// POST /sessions/message - Ask the model about the session's document
async fn post_message(
    State(state): State<AppState>,
    Json(body): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let reply = state.chat.ask(&body.session_id, &body.prompt).await?;
    Ok(Json(MessageResponse { reply }))
}

/// POST /sessions/end - End a session (unknown ids are accepted)
async fn end_session(
    State(state): State<AppState>,
    Json(body): Json<EndRequest>,
) -> Result<Json<EndResponse>, ApiError> {
    let session_id = required_session_id(Some(&body.session_id))?;
    state.sessions.end(session_id).await;
    Ok(Json(EndResponse { ended: true }))
}

fn file_too_large(max_file_size: u64) -> ApiError {
    ApiError::payload_too_large(format!(
        "File too large. Maximum size: {} bytes",
        max_file_size
    ))
}

/// Body-limit rejections surface from the multipart stream; keep them 413
fn multipart_error(context: &str, err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large(format!("{}: request body too large", context))
    } else {
        ApiError::validation_error(format!("{}: {}", context, err))
    }
}

fn required_session_id(session_id: Option<&str>) -> Result<&str, ApiError> {
    session_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::validation_error("missing_session_id"))
}

/// Keep only the final path component of a client-supplied filename
fn sanitize_filename(raw: Option<&str>) -> String {
    raw.and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("document")
        .to_string()
}
