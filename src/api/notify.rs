//! Contract notification endpoints
//!
//! - POST /notify-customer - ask a signer to review and sign
//! - POST /notify-success  - confirm a contract was signed

use axum::{extract::State, routing::post, Json, Router};
use lettre::Address;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, MailState};

const MISSING_RECIPIENT: &str = "email is required (email | mail | mail_id)";

/// Request for a signature email
#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    pub link: String,
    #[serde(flatten)]
    pub recipient: Recipient,
}

/// Request for a signed-successfully email
#[derive(Debug, Deserialize)]
pub struct NotifySuccessRequest {
    pub link: String,
    #[serde(default)]
    pub nft_link: Option<String>,
    #[serde(flatten)]
    pub recipient: Recipient,
}

/// Clients name the recipient field differently; the first non-empty wins
#[derive(Debug, Default, Deserialize)]
pub struct Recipient {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub mail_id: Option<String>,
}

impl Recipient {
    pub fn resolve(&self) -> Result<Address, ApiError> {
        let raw = [&self.email, &self.mail, &self.mail_id]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .ok_or_else(|| ApiError::validation_error(MISSING_RECIPIENT))?;

        raw.parse::<Address>()
            .map_err(|e| ApiError::validation_error(format!("Invalid email address: {}", e)))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotifyResponse {
    pub status: String,
}

impl NotifyResponse {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Build the notification router
pub fn router() -> Router<MailState> {
    Router::new()
        .route("/notify-customer", post(notify_customer))
        .route("/notify-success", post(notify_success))
}

/// POST /notify-customer - Send the signature request email
async fn notify_customer(
    State(state): State<MailState>,
    Json(payload): Json<NotifyRequest>,
) -> Result<Json<NotifyResponse>, ApiError> {
    let link = parse_link("link", &payload.link)?;
    let to = payload.recipient.resolve()?;

    state
        .email_service
        .send_sign_request(&to, &link)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "notify_customer failed");
            ApiError::internal_error("failed to send email")
        })?;

    Ok(Json(NotifyResponse::ok()))
}

/// POST /notify-success - Send the signed-successfully email
async fn notify_success(
    State(state): State<MailState>,
    Json(payload): Json<NotifySuccessRequest>,
) -> Result<Json<NotifyResponse>, ApiError> {
    let link = parse_link("link", &payload.link)?;
    let nft_link = payload
        .nft_link
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_link("nft_link", s))
        .transpose()?;
    let to = payload.recipient.resolve()?;

    state
        .email_service
        .send_success(&to, &link, nft_link.as_ref())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "notify_success failed");
            ApiError::internal_error("failed to send email")
        })?;

    Ok(Json(NotifyResponse::ok()))
}

/// Accept only absolute http(s) URLs
fn parse_link(field: &str, raw: &str) -> Result<Url, ApiError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ApiError::validation_error(format!("Invalid {}: {}", field, e)))?;

    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(ApiError::validation_error(format!(
            "Invalid {}: expected an http(s) URL",
            field
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::build_notify_router;
    use crate::config::SmtpConfig;
    use crate::services::email::testing::RecordingTransport;
    use crate::services::EmailService;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(transport: Arc<RecordingTransport>) -> axum::Router {
        let config = SmtpConfig {
            from_email: "noreply@contractlock.com".to_string(),
            ..SmtpConfig::default()
        };
        let service = EmailService::new(&config, transport).unwrap();
        build_notify_router(MailState::new(Arc::new(service)))
    }

    async fn post(app: &axum::Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_recipient_resolution_order() {
        let recipient = Recipient {
            email: Some("".into()),
            mail: Some("second@example.com".into()),
            mail_id: Some("third@example.com".into()),
        };
        assert_eq!(recipient.resolve().unwrap().to_string(), "second@example.com");

        let recipient = Recipient {
            mail_id: Some("third@example.com".into()),
            ..Recipient::default()
        };
        assert_eq!(recipient.resolve().unwrap().to_string(), "third@example.com");

        let err = Recipient::default().resolve().unwrap_err();
        assert_eq!(err.error.message, MISSING_RECIPIENT);
    }

    #[test]
    fn test_parse_link() {
        assert!(parse_link("link", "https://app.contractlock.com/c/1").is_ok());
        assert!(parse_link("link", "not a url").is_err());
        assert!(parse_link("link", "ftp://files.example.com/c").is_err());
        assert!(parse_link("link", "javascript:alert(1)").is_err());
    }

    #[tokio::test]
    async fn test_notify_customer_sends_email() {
        let transport = Arc::new(RecordingTransport::default());
        let app = app(transport.clone());

        let (status, body) = post(
            &app,
            "/notify-customer",
            serde_json::json!({ "link": "https://app.contractlock.com/c/7", "mail": "signer@example.com" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "status": "ok" }));

        let sent = transport.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].envelope().to()[0].to_string(), "signer@example.com");
    }

    #[tokio::test]
    async fn test_notify_success_with_nft() {
        let transport = Arc::new(RecordingTransport::default());
        let app = app(transport.clone());

        let (status, _) = post(
            &app,
            "/notify-success",
            serde_json::json!({
                "link": "https://app.contractlock.com/c/7",
                "nft_link": "https://opensea.io/assets/7",
                "email": "signer@example.com"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(transport.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_recipient_is_bad_request() {
        let transport = Arc::new(RecordingTransport::default());
        let app = app(transport.clone());

        let (status, body) = post(
            &app,
            "/notify-customer",
            serde_json::json!({ "link": "https://app.contractlock.com/c/7" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], MISSING_RECIPIENT);
        assert!(transport.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_nft_link_is_bad_request() {
        let app = app(Arc::new(RecordingTransport::default()));
        let (status, _) = post(
            &app,
            "/notify-success",
            serde_json::json!({
                "link": "https://app.contractlock.com/c/7",
                "nft_link": "opensea",
                "email": "signer@example.com"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_transport_failure_is_server_error() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..RecordingTransport::default()
        });
        let app = app(transport);

        let (status, body) = post(
            &app,
            "/notify-customer",
            serde_json::json!({ "link": "https://app.contractlock.com/c/7", "email": "signer@example.com" }),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "failed to send email");
    }
}
