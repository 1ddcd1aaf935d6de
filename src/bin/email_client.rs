//! email-client - contract notification emails over SMTP

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use contract_assist::{
    api::{self, MailState},
    config::Config,
    services::{EmailService, SmtpMailer},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contract_assist=debug,email_client=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting email-client...");

    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!(server = %config.smtp.server, port = config.smtp.port, "Configuration loaded");

    let mailer = SmtpMailer::new(&config.smtp)?;
    let email_service = EmailService::new(&config.smtp, Arc::new(mailer))
        .context("FROM_EMAIL must be a valid sender address")?;

    let app = api::build_notify_router(MailState::new(Arc::new(email_service)));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(api::shutdown_signal())
        .await?;

    Ok(())
}
