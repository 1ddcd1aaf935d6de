//! ai-client - document chat sessions backed by a generative AI API

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use contract_assist::{
    api::{self, AppState},
    config::Config,
    services::{GeminiClient, SessionStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contract_assist=info,ai_client=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ai-client...");

    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!(ttl_seconds = config.session.ttl().as_secs(), "Configuration loaded");

    let backend = GeminiClient::new(&config.gemini)?;
    if !backend.is_configured() {
        tracing::warn!("GEMINI_API_KEY is not set; uploads and completions will fail");
    }
    tracing::info!(model = %backend.model(), "Generative backend ready");

    let store = Arc::new(SessionStore::new(config.session.ttl()));

    // Reclaim idle sessions even when no requests arrive
    let sweeper = config
        .session
        .sweep_interval()
        .map(|period| SessionStore::spawn_sweeper(store.clone(), period));

    let state = AppState::new(store.clone(), Arc::new(backend), config.upload.clone());
    let app = api::build_session_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(api::shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    store.shutdown().await;

    Ok(())
}
