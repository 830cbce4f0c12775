mod config;
mod error;
mod models;
mod routes;
mod services;
mod utils;

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::from_env().context("invalid configuration")?;
    tracing::info!(
        model = %config.llm.model,
        api_url = %config.llm.api_url,
        language = ?config.generation.language,
        concurrency = config.generation.chapter_concurrency,
        "configuration loaded"
    );

    let llm_client = Arc::new(services::llm::LLMClient::new(config.llm));
    let generator = services::generator::Generator::new(llm_client, config.generation);

    let app_state = routes::AppState {
        generator: Arc::new(generator),
        sessions: services::session::SessionStore::new(),
        failed_chapters: config.failed_chapters,
    };
    let app = routes::router(app_state);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("cannot bind {}", config.bind))?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
