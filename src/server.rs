//! Server assembly and lifecycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::api::{self, AppState};
use crate::config::ServerConfig;
use crate::orchestrator::Orchestrator;
use crate::providers::{GitHubFileLister, HttpFileProcessor};
use crate::store::{DbHandle, JobStore};

pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router().with_state(state)
}

/// Wire up the store, providers, and orchestrator from config.
pub fn build_state(config: &ServerConfig) -> Result<Arc<AppState>> {
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let store = DbHandle::new(
        JobStore::new(&config.db_path).context("Failed to initialize job database")?,
    );

    let lister = Arc::new(GitHubFileLister::new(config.github_token.clone()));
    let processor = Arc::new(
        HttpFileProcessor::new(&config.processor_url, config.processor_timeout)
            .context("Failed to build file processor")?,
    );
    let orchestrator = Orchestrator::new(
        store.clone(),
        lister,
        processor,
        config.worker.clone(),
    );

    Ok(Arc::new(AppState {
        store,
        orchestrator,
    }))
}

/// Run the analysis server until Ctrl+C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let state = build_state(&config)?;
    let orchestrator = state.orchestrator.clone();

    let mut app = build_router(state);
    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if config.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("repoinsight server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Interrupted pipelines keep their last persisted state; a later
    // start or retry picks the repository back up.
    orchestrator.shutdown().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Shutting down...");
}
