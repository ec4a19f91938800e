mod config;
mod dto;
mod handlers;
mod models;
mod repository;
mod service;

use tracing_subscriber::EnvFilter;

use std::sync::Arc;

use handlers::rest::{self, AppState};
use repository::{MemoryRepository, PgRepository, SharedRepository};
use service::{AuthService, NoteService, SharingService};

async fn open_repository(database_dsn: Option<&str>) -> SharedRepository {
    let Some(database_dsn) = database_dsn else {
        tracing::warn!("No database DSN configured, notes are kept in memory only");
        return repository::shared(MemoryRepository::new());
    };

    // Repository creation and migration
    let mut repo = PgRepository::new(database_dsn).await.unwrap_or_else(|e| {
        tracing::error!("Failed to establish database connection: {e}");
        panic!("failed to establish database connection: {e}");
    });

    repo.migrate().await.unwrap_or_else(|e| {
        tracing::error!("Failed to migrate database: {e}");
        panic!("failed to migrate database: {e}");
    });

    repository::shared(repo)
}

#[tokio::main]
async fn main() {
    // Log setup
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load config
    let cfg = config::load_config().unwrap_or_else(|e| {
        tracing::error!("Failed to load config: {e}");
        panic!("failed to load config: {e}");
    });
    tracing::info!("Successfully loaded notes server config");

    let repo = open_repository(cfg.database_dsn.as_deref()).await;

    // Service creation
    let state = Arc::new(AppState {
        auth: AuthService::new(repo.clone(), &cfg),
        notes: NoteService::new(repo.clone()),
        sharing: SharingService::new(repo),
    });

    let router = rest::router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", cfg.port))
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind to port {}: {e}", cfg.port);
            panic!("failed to bind to port {}: {e}", cfg.port);
        });

    match listener.local_addr() {
        Ok(addr) => tracing::info!("REST server starting, listening on {}", addr),
        Err(e) => tracing::warn!("REST server starting, local address unavailable: {e}"),
    }

    if let Err(e) = axum::serve(listener, router).await {
        tracing::error!("HTTP server error: {e}");
        panic!("failed to start HTTP server: {e}");
    }
}
