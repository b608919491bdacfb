//! Notary Server Binary
//!
//! Runs the notary HTTP server for TUF metadata publishing and retrieval.

use notary_core::Ed25519Service;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use notary_server::{create_router, AppState, MemoryStore, MetaStore, ServerConfig};

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env().expect("Invalid NOTARY_SERVER_* configuration");

    // Initialize logging
    let log_level = config.log_level.parse().unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    // Initialize storage
    let store = open_store(&config).await;

    // Signing keys live in memory; server-managed keys are lost on restart
    let crypto = Arc::new(Ed25519Service::new());

    let state = AppState::builder()
        .store(store)
        .crypto(crypto)
        .key_algorithm(config.key_algorithm.clone())
        .cache(config.cache)
        .build()
        .expect("Failed to build application state");

    info!(
        port = config.port,
        key_algorithm = %config.key_algorithm,
        "Starting notary server"
    );

    // Build router
    let app = create_router(Arc::new(state));

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!(addr = %addr, "Notary server listening");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}

#[cfg(feature = "postgres")]
async fn open_store(config: &ServerConfig) -> Arc<dyn MetaStore> {
    match &config.database_url {
        Some(url) => Arc::new(
            notary_server::storage::PostgresStore::new(url)
                .await
                .expect("Failed to connect to PostgreSQL"),
        ),
        None => Arc::new(MemoryStore::new()),
    }
}

#[cfg(not(feature = "postgres"))]
async fn open_store(config: &ServerConfig) -> Arc<dyn MetaStore> {
    if config.database_url.is_some() {
        tracing::warn!("NOTARY_SERVER_DATABASE_URL is set but the postgres feature is disabled; using memory store");
    }
    Arc::new(MemoryStore::new())
}
