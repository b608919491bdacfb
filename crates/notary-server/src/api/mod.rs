//! API module for the notary server

pub mod error;
pub mod handlers;
pub mod path;
pub mod state;

use axum::{
    extract::State,
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

use error::ApiError;
use state::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
///
/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    state.store.check_health().await.map_err(|e| {
        error!(error = %e, "Storage health check failed");
        ApiError::Unavailable
    })?;

    Ok(Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    }))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", any(handlers::main_handler))
        .route("/health", get(health))
        // Repository names contain slashes, so TUF paths are parsed by hand
        .route(
            "/v2/{*path}",
            get(handlers::tuf_get)
                .post(handlers::atomic_update)
                .delete(handlers::delete_repository),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
