//! Repository Deletion Handler

use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::api::error::ApiError;
use crate::api::path::{TufPath, TufTarget};
use crate::api::state::AppState;

/// Delete all metadata and server-held key records of a repository
///
/// DELETE /v2/{gun}/_trust/tuf/
pub async fn delete_repository(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<StatusCode, ApiError> {
    let gun = match TufPath::parse(&path) {
        Some(TufPath {
            gun,
            target: TufTarget::Repository,
        }) => gun,
        _ => return Err(ApiError::NotFound(path)),
    };

    state.store.delete(&gun).await.map_err(|e| {
        error!(gun = %gun, error = %e, "Failed to delete repository");
        ApiError::Internal
    })?;

    info!(gun = %gun, "Repository deleted");
    Ok(StatusCode::OK)
}
