//! Metadata Publishing Handler
//!
//! Accepts a multipart batch of role documents and commits it atomically.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use notary_core::RoleName;
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::error::ApiError;
use crate::api::path::{TufPath, TufTarget};
use crate::api::state::AppState;

/// Publish a batch of metadata
///
/// POST /v2/{gun}/_trust/tuf/
///
/// Each multipart field is named after the role it carries; its body is the
/// signed document exactly as it should be served.
pub async fn atomic_update(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    mut multipart: Multipart,
) -> Result<StatusCode, ApiError> {
    let gun = match TufPath::parse(&path) {
        Some(TufPath {
            gun,
            target: TufTarget::Repository,
        }) => gun,
        _ => return Err(ApiError::NotFound(path)),
    };

    let mut docs: Vec<(RoleName, Vec<u8>)> = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::MalformedUpload(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let role: RoleName = name
            .parse()
            .map_err(|_| ApiError::MalformedUpload(format!("unknown role part: {:?}", name)))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::MalformedUpload(e.to_string()))?;

        debug!(gun = %gun, role = %role, size = data.len(), "Received metadata part");
        docs.push((role, data.to_vec()));
    }

    let roles = state.updates.atomic_update(&gun, docs).await?;

    info!(gun = %gun, roles = ?roles, "Published metadata");
    Ok(StatusCode::OK)
}
