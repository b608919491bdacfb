//! API request handlers

pub mod delete;
pub mod get;
pub mod index;
pub mod keys;
pub mod update;

pub use delete::delete_repository;
pub use get::{get_metadata, http_date};
pub use index::main_handler;
pub use keys::get_key;
pub use update::atomic_update;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::path::{TufPath, TufTarget};
use crate::api::state::AppState;

/// Read side of `/v2/{gun}/_trust/tuf/...`: metadata or server-managed keys
pub async fn tuf_get(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let tuf = TufPath::parse(&path).ok_or_else(|| ApiError::NotFound(path.clone()))?;

    match tuf.target {
        TufTarget::Metadata { role, checksum } => {
            get_metadata(&state, &tuf.gun, &role, checksum.as_deref()).await
        }
        TufTarget::Key { role } => Ok(get_key(&state, &tuf.gun, &role).await?.into_response()),
        TufTarget::Repository => Err(ApiError::NotFound(path)),
    }
}
