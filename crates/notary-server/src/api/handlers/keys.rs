//! Server-Managed Key Handler

use axum::Json;
use notary_core::TufKey;

use crate::api::error::ApiError;
use crate::api::state::AppState;

/// Return the public key of a server-managed role, creating it on first use
///
/// GET /v2/{gun}/_trust/tuf/{role}.key
///
/// Only `snapshot` and `timestamp` keys are held by the server.
pub async fn get_key(state: &AppState, gun: &str, role: &str) -> Result<Json<TufKey>, ApiError> {
    let key = state.keys.get_or_create_key(gun, role).await?;
    Ok(Json(key))
}
