//! Root Handler

use axum::{http::Method, Json};
use serde_json::{json, Value};

use crate::api::error::ApiError;

/// Liveness probe
///
/// GET / answers with an empty JSON object; any other method is not found.
pub async fn main_handler(method: Method) -> Result<Json<Value>, ApiError> {
    if method == Method::GET {
        Ok(Json(json!({})))
    } else {
        Err(ApiError::NotFound(format!("{} /", method)))
    }
}
