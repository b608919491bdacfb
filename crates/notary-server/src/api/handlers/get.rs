//! Metadata Retrieval Handler

use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use notary_core::RoleName;

use crate::api::error::ApiError;
use crate::api::state::AppState;

/// Format a timestamp as an HTTP date (RFC 1123, always GMT)
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Serve the current or checksum-pinned version of a role
///
/// GET /v2/{gun}/_trust/tuf/{role}.json
/// GET /v2/{gun}/_trust/tuf/{role}.{checksum}.json
pub async fn get_metadata(
    state: &AppState,
    gun: &str,
    role: &RoleName,
    checksum: Option<&str>,
) -> Result<Response, ApiError> {
    let doc = state.retrieval.get(gun, role, checksum).await?;
    let cache_control = state.retrieval.cache().cache_control(doc.consistent);

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::ETAG, doc.checksum),
            (header::LAST_MODIFIED, http_date(doc.last_modified)),
            (header::CACHE_CONTROL, cache_control),
        ],
        doc.data,
    )
        .into_response())
}
