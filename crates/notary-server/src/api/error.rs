//! API error types and responses
//!
//! Validation and version-conflict errors describe the publisher's own input
//! and carry their detail. Storage failures never do: they are logged and
//! reported as a bare `INVALID_UPDATE`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::config::ConfigError;
use crate::core::{RetrievalError, UpdateError, ValidationError};
use crate::keys::KeyError;
use crate::storage::{StorageError, VersionConflict};

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid update")]
    InvalidUpdate(Option<ValidationError>),

    #[error("{0}")]
    OldVersion(VersionConflict),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unknown repository or role")]
    UnknownRole,

    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("malformed upload: {0}")]
    MalformedUpload(String),

    #[error("internal error")]
    Internal,

    #[error("service unavailable")]
    Unavailable,
}

impl ApiError {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidUpdate(_) => "INVALID_UPDATE",
            ApiError::OldVersion(_) => "OLD_VERSION",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::UnknownRole => "UNKNOWN_ROLE",
            ApiError::InvalidRole(_) => "INVALID_ROLE",
            ApiError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            ApiError::MalformedUpload(_) => "MALFORMED_UPLOAD",
            ApiError::Internal => "INTERNAL_ERROR",
            ApiError::Unavailable => "UNAVAILABLE",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidUpdate(_)
            | ApiError::OldVersion(_)
            | ApiError::UnknownRole
            | ApiError::InvalidRole(_)
            | ApiError::MalformedUpload(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidConfiguration(_) | ApiError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Structured detail safe to return to the caller
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::InvalidUpdate(Some(detail)) => serde_json::to_value(detail).ok(),
            ApiError::OldVersion(conflict) => serde_json::to_value(conflict).ok(),
            _ => None,
        }
    }
}

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
            details: self.details(),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

impl From<UpdateError> for ApiError {
    fn from(err: UpdateError) -> Self {
        match err {
            UpdateError::Validation(detail) => ApiError::InvalidUpdate(Some(detail)),
            UpdateError::Storage(StorageError::OldVersion(conflict)) => {
                ApiError::OldVersion(conflict)
            }
            UpdateError::Storage(e) => {
                error!(error = %e, "Storage failure during update");
                ApiError::InvalidUpdate(None)
            }
            UpdateError::Signing(e) => {
                error!(error = %e, "Signing failure during update");
                ApiError::InvalidUpdate(None)
            }
            UpdateError::Aborted(reason) => {
                error!(reason = %reason, "Update aborted");
                ApiError::InvalidUpdate(None)
            }
        }
    }
}

impl From<RetrievalError> for ApiError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::NotFound(what) => ApiError::NotFound(what),
            other => {
                error!(error = %other, "Failed to retrieve metadata");
                ApiError::Internal
            }
        }
    }
}

impl From<KeyError> for ApiError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::UnknownRole => ApiError::UnknownRole,
            KeyError::InvalidRole(role) => ApiError::InvalidRole(role),
            KeyError::InvalidConfiguration(reason) => ApiError::InvalidConfiguration(reason),
            other => {
                error!(error = %other, "Failed to issue key");
                ApiError::Internal
            }
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidConfiguration(reason) => ApiError::InvalidConfiguration(reason),
            other => ApiError::InvalidConfiguration(other.to_string()),
        }
    }
}
