//! Notary Server
//!
//! Server-side trust store for TUF repository metadata. Publishers upload
//! signed role documents for a repository ("gun"); clients fetch them to
//! establish a chain of trust for the repository's artifacts.
//!
//! ## Guarantees
//!
//! 1. **Atomicity**: a published batch commits entirely or not at all
//! 2. **Hierarchy**: signatures meet root thresholds and checksums chain
//!    timestamp -> snapshot -> root/targets before anything commits
//! 3. **Content addressing**: any stored version can be fetched by the
//!    SHA-256 of its exact bytes
//!
//! ## API Endpoints
//!
//! - `GET /` - Liveness check
//! - `GET /health` - Storage health check
//! - `POST /v2/{gun}/_trust/tuf/` - Publish a multipart batch of role documents
//! - `GET /v2/{gun}/_trust/tuf/{role}.json` - Current version of a role
//! - `GET /v2/{gun}/_trust/tuf/{role}.{sha256}.json` - Checksum-pinned version
//! - `GET /v2/{gun}/_trust/tuf/{role}.key` - Server-managed snapshot/timestamp key
//! - `DELETE /v2/{gun}/_trust/tuf/` - Delete a repository

pub mod api;
pub mod config;
pub mod core;
pub mod keys;
pub mod storage;

pub use api::create_router;
pub use api::error::ApiError;
pub use api::state::{AppState, AppStateBuilder};
pub use config::{ConfigError, ServerConfig};
pub use crate::core::{CacheConfig, RetrievalService, UpdateCoordinator, UpdateError, ValidationError};
pub use keys::KeyService;
pub use storage::{BaseVersion, MemoryStore, MetaStore, MetaUpdate, StorageError, StoredMeta};
