//! Metadata retrieval
//!
//! Resolves current and checksum-pinned fetches and decides how long the
//! result may be cached.

use chrono::{DateTime, Utc};
use notary_core::{is_valid_checksum, sha256_hex, RoleName};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

use crate::storage::{MetaStore, StorageError, StoredMeta};

/// Default `max-age` for current-version fetches (5 minutes)
pub const DEFAULT_CURRENT_MAX_AGE_SECS: u64 = 300;

/// Default `max-age` for checksum-pinned fetches (30 days)
pub const DEFAULT_CONSISTENT_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored bytes do not hash to the checksum they were fetched by
    #[error("stored {role} for {gun} does not match its checksum")]
    Corrupt { gun: String, role: String },

    #[error(transparent)]
    Storage(StorageError),
}

/// Cache lifetimes for retrieved metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub current_max_age: u64,
    pub consistent_max_age: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            current_max_age: DEFAULT_CURRENT_MAX_AGE_SECS,
            consistent_max_age: DEFAULT_CONSISTENT_MAX_AGE_SECS,
        }
    }
}

impl CacheConfig {
    pub fn max_age(&self, consistent: bool) -> u64 {
        if consistent {
            self.consistent_max_age
        } else {
            self.current_max_age
        }
    }

    /// `Cache-Control` header value
    pub fn cache_control(&self, consistent: bool) -> String {
        format!("public, max-age={}", self.max_age(consistent))
    }
}

/// A document ready to serve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDocument {
    pub data: Vec<u8>,
    /// Hex SHA-256 of `data`
    pub checksum: String,
    pub last_modified: DateTime<Utc>,
    /// Fetched by checksum, so immutable
    pub consistent: bool,
}

/// Serves current and checksum-pinned metadata
#[derive(Debug, Clone)]
pub struct RetrievalService {
    store: Arc<dyn MetaStore>,
    cache: CacheConfig,
}

impl RetrievalService {
    pub fn new(store: Arc<dyn MetaStore>, cache: CacheConfig) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    /// Fetch the current version of `role`, or the version with `checksum`
    ///
    /// Empty stored data counts as absent.
    pub async fn get(
        &self,
        gun: &str,
        role: &RoleName,
        checksum: Option<&str>,
    ) -> Result<RoleDocument, RetrievalError> {
        let (stored, consistent) = match checksum {
            None => (self.store.get_current(gun, role).await, false),
            Some(checksum) if is_valid_checksum(checksum) => (
                self.store.get_checksum(gun, role, checksum).await,
                true,
            ),
            Some(checksum) => {
                return Err(RetrievalError::NotFound(format!(
                    "{}/{}: malformed checksum {}",
                    gun, role, checksum
                )))
            }
        };

        let StoredMeta {
            last_modified,
            data,
            ..
        } = stored.map_err(|e| match e {
            StorageError::NotFound(what) => RetrievalError::NotFound(what),
            other => RetrievalError::Storage(other),
        })?;

        if data.is_empty() {
            return Err(RetrievalError::NotFound(format!("{}/{}", gun, role)));
        }

        let actual = sha256_hex(&data);
        if let Some(expected) = checksum {
            if !expected.eq_ignore_ascii_case(&actual) {
                error!(gun = %gun, role = %role, expected = %expected, actual = %actual, "Stored metadata does not match its checksum");
                return Err(RetrievalError::Corrupt {
                    gun: gun.to_string(),
                    role: role.to_string(),
                });
            }
        }

        Ok(RoleDocument {
            data,
            checksum: actual,
            last_modified,
            consistent,
        })
    }
}
