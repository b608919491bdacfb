//! Storage abstraction for repository metadata
//!
//! This module provides a trait-based abstraction for versioned metadata
//! storage, with an in-memory (default) and a PostgreSQL backend.
//!
//! Every (repository, role) pair owns an ordered history of versions. The
//! highest version is "current"; older versions stay addressable by checksum
//! so pinned fetches keep working after newer versions land.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notary_core::{RoleName, TufKey};
use serde::Serialize;
use std::fmt::Debug;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    OldVersion(VersionConflict),

    #[error("key already exists for {gun}/{role}")]
    KeyExists { gun: String, role: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("connection error: {0}")]
    Connection(String),
}

/// A rejected version bump
///
/// Safe to return to publishers: it only describes their own submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionConflict {
    pub gun: String,
    pub role: String,
    /// Version the publisher tried to commit, or the stored version the
    /// batch was validated against
    pub attempted: u64,
    /// Latest stored version for the role
    pub current: u64,
}

impl std::fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "old version: {}/{} version {} is not newer than {}",
            self.gun, self.role, self.attempted, self.current
        )
    }
}

/// One role version ready to commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaUpdate {
    pub role: RoleName,
    pub version: u64,
    /// Exact published bytes
    pub data: Vec<u8>,
}

/// Stored version of a role that a batch was validated against
///
/// Version 0 means the role had nothing stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseVersion {
    pub role: RoleName,
    pub version: u64,
}

/// A stored version as returned to readers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMeta {
    pub version: u64,
    /// When this version was committed
    pub last_modified: DateTime<Utc>,
    pub data: Vec<u8>,
}

/// Storage backend trait for repository metadata and server-held keys
///
/// Implementations must be thread-safe and support concurrent access.
/// Readers must never observe part of an `update_many` batch.
#[async_trait]
pub trait MetaStore: Send + Sync + Debug {
    // =========================================================================
    // Metadata
    // =========================================================================

    /// Latest version of a role
    async fn get_current(&self, gun: &str, role: &RoleName) -> Result<StoredMeta, StorageError>;

    /// The version of a role whose bytes hash to `checksum`
    async fn get_checksum(
        &self,
        gun: &str,
        role: &RoleName,
        checksum: &str,
    ) -> Result<StoredMeta, StorageError>;

    /// Commit a single role version
    ///
    /// Fails with `OldVersion` unless `update.version` is strictly greater than
    /// the stored version.
    async fn update_current(&self, gun: &str, update: MetaUpdate) -> Result<(), StorageError>;

    /// Commit several role versions as one unit: all or nothing
    ///
    /// Every role in `base` must still be at its recorded version when the
    /// batch commits; otherwise nothing is written and the call fails with
    /// `OldVersion`.
    async fn update_many(
        &self,
        gun: &str,
        updates: Vec<MetaUpdate>,
        base: Vec<BaseVersion>,
    ) -> Result<(), StorageError>;

    /// Remove every version and key record of a repository
    async fn delete(&self, gun: &str) -> Result<(), StorageError>;

    // =========================================================================
    // Server-held keys
    // =========================================================================

    /// Public key the server holds for a role
    async fn get_key(&self, gun: &str, role: &RoleName) -> Result<TufKey, StorageError>;

    /// Record the public key for a role; fails with `KeyExists` if one is set
    async fn set_key(&self, gun: &str, role: &RoleName, key: TufKey) -> Result<(), StorageError>;

    // =========================================================================
    // Health
    // =========================================================================

    async fn check_health(&self) -> Result<(), StorageError>;
}

/// Check a batch for version monotonicity against a lookup of stored versions
///
/// Updates to the same role within one batch must also increase.
pub(crate) fn check_versions<F>(
    gun: &str,
    updates: &[MetaUpdate],
    mut current: F,
) -> Result<(), StorageError>
where
    F: FnMut(&RoleName) -> u64,
{
    let mut seen: std::collections::HashMap<&RoleName, u64> = std::collections::HashMap::new();
    for update in updates {
        let latest = match seen.get(&update.role) {
            Some(v) => *v,
            None => current(&update.role),
        };
        if update.version <= latest {
            return Err(StorageError::OldVersion(VersionConflict {
                gun: gun.to_string(),
                role: update.role.to_string(),
                attempted: update.version,
                current: latest,
            }));
        }
        seen.insert(&update.role, update.version);
    }
    Ok(())
}

/// Check that every role a batch was validated against is unchanged
pub(crate) fn check_base<F>(
    gun: &str,
    base: &[BaseVersion],
    mut current: F,
) -> Result<(), StorageError>
where
    F: FnMut(&RoleName) -> u64,
{
    for expected in base {
        let latest = current(&expected.role);
        if latest != expected.version {
            return Err(StorageError::OldVersion(VersionConflict {
                gun: gun.to_string(),
                role: expected.role.to_string(),
                attempted: expected.version,
                current: latest,
            }));
        }
    }
    Ok(())
}
