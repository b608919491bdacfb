//! In-memory storage backend
//!
//! Default storage implementation using in-memory hashmaps.
//! Suitable for development and single-instance deployments.
//! Data is lost on restart.
//!
//! A single lock guards every repository. Batches are checked and applied
//! under one write guard, so readers see either all of a batch or none of it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notary_core::{sha256_hex, RoleName, TufKey};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

use super::{
    check_base, check_versions, BaseVersion, MetaStore, MetaUpdate, StorageError, StoredMeta,
};

#[derive(Debug, Clone)]
struct StoredVersion {
    version: u64,
    data: Vec<u8>,
    checksum: String,
    created_at: DateTime<Utc>,
}

impl StoredVersion {
    fn to_meta(&self) -> StoredMeta {
        StoredMeta {
            version: self.version,
            last_modified: self.created_at,
            data: self.data.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Repository {
    /// Versions per role, ascending
    files: HashMap<RoleName, Vec<StoredVersion>>,
    keys: HashMap<RoleName, TufKey>,
}

impl Repository {
    fn latest_version(&self, role: &RoleName) -> u64 {
        self.files
            .get(role)
            .and_then(|versions| versions.last())
            .map(|v| v.version)
            .unwrap_or(0)
    }

    fn append(&mut self, update: MetaUpdate, now: DateTime<Utc>) {
        let checksum = sha256_hex(&update.data);
        self.files.entry(update.role).or_default().push(StoredVersion {
            version: update.version,
            data: update.data,
            checksum,
            created_at: now,
        });
    }
}

/// In-memory metadata store implementation
#[derive(Debug, Default)]
pub struct MemoryStore {
    repos: RwLock<HashMap<String, Repository>>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(gun: &str, role: &RoleName) -> StorageError {
    StorageError::NotFound(format!("{}/{}", gun, role))
}

#[async_trait]
impl MetaStore for MemoryStore {
    // =========================================================================
    // Metadata
    // =========================================================================

    async fn get_current(&self, gun: &str, role: &RoleName) -> Result<StoredMeta, StorageError> {
        let repos = self.repos.read().await;
        repos
            .get(gun)
            .and_then(|repo| repo.files.get(role))
            .and_then(|versions| versions.last())
            .map(StoredVersion::to_meta)
            .ok_or_else(|| not_found(gun, role))
    }

    async fn get_checksum(
        &self,
        gun: &str,
        role: &RoleName,
        checksum: &str,
    ) -> Result<StoredMeta, StorageError> {
        let repos = self.repos.read().await;
        repos
            .get(gun)
            .and_then(|repo| repo.files.get(role))
            .and_then(|versions| versions.iter().rev().find(|v| v.checksum == checksum))
            .map(StoredVersion::to_meta)
            .ok_or_else(|| not_found(gun, role))
    }

    async fn update_current(&self, gun: &str, update: MetaUpdate) -> Result<(), StorageError> {
        self.update_many(gun, vec![update], Vec::new()).await
    }

    async fn update_many(
        &self,
        gun: &str,
        updates: Vec<MetaUpdate>,
        base: Vec<BaseVersion>,
    ) -> Result<(), StorageError> {
        let mut repos = self.repos.write().await;
        let repo = repos.entry(gun.to_string()).or_default();

        check_versions(gun, &updates, |role| repo.latest_version(role))?;
        check_base(gun, &base, |role| repo.latest_version(role))?;

        let now = Utc::now();
        let roles: Vec<String> = updates.iter().map(|u| u.role.to_string()).collect();
        for update in updates {
            repo.append(update, now);
        }

        info!(gun = %gun, roles = ?roles, "Committed metadata update");
        Ok(())
    }

    async fn delete(&self, gun: &str) -> Result<(), StorageError> {
        let mut repos = self.repos.write().await;
        if repos.remove(gun).is_some() {
            info!(gun = %gun, "Deleted repository");
        }
        Ok(())
    }

    // =========================================================================
    // Server-held keys
    // =========================================================================

    async fn get_key(&self, gun: &str, role: &RoleName) -> Result<TufKey, StorageError> {
        let repos = self.repos.read().await;
        repos
            .get(gun)
            .and_then(|repo| repo.keys.get(role))
            .cloned()
            .ok_or_else(|| not_found(gun, role))
    }

    async fn set_key(&self, gun: &str, role: &RoleName, key: TufKey) -> Result<(), StorageError> {
        let mut repos = self.repos.write().await;
        let repo = repos.entry(gun.to_string()).or_default();
        if repo.keys.contains_key(role) {
            return Err(StorageError::KeyExists {
                gun: gun.to_string(),
                role: role.to_string(),
            });
        }
        repo.keys.insert(role.clone(), key);
        Ok(())
    }

    async fn check_health(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
