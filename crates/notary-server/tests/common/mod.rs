//! Shared fixtures for notary server integration tests
//!
//! - `TestRepo`: locally held keys that sign a complete repository
//! - multipart upload builders
//! - fault-injecting stores

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use notary_core::{
    default_expires, DelegatedRole, Ed25519Service, FileMeta, KeyPair, RoleName, Root, Signed,
    Snapshot, Targets, Timestamp, TufKey,
};
use notary_server::{
    create_router, AppState, BaseVersion, MemoryStore, MetaStore, MetaUpdate, StorageError,
    StoredMeta,
};
use notary_server::storage::VersionConflict;
use std::sync::Arc;

// =============================================================================
// Signed repository fixture
// =============================================================================

/// Keys for every top-level role of one repository
pub struct TestRepo {
    pub gun: String,
    pub root_key: KeyPair,
    pub targets_key: KeyPair,
    pub snapshot_key: KeyPair,
    pub timestamp_key: KeyPair,
    /// Public keys the root authorises; default to the local key pairs
    pub snapshot_public: TufKey,
    pub timestamp_public: TufKey,
}

impl TestRepo {
    pub fn new(gun: &str) -> Self {
        let snapshot_key = KeyPair::generate();
        let timestamp_key = KeyPair::generate();
        Self {
            gun: gun.to_string(),
            root_key: KeyPair::generate(),
            targets_key: KeyPair::generate(),
            snapshot_public: snapshot_key.public_key(),
            timestamp_public: timestamp_key.public_key(),
            snapshot_key,
            timestamp_key,
        }
    }

    /// Authorise a server-held key instead of the local one
    pub fn use_server_key(&mut self, role: &RoleName, key: TufKey) {
        match role {
            RoleName::Snapshot => self.snapshot_public = key,
            RoleName::Timestamp => self.timestamp_public = key,
            other => panic!("{other} keys are never server-held"),
        }
    }

    pub fn root_doc(&self, version: u64) -> Root {
        let mut root = Root::new(version, default_expires(&RoleName::Root));
        root.add_key(&RoleName::Root, self.root_key.public_key());
        root.add_key(&RoleName::Targets, self.targets_key.public_key());
        root.add_key(&RoleName::Snapshot, self.snapshot_public.clone());
        root.add_key(&RoleName::Timestamp, self.timestamp_public.clone());
        root
    }

    pub fn root(&self, version: u64) -> Vec<u8> {
        sign(self.root_doc(version), &[&self.root_key])
    }

    pub fn targets(&self, version: u64) -> Vec<u8> {
        let mut targets = Targets::new(version, default_expires(&RoleName::Targets));
        targets
            .targets
            .insert("app.tar.gz".into(), FileMeta::from_bytes(b"artifact"));
        sign(targets, &[&self.targets_key])
    }

    /// Targets delegating `role` to `key`
    pub fn targets_delegating(&self, version: u64, role: &RoleName, key: &KeyPair) -> Vec<u8> {
        let mut targets = Targets::new(version, default_expires(&RoleName::Targets));
        targets
            .delegations
            .keys
            .insert(key.key_id().to_string(), key.public_key());
        targets.delegations.roles.push(DelegatedRole {
            name: role.clone(),
            keyids: vec![key.key_id().to_string()],
            threshold: 1,
            paths: vec!["releases/".into()],
        });
        sign(targets, &[&self.targets_key])
    }

    pub fn delegation(&self, version: u64, key: &KeyPair) -> Vec<u8> {
        let targets = Targets::new(version, default_expires(&RoleName::Targets));
        sign(targets, &[key])
    }

    /// Snapshot pinning `pinned` role documents
    pub fn snapshot(&self, version: u64, pinned: &[(&RoleName, &[u8])]) -> Vec<u8> {
        let mut snapshot = Snapshot::new(version, default_expires(&RoleName::Snapshot));
        for (role, bytes) in pinned {
            snapshot
                .meta
                .insert(role.to_string(), FileMeta::from_bytes(bytes));
        }
        sign(snapshot, &[&self.snapshot_key])
    }

    pub fn timestamp(&self, version: u64, snapshot: &[u8]) -> Vec<u8> {
        let timestamp = Timestamp::new(version, default_expires(&RoleName::Timestamp), snapshot);
        sign(timestamp, &[&self.timestamp_key])
    }

    /// A complete, consistent set of documents at `version`
    pub fn full_batch(&self, version: u64) -> Vec<(RoleName, Vec<u8>)> {
        let root = self.root(version);
        let targets = self.targets(version);
        let snapshot = self.snapshot(
            version,
            &[(&RoleName::Root, &root[..]), (&RoleName::Targets, &targets[..])],
        );
        let timestamp = self.timestamp(version, &snapshot);
        vec![
            (RoleName::Root, root),
            (RoleName::Targets, targets),
            (RoleName::Snapshot, snapshot),
            (RoleName::Timestamp, timestamp),
        ]
    }
}

pub fn sign<T: notary_core::Document>(doc: T, keys: &[&KeyPair]) -> Vec<u8> {
    let mut signed = Signed::new(doc);
    for key in keys {
        signed = signed.sign(key).unwrap();
    }
    signed.to_bytes().unwrap()
}

/// Bytes of `role` within a batch
pub fn part<'a>(batch: &'a [(RoleName, Vec<u8>)], role: &RoleName) -> &'a [u8] {
    batch
        .iter()
        .find(|(r, _)| r == role)
        .map(|(_, bytes)| bytes.as_slice())
        .unwrap()
}

// =============================================================================
// HTTP helpers
// =============================================================================

pub const BOUNDARY: &str = "notary-test-boundary";

pub fn multipart_body(parts: &[(RoleName, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (role, data) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{0}\"; filename=\"{0}\"\r\n",
                role
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn upload_request(gun: &str, parts: &[(RoleName, Vec<u8>)]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(format!("/v2/{}/_trust/tuf/", gun))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn state_with(store: Arc<dyn MetaStore>) -> Arc<AppState> {
    Arc::new(
        AppState::builder()
            .store(store)
            .crypto(Arc::new(Ed25519Service::new()))
            .key_algorithm("ed25519")
            .build()
            .unwrap(),
    )
}

pub fn router_with(store: Arc<dyn MetaStore>) -> Router {
    create_router(state_with(store))
}

pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// =============================================================================
// Fault-injecting stores
// =============================================================================

/// Store whose reads always fail
#[derive(Debug, Default)]
pub struct FailingReadStore {
    inner: MemoryStore,
}

impl FailingReadStore {
    pub const MESSAGE: &'static str = "oh no! storage has failed";
}

#[async_trait]
impl MetaStore for FailingReadStore {
    async fn get_current(&self, _gun: &str, _role: &RoleName) -> Result<StoredMeta, StorageError> {
        Err(StorageError::Database(Self::MESSAGE.into()))
    }

    async fn get_checksum(
        &self,
        _gun: &str,
        _role: &RoleName,
        _checksum: &str,
    ) -> Result<StoredMeta, StorageError> {
        Err(StorageError::Database(Self::MESSAGE.into()))
    }

    async fn update_current(&self, gun: &str, update: MetaUpdate) -> Result<(), StorageError> {
        self.inner.update_current(gun, update).await
    }

    async fn update_many(
        &self,
        gun: &str,
        updates: Vec<MetaUpdate>,
        base: Vec<BaseVersion>,
    ) -> Result<(), StorageError> {
        self.inner.update_many(gun, updates, base).await
    }

    async fn delete(&self, gun: &str) -> Result<(), StorageError> {
        self.inner.delete(gun).await
    }

    async fn get_key(&self, gun: &str, role: &RoleName) -> Result<TufKey, StorageError> {
        self.inner.get_key(gun, role).await
    }

    async fn set_key(&self, gun: &str, role: &RoleName, key: TufKey) -> Result<(), StorageError> {
        self.inner.set_key(gun, role, key).await
    }

    async fn check_health(&self) -> Result<(), StorageError> {
        Err(StorageError::Connection(Self::MESSAGE.into()))
    }
}

/// Store whose batch commits always lose a version race
#[derive(Debug, Default)]
pub struct OldVersionStore {
    inner: MemoryStore,
}

impl OldVersionStore {
    pub fn conflict(gun: &str) -> VersionConflict {
        VersionConflict {
            gun: gun.to_string(),
            role: RoleName::Root.to_string(),
            attempted: 1,
            current: 2,
        }
    }
}

#[async_trait]
impl MetaStore for OldVersionStore {
    async fn get_current(&self, gun: &str, role: &RoleName) -> Result<StoredMeta, StorageError> {
        self.inner.get_current(gun, role).await
    }

    async fn get_checksum(
        &self,
        gun: &str,
        role: &RoleName,
        checksum: &str,
    ) -> Result<StoredMeta, StorageError> {
        self.inner.get_checksum(gun, role, checksum).await
    }

    async fn update_current(&self, gun: &str, _update: MetaUpdate) -> Result<(), StorageError> {
        Err(StorageError::OldVersion(Self::conflict(gun)))
    }

    async fn update_many(
        &self,
        gun: &str,
        _updates: Vec<MetaUpdate>,
        _base: Vec<BaseVersion>,
    ) -> Result<(), StorageError> {
        Err(StorageError::OldVersion(Self::conflict(gun)))
    }

    async fn delete(&self, gun: &str) -> Result<(), StorageError> {
        self.inner.delete(gun).await
    }

    async fn get_key(&self, gun: &str, role: &RoleName) -> Result<TufKey, StorageError> {
        self.inner.get_key(gun, role).await
    }

    async fn set_key(&self, gun: &str, role: &RoleName, key: TufKey) -> Result<(), StorageError> {
        self.inner.set_key(gun, role, key).await
    }

    async fn check_health(&self) -> Result<(), StorageError> {
        self.inner.check_health().await
    }
}

/// Store that returns damaged bytes for checksum lookups
#[derive(Debug, Default)]
pub struct CorruptStore {
    inner: MemoryStore,
}

impl CorruptStore {
    pub const DATA: &'static [u8] = b"bit rot";
}

#[async_trait]
impl MetaStore for CorruptStore {
    async fn get_current(&self, gun: &str, role: &RoleName) -> Result<StoredMeta, StorageError> {
        self.inner.get_current(gun, role).await
    }

    async fn get_checksum(
        &self,
        _gun: &str,
        _role: &RoleName,
        _checksum: &str,
    ) -> Result<StoredMeta, StorageError> {
        Ok(StoredMeta {
            version: 1,
            last_modified: chrono::Utc::now(),
            data: Self::DATA.to_vec(),
        })
    }

    async fn update_current(&self, gun: &str, update: MetaUpdate) -> Result<(), StorageError> {
        self.inner.update_current(gun, update).await
    }

    async fn update_many(
        &self,
        gun: &str,
        updates: Vec<MetaUpdate>,
        base: Vec<BaseVersion>,
    ) -> Result<(), StorageError> {
        self.inner.update_many(gun, updates, base).await
    }

    async fn delete(&self, gun: &str) -> Result<(), StorageError> {
        self.inner.delete(gun).await
    }

    async fn get_key(&self, gun: &str, role: &RoleName) -> Result<TufKey, StorageError> {
        self.inner.get_key(gun, role).await
    }

    async fn set_key(&self, gun: &str, role: &RoleName, key: TufKey) -> Result<(), StorageError> {
        self.inner.set_key(gun, role, key).await
    }

    async fn check_health(&self) -> Result<(), StorageError> {
        self.inner.check_health().await
    }
}
