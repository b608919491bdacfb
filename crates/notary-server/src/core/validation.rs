//! Hierarchy validation for metadata updates
//!
//! This module contains the checks every published batch must pass before
//! any of it is committed:
//!
//! 1. Each document parses as its role and has not expired
//! 2. Signatures meet the threshold of the trusted keys for the role
//! 3. Cross-role references hold: snapshot pins root, targets and delegated
//!    roles; timestamp pins snapshot
//!
//! Version monotonicity is enforced once, by the store at commit time. The
//! stored versions the checks relied on travel with the validated batch, and
//! the store refuses the commit if any of them moved in the meantime.
//!
//! When a batch needs a snapshot or timestamp it does not carry, and the
//! server holds an authorised key for that role, the document is generated
//! and signed here so it commits together with the rest of the batch.

use chrono::{DateTime, Utc};
use notary_core::{
    default_expires, sha256_hex, CryptoService, Document, FileMeta, NotaryError, RawDocument,
    RoleName, Root, Signed, Snapshot, Targets, Timestamp,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::trust::{delegation_trust, TrustedKeySet};
use super::update::UpdateError;
use crate::storage::{BaseVersion, MetaStore, MetaUpdate, StorageError};

/// A cross-role relationship that does not hold
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{parent} -> {child}: {problem}")]
pub struct HierarchyEdge {
    /// Role whose document makes the reference
    pub parent: RoleName,
    /// Role being referenced
    pub child: RoleName,
    pub problem: HierarchyProblem,
}

/// What is wrong with a hierarchy edge
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HierarchyProblem {
    #[error("missing {role}")]
    Missing { role: RoleName },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("role is not delegated by its parent")]
    NotDelegated,
}

/// Error returned when a batch fails validation
///
/// Describes the publisher's own input, so it is safe to return in full.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("update contains no metadata")]
    Empty,

    #[error("malformed {role} metadata: {reason}")]
    Malformed { role: RoleName, reason: String },

    #[error("invalid root: {reason}")]
    BadRoot { reason: String },

    #[error("{role} has {valid} valid signatures, {threshold} required")]
    InsufficientSignatures {
        role: RoleName,
        threshold: u32,
        valid: u32,
    },

    #[error("bad hierarchy: {0}")]
    BadHierarchy(HierarchyEdge),

    #[error("{role} expired at {expires}")]
    Expired {
        role: RoleName,
        expires: DateTime<Utc>,
    },

    #[error("{role} is at version {version} and cannot be advanced")]
    VersionExhausted { role: RoleName, version: u64 },
}

impl ValidationError {
    fn missing(parent: RoleName, child: RoleName, role: RoleName) -> Self {
        ValidationError::BadHierarchy(HierarchyEdge {
            parent,
            child,
            problem: HierarchyProblem::Missing { role },
        })
    }
}

// =============================================================================
// Parsed batch
// =============================================================================

/// A proposed document with the exact bytes it was published as
#[derive(Debug)]
struct Proposed<T> {
    raw: RawDocument,
    doc: T,
    bytes: Vec<u8>,
}

fn malformed(role: &RoleName, err: NotaryError) -> ValidationError {
    ValidationError::Malformed {
        role: role.clone(),
        reason: err.to_string(),
    }
}

impl<T: Document> Proposed<T> {
    fn parse(role: &RoleName, bytes: Vec<u8>) -> Result<Self, ValidationError> {
        let raw = RawDocument::from_slice(&bytes).map_err(|e| malformed(role, e))?;
        let doc = raw.decode::<T>(role).map_err(|e| malformed(role, e))?;
        Ok(Self { raw, doc, bytes })
    }

    fn to_update(&self, role: RoleName) -> MetaUpdate {
        MetaUpdate {
            role,
            version: self.doc.version(),
            data: self.bytes.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Batch {
    root: Option<Proposed<Root>>,
    /// Targets and delegated roles
    targets: BTreeMap<RoleName, Proposed<Targets>>,
    snapshot: Option<Proposed<Snapshot>>,
    timestamp: Option<Proposed<Timestamp>>,
}

impl Batch {
    fn parse(docs: Vec<(RoleName, Vec<u8>)>) -> Result<Self, ValidationError> {
        if docs.is_empty() {
            return Err(ValidationError::Empty);
        }

        let mut batch = Batch::default();
        let mut seen = HashSet::new();
        for (role, bytes) in docs {
            if !seen.insert(role.clone()) {
                return Err(ValidationError::Malformed {
                    role,
                    reason: "role submitted more than once".into(),
                });
            }
            match role {
                RoleName::Root => batch.root = Some(Proposed::parse(&role, bytes)?),
                RoleName::Snapshot => batch.snapshot = Some(Proposed::parse(&role, bytes)?),
                RoleName::Timestamp => batch.timestamp = Some(Proposed::parse(&role, bytes)?),
                RoleName::Targets | RoleName::Delegation(_) => {
                    let doc = Proposed::parse(&role, bytes)?;
                    batch.targets.insert(role, doc);
                }
            }
        }
        Ok(batch)
    }

    /// First role in hierarchy order, used to report a missing root
    fn first_role(&self) -> RoleName {
        if self.root.is_some() {
            RoleName::Root
        } else if let Some(role) = self.targets.keys().next() {
            role.clone()
        } else if self.snapshot.is_some() {
            RoleName::Snapshot
        } else {
            RoleName::Timestamp
        }
    }

    fn expiries(&self) -> Vec<(RoleName, DateTime<Utc>)> {
        let mut expiries = Vec::new();
        if let Some(root) = &self.root {
            expiries.push((RoleName::Root, root.doc.expires));
        }
        for (role, targets) in &self.targets {
            expiries.push((role.clone(), targets.doc.expires));
        }
        if let Some(snapshot) = &self.snapshot {
            expiries.push((RoleName::Snapshot, snapshot.doc.expires));
        }
        if let Some(timestamp) = &self.timestamp {
            expiries.push((RoleName::Timestamp, timestamp.doc.expires));
        }
        expiries
    }

    /// Whether the batch changes a role the snapshot pins
    fn changes_pinned_roles(&self) -> bool {
        self.root.is_some() || !self.targets.is_empty()
    }
}

fn next_version(role: RoleName, previous: u64) -> Result<u64, ValidationError> {
    previous
        .checked_add(1)
        .ok_or(ValidationError::VersionExhausted {
            role,
            version: previous,
        })
}

// =============================================================================
// Validator
// =============================================================================

/// A batch that passed validation, ready to commit
#[derive(Debug)]
pub struct ValidatedBatch {
    /// Versions to commit, in hierarchy order
    pub updates: Vec<MetaUpdate>,
    /// Stored versions the checks were made against
    pub base: Vec<BaseVersion>,
}

/// Validates a proposed batch against the repository's stored state
pub struct HierarchyValidator<'a> {
    store: &'a dyn MetaStore,
    crypto: &'a dyn CryptoService,
    gun: &'a str,
    now: DateTime<Utc>,
    /// First stored version seen per role; 0 when absent
    base: Mutex<BTreeMap<RoleName, u64>>,
}

impl<'a> HierarchyValidator<'a> {
    pub fn new(store: &'a dyn MetaStore, crypto: &'a dyn CryptoService, gun: &'a str) -> Self {
        Self {
            store,
            crypto,
            gun,
            now: Utc::now(),
            base: Mutex::new(BTreeMap::new()),
        }
    }

    /// Validate as of `now` instead of the current time
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Validate `docs` and return the set of versions to commit
    ///
    /// The result includes any snapshot or timestamp generated by the server,
    /// and the stored versions it was checked against.
    pub async fn validate(
        &self,
        docs: Vec<(RoleName, Vec<u8>)>,
    ) -> Result<ValidatedBatch, UpdateError> {
        let batch = Batch::parse(docs)?;
        self.check_expiry(&batch)?;

        let trusted = self.trusted_keys(&batch).await?;
        self.verify_targets_tree(&batch, &trusted).await?;

        let snapshot = self.resolve_snapshot(&batch, &trusted).await?;
        let timestamp = self
            .resolve_timestamp(&batch, &trusted, snapshot.as_ref())
            .await?;

        let mut updates = Vec::new();
        if let Some(root) = &batch.root {
            updates.push(root.to_update(RoleName::Root));
        }
        let mut tree: Vec<_> = batch.targets.iter().collect();
        tree.sort_by_key(|(role, _)| role.depth());
        for (role, targets) in tree {
            updates.push(targets.to_update(role.clone()));
        }
        updates.extend(snapshot);
        updates.extend(timestamp);

        let base = std::mem::take(&mut *self.base.lock())
            .into_iter()
            .map(|(role, version)| BaseVersion { role, version })
            .collect();
        Ok(ValidatedBatch { updates, base })
    }

    fn check_expiry(&self, batch: &Batch) -> Result<(), ValidationError> {
        for (role, expires) in batch.expiries() {
            if expires <= self.now {
                warn!(gun = %self.gun, role = %role, expires = %expires, "Rejected expired metadata");
                return Err(ValidationError::Expired { role, expires });
            }
        }
        Ok(())
    }

    // =========================================================================
    // Stored state
    // =========================================================================

    async fn stored_bytes(&self, role: &RoleName) -> Result<Option<Vec<u8>>, UpdateError> {
        let (version, data) = match self.store.get_current(self.gun, role).await {
            Ok(meta) => (meta.version, Some(meta.data)),
            Err(StorageError::NotFound(_)) => (0, None),
            Err(e) => return Err(UpdateError::Storage(e)),
        };
        self.base.lock().entry(role.clone()).or_insert(version);
        Ok(data)
    }

    async fn stored_doc<T: Document>(
        &self,
        role: &RoleName,
    ) -> Result<Option<(Vec<u8>, T)>, UpdateError> {
        let Some(bytes) = self.stored_bytes(role).await? else {
            return Ok(None);
        };
        let doc = RawDocument::from_slice(&bytes)
            .and_then(|raw| raw.decode::<T>(role))
            .map_err(|e| {
                UpdateError::Storage(StorageError::Serialization(format!(
                    "stored {} is unreadable: {}",
                    role, e
                )))
            })?;
        Ok(Some((bytes, doc)))
    }

    /// Current bytes of `role`: from the batch if present, else from storage
    async fn effective_bytes(
        &self,
        batch: &Batch,
        role: &RoleName,
    ) -> Result<Option<Vec<u8>>, UpdateError> {
        let proposed = match role {
            RoleName::Root => batch.root.as_ref().map(|p| p.bytes.clone()),
            RoleName::Snapshot => batch.snapshot.as_ref().map(|p| p.bytes.clone()),
            RoleName::Timestamp => batch.timestamp.as_ref().map(|p| p.bytes.clone()),
            _ => batch.targets.get(role).map(|p| p.bytes.clone()),
        };
        match proposed {
            Some(bytes) => Ok(Some(bytes)),
            None => self.stored_bytes(role).await,
        }
    }

    // =========================================================================
    // Signatures
    // =========================================================================

    /// Keys for the top-level roles, verifying any new root on the way
    ///
    /// A new root must satisfy its own root keys, and the stored root's root
    /// keys when it replaces one.
    async fn trusted_keys(&self, batch: &Batch) -> Result<TrustedKeySet, UpdateError> {
        let stored = self.stored_doc::<Root>(&RoleName::Root).await?;

        match (&batch.root, stored) {
            (Some(proposed), stored) => {
                let trusted = TrustedKeySet::from_root(&proposed.doc)?;
                trusted.verify(&RoleName::Root, &proposed.raw)?;
                if let Some((_, current)) = stored {
                    TrustedKeySet::from_root(&current)?.verify(&RoleName::Root, &proposed.raw)?;
                    debug!(gun = %self.gun, from = current.version, to = proposed.doc.version, "Root rotation verified");
                }
                Ok(trusted)
            }
            (None, Some((_, current))) => Ok(TrustedKeySet::from_root(&current)?),
            (None, None) => Err(ValidationError::missing(
                RoleName::Root,
                batch.first_role(),
                RoleName::Root,
            )
            .into()),
        }
    }

    async fn verify_targets_tree(
        &self,
        batch: &Batch,
        trusted: &TrustedKeySet,
    ) -> Result<(), UpdateError> {
        let mut tree: Vec<_> = batch.targets.iter().collect();
        tree.sort_by_key(|(role, _)| role.depth());

        for (role, proposed) in tree {
            let Some(parent) = role.parent() else {
                trusted.verify(role, &proposed.raw)?;
                continue;
            };

            let delegations = match batch.targets.get(&parent) {
                Some(p) => p.doc.delegations.clone(),
                None => match self.stored_doc::<Targets>(&parent).await? {
                    Some((_, stored)) => stored.delegations,
                    None => {
                        return Err(
                            ValidationError::missing(parent.clone(), role.clone(), parent).into(),
                        )
                    }
                },
            };

            delegation_trust(&parent, &delegations, role)?.verify(role, &proposed.raw)?;
        }
        Ok(())
    }

    // =========================================================================
    // Snapshot
    // =========================================================================

    /// The snapshot to commit with this batch, if any
    async fn resolve_snapshot(
        &self,
        batch: &Batch,
        trusted: &TrustedKeySet,
    ) -> Result<Option<MetaUpdate>, UpdateError> {
        if let Some(proposed) = &batch.snapshot {
            trusted.verify(&RoleName::Snapshot, &proposed.raw)?;
            self.check_snapshot_edges(batch, &proposed.doc).await?;
            return Ok(Some(proposed.to_update(RoleName::Snapshot)));
        }

        if !batch.changes_pinned_roles() {
            return Ok(None);
        }

        let stored = self.stored_doc::<Snapshot>(&RoleName::Snapshot).await?;
        if let Some(key_id) = self.server_key(&RoleName::Snapshot, trusted).await? {
            return Ok(Some(self.generate_snapshot(batch, stored, &key_id).await?));
        }

        // A repository's first root can land before anything is pinned
        let root_only = batch.targets.is_empty();
        if root_only && stored.is_none() {
            return Ok(None);
        }

        warn!(gun = %self.gun, "Rejected update without snapshot");
        Err(ValidationError::missing(RoleName::Snapshot, batch.first_role(), RoleName::Snapshot).into())
    }

    async fn check_snapshot_edges(
        &self,
        batch: &Batch,
        snapshot: &Snapshot,
    ) -> Result<(), UpdateError> {
        let mut pinned = vec![RoleName::Root, RoleName::Targets];
        pinned.extend(batch.targets.keys().filter(|r| r.is_delegation()).cloned());

        for role in pinned {
            let Some(bytes) = self.effective_bytes(batch, &role).await? else {
                return Err(
                    ValidationError::missing(RoleName::Snapshot, role.clone(), role).into(),
                );
            };
            check_edge(&RoleName::Snapshot, &role, snapshot.meta.get(role.as_str()), &bytes)?;
        }
        Ok(())
    }

    async fn generate_snapshot(
        &self,
        batch: &Batch,
        stored: Option<(Vec<u8>, Snapshot)>,
        key_id: &str,
    ) -> Result<MetaUpdate, UpdateError> {
        let (mut meta, version) = match stored {
            Some((_, previous)) => (
                previous.meta,
                next_version(RoleName::Snapshot, previous.version)?,
            ),
            None => (BTreeMap::new(), 1),
        };

        for role in [RoleName::Root, RoleName::Targets] {
            if let Some(bytes) = self.effective_bytes(batch, &role).await? {
                meta.insert(role.to_string(), FileMeta::from_bytes(&bytes));
            }
        }
        for (role, proposed) in &batch.targets {
            meta.insert(role.to_string(), FileMeta::from_bytes(&proposed.bytes));
        }

        let mut snapshot = Snapshot::new(version, default_expires(&RoleName::Snapshot));
        snapshot.meta = meta;

        let data = Signed::new(snapshot)
            .sign_with(self.crypto, key_id)?
            .to_bytes()?;
        info!(gun = %self.gun, version = version, "Generated snapshot");

        Ok(MetaUpdate {
            role: RoleName::Snapshot,
            version,
            data,
        })
    }

    // =========================================================================
    // Timestamp
    // =========================================================================

    /// The timestamp to commit with this batch, if any
    async fn resolve_timestamp(
        &self,
        batch: &Batch,
        trusted: &TrustedKeySet,
        snapshot: Option<&MetaUpdate>,
    ) -> Result<Option<MetaUpdate>, UpdateError> {
        if let Some(proposed) = &batch.timestamp {
            trusted.verify(&RoleName::Timestamp, &proposed.raw)?;

            let snapshot_bytes = match snapshot {
                Some(update) => Some(update.data.clone()),
                None => self.stored_bytes(&RoleName::Snapshot).await?,
            };
            let Some(snapshot_bytes) = snapshot_bytes else {
                return Err(ValidationError::missing(
                    RoleName::Timestamp,
                    RoleName::Snapshot,
                    RoleName::Snapshot,
                )
                .into());
            };
            check_edge(
                &RoleName::Timestamp,
                &RoleName::Snapshot,
                proposed.doc.snapshot_meta(),
                &snapshot_bytes,
            )?;
            return Ok(Some(proposed.to_update(RoleName::Timestamp)));
        }

        let Some(snapshot) = snapshot else {
            return Ok(None);
        };
        let Some(key_id) = self.server_key(&RoleName::Timestamp, trusted).await? else {
            debug!(gun = %self.gun, "No server timestamp key; timestamp left unchanged");
            return Ok(None);
        };

        let version = match self.stored_doc::<Timestamp>(&RoleName::Timestamp).await? {
            Some((_, previous)) => next_version(RoleName::Timestamp, previous.version)?,
            None => 1,
        };
        let timestamp = Timestamp::new(version, default_expires(&RoleName::Timestamp), &snapshot.data);
        let data = Signed::new(timestamp)
            .sign_with(self.crypto, &key_id)?
            .to_bytes()?;
        info!(gun = %self.gun, version = version, "Generated timestamp");

        Ok(Some(MetaUpdate {
            role: RoleName::Timestamp,
            version,
            data,
        }))
    }

    /// Key id of the server-held key for `role`, if the trusted root lets it
    /// sign alone and the crypto service holds its private half
    async fn server_key(
        &self,
        role: &RoleName,
        trusted: &TrustedKeySet,
    ) -> Result<Option<String>, UpdateError> {
        let key = match self.store.get_key(self.gun, role).await {
            Ok(key) => key,
            Err(StorageError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(UpdateError::Storage(e)),
        };

        let key_id = key.key_id();
        if !trusted.can_sign_alone(role, &key_id) {
            debug!(gun = %self.gun, role = %role, key_id = %key_id, "Server key not authorised by root");
            return Ok(None);
        }
        if self.crypto.public_key(&key_id).is_none() {
            warn!(gun = %self.gun, role = %role, key_id = %key_id, "Server key has no private half in the crypto service");
            return Ok(None);
        }
        Ok(Some(key_id))
    }
}

/// Check that `meta` pins exactly `actual`
fn check_edge(
    parent: &RoleName,
    child: &RoleName,
    meta: Option<&FileMeta>,
    actual: &[u8],
) -> Result<(), ValidationError> {
    let Some(expected) = meta.and_then(FileMeta::sha256) else {
        return Err(ValidationError::missing(parent.clone(), child.clone(), child.clone()));
    };

    let actual = sha256_hex(actual);
    if expected != actual {
        warn!(parent = %parent, child = %child, "SECURITY: Checksum mismatch in metadata hierarchy");
        return Err(ValidationError::BadHierarchy(HierarchyEdge {
            parent: parent.clone(),
            child: child.clone(),
            problem: HierarchyProblem::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            },
        }));
    }
    Ok(())
}
