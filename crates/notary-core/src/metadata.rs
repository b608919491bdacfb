//! Signed TUF metadata documents
//!
//! Every document travels as a JSON envelope:
//!
//! ```json
//! {"signed": {"_type": "Root", "version": 1, "expires": "...", ...},
//!  "signatures": [{"keyid": "...", "method": "ed25519", "sig": "..."}]}
//! ```
//!
//! Signatures cover the canonical JSON encoding of the `signed` value: object
//! keys sorted, no insignificant whitespace. Verification re-encodes the
//! parsed `signed` value, so unknown fields stay covered by the signature.

use crate::checksum::sha256_hex;
use crate::crypto::{CryptoService, KeyPair, Signature, TufKey};
use crate::error::{NotaryError, Result};
use crate::role::RoleName;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hash algorithm name used in `FileMeta::hashes`
pub const SHA256: &str = "sha256";

/// Canonical JSON encoding used for signing and key ids
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&value)?)
}

/// Default validity window for documents of `role`, starting now
pub fn default_expires(role: &RoleName) -> DateTime<Utc> {
    let window = match role {
        RoleName::Root => Duration::days(365 * 10),
        RoleName::Targets | RoleName::Delegation(_) => Duration::days(365 * 3),
        RoleName::Snapshot => Duration::days(365 * 3),
        RoleName::Timestamp => Duration::days(14),
    };
    Utc::now() + window
}

/// Fields shared by every signed document body
pub trait Document: Serialize + DeserializeOwned {
    /// `_type` discriminator
    fn document_type(&self) -> &str;
    fn version(&self) -> u64;
    fn expires(&self) -> DateTime<Utc>;
}

/// Length and hashes of a referenced metadata file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub length: u64,
    pub hashes: BTreeMap<String, String>,
}

impl FileMeta {
    /// Describe `data` by length and SHA-256
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hashes = BTreeMap::new();
        hashes.insert(SHA256.to_string(), sha256_hex(data));
        Self {
            length: data.len() as u64,
            hashes,
        }
    }

    pub fn sha256(&self) -> Option<&str> {
        self.hashes.get(SHA256).map(String::as_str)
    }
}

/// Keys and signature threshold for one role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: Vec<String>,
    pub threshold: u32,
}

/// Root metadata: the trust anchor of a repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Root {
    #[serde(rename = "_type")]
    pub doc_type: String,
    pub version: u64,
    pub expires: DateTime<Utc>,
    pub keys: BTreeMap<String, TufKey>,
    pub roles: BTreeMap<String, RoleKeys>,
    #[serde(default)]
    pub consistent_snapshot: bool,
}

impl Root {
    pub fn new(version: u64, expires: DateTime<Utc>) -> Self {
        Self {
            doc_type: RoleName::Root.document_type().to_string(),
            version,
            expires,
            keys: BTreeMap::new(),
            roles: BTreeMap::new(),
            consistent_snapshot: false,
        }
    }

    /// Authorise `key` for `role`, creating the role with threshold 1 if needed
    pub fn add_key(&mut self, role: &RoleName, key: TufKey) {
        let key_id = key.key_id();
        self.keys.insert(key_id.clone(), key);
        let entry = self
            .roles
            .entry(role.to_string())
            .or_insert_with(|| RoleKeys {
                keyids: Vec::new(),
                threshold: 1,
            });
        if !entry.keyids.contains(&key_id) {
            entry.keyids.push(key_id);
        }
    }

    /// Key ids and threshold for a top-level role
    pub fn role_keys(&self, role: &RoleName) -> Option<&RoleKeys> {
        self.roles.get(role.as_str())
    }
}

/// Targets metadata, also used for delegated roles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Targets {
    #[serde(rename = "_type")]
    pub doc_type: String,
    pub version: u64,
    pub expires: DateTime<Utc>,
    #[serde(default)]
    pub targets: BTreeMap<String, FileMeta>,
    #[serde(default)]
    pub delegations: Delegations,
}

impl Targets {
    pub fn new(version: u64, expires: DateTime<Utc>) -> Self {
        Self {
            doc_type: RoleName::Targets.document_type().to_string(),
            version,
            expires,
            targets: BTreeMap::new(),
            delegations: Delegations::default(),
        }
    }
}

/// Delegations from a targets role to sub-roles
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delegations {
    #[serde(default)]
    pub keys: BTreeMap<String, TufKey>,
    #[serde(default)]
    pub roles: Vec<DelegatedRole>,
}

impl Delegations {
    pub fn role(&self, name: &RoleName) -> Option<&DelegatedRole> {
        self.roles.iter().find(|r| &r.name == name)
    }
}

/// One delegated role entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedRole {
    pub name: RoleName,
    pub keyids: Vec<String>,
    pub threshold: u32,
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Snapshot metadata: checksums of root, targets and delegated roles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "_type")]
    pub doc_type: String,
    pub version: u64,
    pub expires: DateTime<Utc>,
    pub meta: BTreeMap<String, FileMeta>,
}

impl Snapshot {
    pub fn new(version: u64, expires: DateTime<Utc>) -> Self {
        Self {
            doc_type: RoleName::Snapshot.document_type().to_string(),
            version,
            expires,
            meta: BTreeMap::new(),
        }
    }
}

/// Timestamp metadata: checksum of the current snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timestamp {
    #[serde(rename = "_type")]
    pub doc_type: String,
    pub version: u64,
    pub expires: DateTime<Utc>,
    pub meta: BTreeMap<String, FileMeta>,
}

impl Timestamp {
    pub fn new(version: u64, expires: DateTime<Utc>, snapshot: &[u8]) -> Self {
        let mut meta = BTreeMap::new();
        meta.insert(RoleName::Snapshot.to_string(), FileMeta::from_bytes(snapshot));
        Self {
            doc_type: RoleName::Timestamp.document_type().to_string(),
            version,
            expires,
            meta,
        }
    }

    pub fn snapshot_meta(&self) -> Option<&FileMeta> {
        self.meta.get(RoleName::Snapshot.as_str())
    }
}

macro_rules! impl_document {
    ($($ty:ty),*) => {
        $(impl Document for $ty {
            fn document_type(&self) -> &str {
                &self.doc_type
            }

            fn version(&self) -> u64 {
                self.version
            }

            fn expires(&self) -> DateTime<Utc> {
                self.expires
            }
        })*
    };
}

impl_document!(Root, Targets, Snapshot, Timestamp);

/// A typed document with its signatures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signed<T> {
    pub signed: T,
    pub signatures: Vec<Signature>,
}

impl<T: Document> Signed<T> {
    /// Wrap an unsigned document
    pub fn new(signed: T) -> Self {
        Self {
            signed,
            signatures: Vec::new(),
        }
    }

    /// Bytes covered by signatures
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        canonical_json(&self.signed)
    }

    /// Add a signature from a local key pair
    pub fn sign(mut self, key_pair: &KeyPair) -> Result<Self> {
        let message = self.canonical_bytes()?;
        self.signatures.push(key_pair.sign(&message));
        Ok(self)
    }

    /// Add a signature produced by a crypto service
    pub fn sign_with(mut self, crypto: &dyn CryptoService, key_id: &str) -> Result<Self> {
        let message = self.canonical_bytes()?;
        self.signatures.push(crypto.sign(key_id, &message)?);
        Ok(self)
    }

    /// Serialize the envelope
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A document as received, before its body is interpreted
#[derive(Debug, Clone, Deserialize)]
pub struct RawDocument {
    pub signed: serde_json::Value,
    pub signatures: Vec<Signature>,
}

impl RawDocument {
    /// Parse an envelope from published bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| NotaryError::Malformed(e.to_string()))
    }

    /// Bytes covered by signatures
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.signed)?)
    }

    /// Interpret the body as a document of `role`
    pub fn decode<T: Document>(&self, role: &RoleName) -> Result<T> {
        let doc: T = serde_json::from_value(self.signed.clone())
            .map_err(|e| NotaryError::Malformed(e.to_string()))?;

        if doc.document_type() != role.document_type() {
            return Err(NotaryError::Malformed(format!(
                "expected _type {}, got {}",
                role.document_type(),
                doc.document_type()
            )));
        }
        if doc.version() == 0 {
            return Err(NotaryError::Malformed("version must be positive".into()));
        }
        Ok(doc)
    }
}
