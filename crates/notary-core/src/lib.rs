//! # Notary Core
//!
//! Data model and cryptographic primitives shared by the notary server:
//!
//! - **Roles**: the closed set of TUF roles plus delegated targets roles
//! - **Documents**: signed root, targets, snapshot and timestamp metadata
//! - **Checksums**: SHA-256 content addresses over exact document bytes
//! - **Keys**: Ed25519 key pairs, public keys and the `CryptoService` capability
//!
//! ## Hierarchy
//!
//! 1. **Root** delegates keys and thresholds for every top-level role
//! 2. **Snapshot** pins the checksums of root, targets and delegated roles
//! 3. **Timestamp** pins the checksum of the snapshot

pub mod checksum;
pub mod crypto;
pub mod error;
pub mod metadata;
pub mod role;

pub use checksum::{is_valid_checksum, sha256_hex};
pub use crypto::{CryptoService, Ed25519Service, KeyAlgorithm, KeyPair, Signature, TufKey};
pub use error::{NotaryError, Result};
pub use metadata::{
    canonical_json, default_expires, DelegatedRole, Delegations, Document, FileMeta,
    RawDocument, RoleKeys, Root, Signed, Snapshot, Targets, Timestamp,
};
pub use role::RoleName;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
