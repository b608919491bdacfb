//! Cryptographic primitives for TUF metadata signing
//!
//! Key types:
//! - `KeyAlgorithm`: named signature scheme (Ed25519)
//! - `TufKey`: public key as it appears inside root and delegation metadata
//! - `KeyPair`: Ed25519 key pair for signing
//! - `Signature`: one entry of a document's `signatures` list
//! - `CryptoService`: the signing capability the server consumes
//!
//! Key ids are the hex SHA-256 of the canonical JSON encoding of the public key.

use crate::checksum::sha256_hex;
use crate::error::{NotaryError, Result};
use crate::role::RoleName;
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use parking_lot::RwLock;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Signature scheme used for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    /// EdDSA over Curve25519
    Ed25519,
}

impl KeyAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgorithm::Ed25519 => "ed25519",
        }
    }
}

impl FromStr for KeyAlgorithm {
    type Err = NotaryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" => Err(NotaryError::InvalidKeyAlgorithm("empty".into())),
            "ed25519" => Ok(KeyAlgorithm::Ed25519),
            other => Err(NotaryError::InvalidKeyAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public key value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Base64-encoded public key bytes
    pub public: String,
}

/// Public key as published in root and delegation metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TufKey {
    pub keytype: KeyAlgorithm,
    pub keyval: KeyValue,
}

impl TufKey {
    /// Wrap an Ed25519 verifying key
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self {
            keytype: KeyAlgorithm::Ed25519,
            keyval: KeyValue {
                public: STANDARD.encode(key.to_bytes()),
            },
        }
    }

    /// Key id: hex SHA-256 of the canonical JSON encoding of this key
    ///
    /// The encoding is built as a `Value`, whose objects keep their keys
    /// sorted and whose rendering is infallible.
    pub fn key_id(&self) -> String {
        let canonical = serde_json::json!({
            "keytype": self.keytype.as_str(),
            "keyval": { "public": self.keyval.public },
        });
        sha256_hex(canonical.to_string().as_bytes())
    }

    /// Raw public key bytes
    pub fn public_bytes(&self) -> Result<Vec<u8>> {
        Ok(STANDARD.decode(&self.keyval.public)?)
    }

    fn verifying_key(&self) -> Result<VerifyingKey> {
        let bytes: [u8; 32] = self
            .public_bytes()?
            .try_into()
            .map_err(|_| NotaryError::CryptoError("invalid public key length".into()))?;
        Ok(VerifyingKey::from_bytes(&bytes)?)
    }

    /// Verify `signature` over `message`
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        if signature.method != self.keytype {
            return Err(NotaryError::CryptoError(format!(
                "signature method {} does not match key type {}",
                signature.method, self.keytype
            )));
        }

        let sig_bytes: [u8; 64] = STANDARD
            .decode(&signature.sig)?
            .try_into()
            .map_err(|_| NotaryError::CryptoError("invalid signature length".into()))?;
        let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);

        self.verifying_key()?
            .verify(message, &sig)
            .map_err(|e| NotaryError::CryptoError(e.to_string()))
    }
}

/// One signature over a document's `signed` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Id of the key that produced the signature
    pub keyid: String,
    /// Signature scheme
    pub method: KeyAlgorithm,
    /// Base64-encoded signature bytes
    pub sig: String,
}

/// Ed25519 key pair for signing metadata
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    public: TufKey,
    key_id: String,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_id", &self.key_id)
            .field("signing_key", &"[redacted]")
            .finish()
    }
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Create a key pair from an existing signing key
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let public = TufKey::from_verifying_key(&signing_key.verifying_key());
        let key_id = public.key_id();
        Self {
            signing_key,
            public,
            key_id,
        }
    }

    /// Create a key pair from raw secret bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(bytes))
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn public_key(&self) -> TufKey {
        self.public.clone()
    }

    /// Get the raw signing key bytes
    pub fn signing_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Sign arbitrary bytes
    pub fn sign(&self, message: &[u8]) -> Signature {
        let signature = self.signing_key.sign(message);
        Signature {
            keyid: self.key_id.clone(),
            method: KeyAlgorithm::Ed25519,
            sig: STANDARD.encode(signature.to_bytes()),
        }
    }
}

/// Signing capability consumed by the server
///
/// The server never touches private key material directly; it asks the crypto
/// service to create keys and to sign on its behalf.
pub trait CryptoService: Send + Sync + fmt::Debug {
    /// Whether keys of `algorithm` can be created
    fn supports(&self, algorithm: KeyAlgorithm) -> bool;

    /// Create a new key for `role` in repository `gun`, returning the public half
    fn create(&self, gun: &str, role: &RoleName, algorithm: KeyAlgorithm) -> Result<TufKey>;

    /// Public key for a key id held by this service
    fn public_key(&self, key_id: &str) -> Option<TufKey>;

    /// Sign `message` with the private key for `key_id`
    fn sign(&self, key_id: &str, message: &[u8]) -> Result<Signature>;
}

/// In-memory Ed25519 crypto service
///
/// Private keys are lost on restart.
#[derive(Debug, Default)]
pub struct Ed25519Service {
    keys: RwLock<HashMap<String, KeyPair>>,
}

impl Ed25519Service {
    pub fn new() -> Self {
        Self::default()
    }

    /// Import an existing key pair, returning its key id
    pub fn add_key(&self, key_pair: KeyPair) -> String {
        let key_id = key_pair.key_id().to_string();
        self.keys.write().insert(key_id.clone(), key_pair);
        key_id
    }

    /// Number of private keys held
    pub fn key_count(&self) -> usize {
        self.keys.read().len()
    }
}

impl CryptoService for Ed25519Service {
    fn supports(&self, algorithm: KeyAlgorithm) -> bool {
        algorithm == KeyAlgorithm::Ed25519
    }

    fn create(&self, gun: &str, role: &RoleName, algorithm: KeyAlgorithm) -> Result<TufKey> {
        if !self.supports(algorithm) {
            return Err(NotaryError::UnsupportedAlgorithm(algorithm.to_string()));
        }
        let key_pair = KeyPair::generate();
        let public = key_pair.public_key();
        let key_id = self.add_key(key_pair);
        debug!(gun = %gun, role = %role, key_id = %key_id, "Created signing key");
        Ok(public)
    }

    fn public_key(&self, key_id: &str) -> Option<TufKey> {
        self.keys.read().get(key_id).map(KeyPair::public_key)
    }

    fn sign(&self, key_id: &str, message: &[u8]) -> Result<Signature> {
        let keys = self.keys.read();
        let key_pair = keys
            .get(key_id)
            .ok_or_else(|| NotaryError::UnknownKey(key_id.to_string()))?;
        Ok(key_pair.sign(message))
    }
}
