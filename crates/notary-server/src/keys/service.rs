//! Key Service for the notary server
//!
//! Issues the public keys of server-managed roles (snapshot and timestamp).
//! A key is created through the crypto service the first time it is asked
//! for and returned unchanged on every later request. Root and targets keys
//! belong to publishers and are never issued here.
//!
//! A recorded key is only handed out while the crypto service can still sign
//! with it. Key records can outlive the private keys (a persistent store in
//! front of an in-memory crypto service), and such a key is a configuration
//! fault rather than something to publish.

use notary_core::{CryptoService, KeyAlgorithm, NotaryError, RoleName, TufKey};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::storage::{MetaStore, StorageError};

/// Error returned by key issuance
#[derive(Error, Debug)]
pub enum KeyError {
    /// Repository or role missing from the request
    #[error("unknown repository or role")]
    UnknownRole,

    /// Role exists but its keys are not held by the server
    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Storage(StorageError),

    #[error("key creation failed: {0}")]
    Crypto(NotaryError),
}

/// Issues and remembers server-held keys
#[derive(Debug)]
pub struct KeyService {
    store: Arc<dyn MetaStore>,
    crypto: Arc<dyn CryptoService>,
    algorithm: KeyAlgorithm,
    /// Serialises creation so concurrent first requests share one key
    create_lock: Mutex<()>,
}

impl KeyService {
    pub fn new(
        store: Arc<dyn MetaStore>,
        crypto: Arc<dyn CryptoService>,
        algorithm: KeyAlgorithm,
    ) -> Self {
        Self {
            store,
            crypto,
            algorithm,
            create_lock: Mutex::new(()),
        }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// Return the key for `role` in `gun`, creating it on first use
    pub async fn get_or_create_key(&self, gun: &str, role: &str) -> Result<TufKey, KeyError> {
        if gun.is_empty() || role.is_empty() {
            return Err(KeyError::UnknownRole);
        }

        let role: RoleName = role
            .parse()
            .map_err(|_| KeyError::InvalidRole(role.to_string()))?;
        if !role.is_server_managed() {
            return Err(KeyError::InvalidRole(role.to_string()));
        }

        if !self.crypto.supports(self.algorithm) {
            return Err(KeyError::InvalidConfiguration(format!(
                "invalid keyalgorithm: {}",
                self.algorithm
            )));
        }

        if let Some(key) = self.stored_key(gun, &role).await? {
            return self.signable(gun, &role, key);
        }

        let _guard = self.create_lock.lock().await;
        if let Some(key) = self.stored_key(gun, &role).await? {
            return self.signable(gun, &role, key);
        }

        let key = self
            .crypto
            .create(gun, &role, self.algorithm)
            .map_err(|e| match e {
                NotaryError::UnsupportedAlgorithm(alg) => {
                    KeyError::InvalidConfiguration(format!("invalid keyalgorithm: {}", alg))
                }
                other => KeyError::Crypto(other),
            })?;

        match self.store.set_key(gun, &role, key.clone()).await {
            Ok(()) => {
                info!(gun = %gun, role = %role, key_id = %key.key_id(), "Created server-managed key");
                Ok(key)
            }
            // Another instance got there first
            Err(StorageError::KeyExists { .. }) => {
                let stored = self.stored_key(gun, &role).await?.ok_or_else(|| {
                    KeyError::Storage(StorageError::NotFound(format!("key {}/{}", gun, role)))
                })?;
                self.signable(gun, &role, stored)
            }
            Err(e) => {
                error!(gun = %gun, role = %role, error = %e, "Failed to record server-managed key");
                Err(KeyError::Storage(e))
            }
        }
    }

    fn signable(&self, gun: &str, role: &RoleName, key: TufKey) -> Result<TufKey, KeyError> {
        let key_id = key.key_id();
        if self.crypto.public_key(&key_id).is_none() {
            error!(gun = %gun, role = %role, key_id = %key_id, "Recorded server key has no private key in the crypto service");
            return Err(KeyError::InvalidConfiguration(format!(
                "crypto service does not hold the {} key for {}",
                role, gun
            )));
        }
        Ok(key)
    }

    async fn stored_key(&self, gun: &str, role: &RoleName) -> Result<Option<TufKey>, KeyError> {
        match self.store.get_key(gun, role).await {
            Ok(key) => Ok(Some(key)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(KeyError::Storage(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use notary_core::Ed25519Service;

    fn service() -> (Arc<Ed25519Service>, KeyService) {
        let crypto = Arc::new(Ed25519Service::new());
        let service = KeyService::new(
            Arc::new(MemoryStore::new()),
            crypto.clone(),
            KeyAlgorithm::Ed25519,
        );
        (crypto, service)
    }

    #[tokio::test]
    async fn test_key_created_once() {
        let (crypto, service) = service();

        let first = service.get_or_create_key("gun", "snapshot").await.unwrap();
        let second = service.get_or_create_key("gun", "snapshot").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(crypto.key_count(), 1);
        assert!(crypto.public_key(&first.key_id()).is_some());
    }

    #[tokio::test]
    async fn test_keys_are_per_role_and_repository() {
        let (crypto, service) = service();

        let snapshot = service.get_or_create_key("gun", "snapshot").await.unwrap();
        let timestamp = service.get_or_create_key("gun", "timestamp").await.unwrap();
        let other = service.get_or_create_key("other", "timestamp").await.unwrap();

        assert_ne!(snapshot, timestamp);
        assert_ne!(timestamp, other);
        assert_eq!(crypto.key_count(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_share_a_key() {
        let (crypto, service) = service();
        let service = Arc::new(service);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.get_or_create_key("gun", "timestamp").await })
            })
            .collect();

        let mut keys = Vec::new();
        for handle in handles {
            keys.push(handle.await.unwrap().unwrap());
        }
        assert!(keys.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(crypto.key_count(), 1);
    }

    #[tokio::test]
    async fn test_recorded_key_without_private_half_refused() {
        let store = Arc::new(MemoryStore::new());
        let crypto = Arc::new(Ed25519Service::new());

        // Recorded by a previous process whose crypto service is gone
        let orphan = notary_core::KeyPair::generate().public_key();
        store
            .set_key("gun", &RoleName::Snapshot, orphan)
            .await
            .unwrap();

        let service = KeyService::new(store, crypto.clone(), KeyAlgorithm::Ed25519);
        let err = service.get_or_create_key("gun", "snapshot").await.unwrap_err();
        assert!(matches!(err, KeyError::InvalidConfiguration(_)));
        assert_eq!(crypto.key_count(), 0);

        // Other roles are unaffected
        assert!(service.get_or_create_key("gun", "timestamp").await.is_ok());
    }

    #[tokio::test]
    async fn test_client_roles_refused() {
        let (_, service) = service();

        for role in ["root", "targets", "targets/releases", "bogus"] {
            let err = service.get_or_create_key("gun", role).await.unwrap_err();
            assert!(matches!(err, KeyError::InvalidRole(_)), "{role}");
            assert!(err.to_string().contains("invalid role"));
        }
    }

    #[tokio::test]
    async fn test_missing_parameters_unknown() {
        let (_, service) = service();

        for (gun, role) in [("", "timestamp"), ("gun", ""), ("", "")] {
            let err = service.get_or_create_key(gun, role).await.unwrap_err();
            assert!(err.to_string().contains("unknown"));
        }
    }
}
