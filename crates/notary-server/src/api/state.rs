//! Application state shared across handlers

use notary_core::{CryptoService, KeyAlgorithm};
use std::sync::Arc;
use tracing::info;

use crate::config::ConfigError;
use crate::core::{CacheConfig, RetrievalService, UpdateCoordinator};
use crate::keys::KeyService;
use crate::storage::MetaStore;

/// Services the handlers run on, all backed by the same store
#[derive(Debug)]
pub struct AppState {
    pub store: Arc<dyn MetaStore>,
    pub updates: UpdateCoordinator,
    pub retrieval: RetrievalService,
    pub keys: KeyService,
}

impl AppState {
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }
}

/// Wires an `AppState`, refusing to build with missing dependencies
#[derive(Debug, Default)]
pub struct AppStateBuilder {
    store: Option<Arc<dyn MetaStore>>,
    crypto: Option<Arc<dyn CryptoService>>,
    key_algorithm: Option<String>,
    cache: CacheConfig,
}

impl AppStateBuilder {
    pub fn store(mut self, store: Arc<dyn MetaStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn crypto(mut self, crypto: Arc<dyn CryptoService>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    /// Algorithm for server-managed keys, e.g. `ed25519`
    pub fn key_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.key_algorithm = Some(algorithm.into());
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn build(self) -> Result<AppState, ConfigError> {
        let store = self
            .store
            .ok_or_else(|| ConfigError::InvalidConfiguration("no storage".into()))?;
        let crypto = self
            .crypto
            .ok_or_else(|| ConfigError::InvalidConfiguration("no cryptoservice".into()))?;

        let name = self
            .key_algorithm
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ConfigError::InvalidConfiguration("no keyalgorithm".into()))?;
        let algorithm: KeyAlgorithm = name.parse().map_err(|_| {
            ConfigError::InvalidConfiguration(format!("invalid keyalgorithm: {}", name))
        })?;
        if !crypto.supports(algorithm) {
            return Err(ConfigError::InvalidConfiguration(format!(
                "invalid keyalgorithm: {} is not supported by the cryptoservice",
                algorithm
            )));
        }

        info!(key_algorithm = %algorithm, "Application state initialized");

        Ok(AppState {
            updates: UpdateCoordinator::new(store.clone(), crypto.clone()),
            retrieval: RetrievalService::new(store.clone(), self.cache),
            keys: KeyService::new(store.clone(), crypto, algorithm),
            store,
        })
    }
}
