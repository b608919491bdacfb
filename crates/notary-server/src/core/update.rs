//! Atomic multi-role updates
//!
//! Runs a published batch through the hierarchy validator and commits the
//! resulting versions to the store as a single unit. The commit is refused
//! if any stored version the validator relied on has changed since.

use notary_core::{CryptoService, NotaryError, RoleName};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::validation::{HierarchyValidator, ValidationError};
use crate::storage::{MetaStore, StorageError};

/// Error returned by an atomic update
#[derive(Error, Debug)]
pub enum UpdateError {
    /// The batch itself is invalid
    #[error("invalid update: {0}")]
    Validation(#[from] ValidationError),

    /// The store failed, or rejected a version as not newer
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    /// A server-held key could not sign a generated document
    #[error("signing failed: {0}")]
    Signing(#[from] NotaryError),

    /// The commit task did not run to completion
    #[error("commit aborted: {0}")]
    Aborted(String),
}

/// Orchestrates validate-then-commit for published batches
#[derive(Debug, Clone)]
pub struct UpdateCoordinator {
    store: Arc<dyn MetaStore>,
    crypto: Arc<dyn CryptoService>,
}

impl UpdateCoordinator {
    pub fn new(store: Arc<dyn MetaStore>, crypto: Arc<dyn CryptoService>) -> Self {
        Self { store, crypto }
    }

    /// Validate `docs` and commit them, plus any server-generated snapshot
    /// and timestamp, as one all-or-nothing version bump
    ///
    /// Returns the roles committed.
    pub async fn atomic_update(
        &self,
        gun: &str,
        docs: Vec<(RoleName, Vec<u8>)>,
    ) -> Result<Vec<RoleName>, UpdateError> {
        let validated = HierarchyValidator::new(self.store.as_ref(), self.crypto.as_ref(), gun)
            .validate(docs)
            .await
            .map_err(|e| {
                match &e {
                    UpdateError::Validation(v) => {
                        warn!(gun = %gun, error = %v, "SECURITY: Rejected metadata update")
                    }
                    other => error!(gun = %gun, error = %other, "Update failed before commit"),
                }
                e
            })?;

        let roles: Vec<RoleName> = validated.updates.iter().map(|u| u.role.clone()).collect();

        // The commit runs on its own task so a dropped request cannot
        // abandon it half-way
        let store = Arc::clone(&self.store);
        let owned_gun = gun.to_string();
        let committed = tokio::spawn(async move {
            store
                .update_many(&owned_gun, validated.updates, validated.base)
                .await
        })
        .await;

        match committed {
            Ok(Ok(())) => {
                info!(gun = %gun, roles = ?roles, "Metadata update committed");
                Ok(roles)
            }
            Ok(Err(StorageError::OldVersion(conflict))) => {
                warn!(gun = %gun, conflict = %conflict, "Rejected stale metadata version");
                Err(UpdateError::Storage(StorageError::OldVersion(conflict)))
            }
            Ok(Err(e)) => {
                error!(gun = %gun, error = %e, "Failed to commit metadata update");
                Err(UpdateError::Storage(e))
            }
            Err(e) => {
                error!(gun = %gun, error = %e, "Commit task failed");
                Err(UpdateError::Aborted(e.to_string()))
            }
        }
    }
}
