//! Core logic for the notary server

mod retrieval;
mod trust;
mod update;
mod validation;

pub use retrieval::{
    CacheConfig, RetrievalError, RetrievalService, RoleDocument, DEFAULT_CONSISTENT_MAX_AGE_SECS,
    DEFAULT_CURRENT_MAX_AGE_SECS,
};
pub use trust::{delegation_trust, RoleTrust, TrustedKeySet};
pub use update::{UpdateCoordinator, UpdateError};
pub use validation::{
    HierarchyEdge, HierarchyProblem, HierarchyValidator, ValidatedBatch, ValidationError,
};
