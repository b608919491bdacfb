//! Server-held signing keys

mod service;

pub use service::{KeyError, KeyService};
