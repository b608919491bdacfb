//! Error types for the notary core

use thiserror::Error;

/// Result type alias using NotaryError
pub type Result<T> = std::result::Result<T, NotaryError>;

/// Errors that can occur while handling TUF metadata and keys
#[derive(Error, Debug)]
pub enum NotaryError {
    /// Role name is not a canonical or delegated role
    #[error("invalid role: {0}")]
    InvalidRole(String),

    /// Key algorithm name is empty or unrecognised
    #[error("invalid key algorithm: {0}")]
    InvalidKeyAlgorithm(String),

    /// The crypto service cannot produce keys of this algorithm
    #[error("unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// No private key is held for this key id
    #[error("unknown key: {0}")]
    UnknownKey(String),

    /// Signature or key material is invalid
    #[error("cryptographic error: {0}")]
    CryptoError(String),

    /// Document does not have the expected shape
    #[error("malformed document: {0}")]
    Malformed(String),

    /// JSON encoding/decoding error
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl From<ed25519_dalek::SignatureError> for NotaryError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        NotaryError::CryptoError(err.to_string())
    }
}

impl From<serde_json::Error> for NotaryError {
    fn from(err: serde_json::Error) -> Self {
        NotaryError::SerializationError(err.to_string())
    }
}

impl From<base64::DecodeError> for NotaryError {
    fn from(err: base64::DecodeError) -> Self {
        NotaryError::CryptoError(format!("invalid base64: {}", err))
    }
}
