//! Content addressing for stored metadata.
//!
//! A checksum is the lowercase hex SHA-256 digest of the exact bytes a client
//! published. Documents are never re-serialized before hashing.

use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest
pub const CHECKSUM_HEX_LEN: usize = 64;

/// Hex-encoded SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Whether `checksum` looks like a hex SHA-256 digest
pub fn is_valid_checksum(checksum: &str) -> bool {
    checksum.len() == CHECKSUM_HEX_LEN && checksum.bytes().all(|b| b.is_ascii_hexdigit())
}
