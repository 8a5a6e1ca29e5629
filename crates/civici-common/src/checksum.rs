//! Content digests recorded in the index manifest

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of an in-memory buffer
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
