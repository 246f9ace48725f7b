//! SHA-256 hashing for content addressing
//!
//! Hashing is pure and synchronous. Every place the engine says "hash"
//! means the hex digest of SHA-256 over canonical bytes; this module is the
//! single source of truth for that primitive.

use sha2::{Digest, Sha256};

/// Number of bytes in a digest
pub const HASH_SIZE: usize = 32;

/// The all-zeros hex digest used as `previous_hash` for genesis events
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Compute the SHA-256 digest of the input
pub fn sha256(data: &[u8]) -> [u8; HASH_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the SHA-256 digest and return it hex-encoded
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Incremental hasher for streaming input
pub fn hasher() -> Sha256 {
    Sha256::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn incremental_matches_oneshot() {
        let mut h = hasher();
        h.update(b"hello ");
        h.update(b"world");
        let streamed: [u8; HASH_SIZE] = h.finalize().into();
        assert_eq!(streamed, sha256(b"hello world"));
    }

    #[test]
    fn genesis_hash_shape() {
        assert_eq!(GENESIS_HASH.len(), 64);
        assert!(GENESIS_HASH.chars().all(|c| c == '0'));
    }
}
