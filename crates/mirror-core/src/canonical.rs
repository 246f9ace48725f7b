//! Canonical JSON serialization for Mirror core types
//!
//! RFC 8785 (JCS) is the canonical byte encoding for everything that gets
//! hashed or signed: events, certificates, votes, update manifests, and p2p
//! envelopes. The same logical value serializes to byte-identical output on
//! every platform: keys sorted lexicographically, no whitespace, shortest
//! number form, lowercase literals. Non-finite floats and non-string keys
//! are rejected rather than coerced; coercion would break hash stability.

use serde::{Deserialize, Serialize};

use crate::crypto::hash;

/// Unified error type for canonicalization operations
#[derive(Debug, thiserror::Error)]
pub enum CanonicalError {
    /// Value cannot be represented in canonical JSON (NaN, Infinity, non-string key)
    #[error("Not canonicalizable: {0}")]
    NotCanonicalizable(String),

    /// Malformed input while parsing
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Standard Result type for canonicalization operations
pub type Result<T> = std::result::Result<T, CanonicalError>;

/// Serialize any serde-compatible value to canonical JSON bytes
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_jcs::to_vec(value)
        .map_err(|e| CanonicalError::NotCanonicalizable(format!("JCS encoding failed: {e}")))
}

/// Serialize to a canonical JSON string
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String> {
    let bytes = to_canonical_json(value)?;
    String::from_utf8(bytes).map_err(|e| CanonicalError::InvalidFormat(e.to_string()))
}

/// Deserialize JSON bytes to any serde-compatible type
pub fn from_json_slice<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| CanonicalError::InvalidFormat(e.to_string()))
}

/// Canonicalize and return the hex SHA-256 of the canonical bytes
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<String> {
    let bytes = to_canonical_json(value)?;
    Ok(hash::sha256_hex(&bytes))
}
