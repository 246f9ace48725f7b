//! Cryptographic primitives: SHA-256 hashing and Ed25519 signing

pub mod ed25519;
pub mod hash;

pub use ed25519::{ed25519_verify, Ed25519Signature, Ed25519SigningKey, Ed25519VerifyingKey};
pub use hash::{sha256, sha256_hex, GENESIS_HASH, HASH_SIZE};
