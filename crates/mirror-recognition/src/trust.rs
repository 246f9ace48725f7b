//! Global trust state
//!
//! The guardian-key set and peer-genesis allowlist live in one value behind
//! a read-write lock: reads are constant and frequent (every certificate
//! verification, every peer admission), writes are rare and
//! governance-gated.

use parking_lot::RwLock;
use std::collections::BTreeSet;

use mirror_core::Ed25519VerifyingKey;

#[derive(Debug, Default, Clone)]
struct TrustState {
    issuer_keys: BTreeSet<Ed25519VerifyingKey>,
    genesis_hashes: BTreeSet<String>,
}

/// Read-often / write-rare trust set
#[derive(Debug, Default)]
pub struct TrustSet {
    inner: RwLock<TrustState>,
}

impl TrustSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust set seeded with issuer keys and genesis hashes
    pub fn with(
        issuer_keys: impl IntoIterator<Item = Ed25519VerifyingKey>,
        genesis_hashes: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            inner: RwLock::new(TrustState {
                issuer_keys: issuer_keys.into_iter().collect(),
                genesis_hashes: genesis_hashes.into_iter().collect(),
            }),
        }
    }

    /// Whether certificates signed by this key are trusted
    pub fn is_trusted_key(&self, key: &Ed25519VerifyingKey) -> bool {
        self.inner.read().issuer_keys.contains(key)
    }

    /// Whether a peer's genesis hash matches a known-good lineage
    pub fn is_trusted_genesis(&self, genesis_hash: &str) -> bool {
        self.inner.read().genesis_hashes.contains(genesis_hash)
    }

    /// Add an issuer key (governance-gated by the caller)
    pub fn add_key(&self, key: Ed25519VerifyingKey) {
        self.inner.write().issuer_keys.insert(key);
        tracing::info!("trusted issuer key added");
    }

    /// Remove an issuer key (governance-gated by the caller)
    pub fn remove_key(&self, key: &Ed25519VerifyingKey) {
        self.inner.write().issuer_keys.remove(key);
        tracing::info!("trusted issuer key removed");
    }

    /// Add a trusted genesis hash
    pub fn add_genesis(&self, genesis_hash: String) {
        self.inner.write().genesis_hashes.insert(genesis_hash);
    }

    /// Number of trusted issuer keys
    pub fn key_count(&self) -> usize {
        self.inner.read().issuer_keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::Ed25519SigningKey;

    #[test]
    fn key_membership() {
        let key = Ed25519SigningKey::generate().verifying_key();
        let other = Ed25519SigningKey::generate().verifying_key();
        let trust = TrustSet::with([key], ["aa".repeat(32)]);

        assert!(trust.is_trusted_key(&key));
        assert!(!trust.is_trusted_key(&other));
        assert!(trust.is_trusted_genesis(&"aa".repeat(32)));
        assert!(!trust.is_trusted_genesis(&"bb".repeat(32)));

        trust.add_key(other);
        assert!(trust.is_trusted_key(&other));
        trust.remove_key(&key);
        assert!(!trust.is_trusted_key(&key));
        assert_eq!(trust.key_count(), 1);
    }
}
