//! Known peers and genesis-hash admission
//!
//! A peer is admitted to the verified set only when its advertised genesis
//! hash matches a trusted constitutional lineage. Unverified peers are
//! tracked but never trusted for gossip.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use mirror_core::{Ed25519VerifyingKey, InstanceId, Result, Timestamp};
use mirror_recognition::TrustSet;

/// Another instance participating in the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    pub instance_id: InstanceId,
    pub genesis_hash: String,
    pub endpoint: String,
    pub last_seen: Timestamp,
    pub verified: bool,
    /// In [0, 1]
    pub trust_score: f64,
    /// Hex-encoded signing key the peer advertises for envelope checks
    pub public_key: Option<String>,
}

impl Peer {
    /// Parsed envelope-verification key, when the peer advertised one.
    pub fn verifying_key(&self) -> Option<Ed25519VerifyingKey> {
        self.public_key
            .as_deref()
            .and_then(|hex| Ed25519VerifyingKey::from_hex(hex).ok())
    }
}

/// The known-peer table
pub struct PeerTable {
    trust: Arc<TrustSet>,
    peers: RwLock<BTreeMap<InstanceId, Peer>>,
}

impl PeerTable {
    pub fn new(trust: Arc<TrustSet>) -> Self {
        Self {
            trust,
            peers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Record a peer from a discovery exchange. Verified iff the genesis
    /// hash matches a trusted value; the peer is tracked either way.
    pub fn admit(
        &self,
        instance_id: InstanceId,
        genesis_hash: String,
        endpoint: String,
        public_key: Option<String>,
        now: Timestamp,
    ) -> Result<bool> {
        let verified = self.trust.is_trusted_genesis(&genesis_hash);
        if verified {
            tracing::info!(peer = %instance_id, endpoint = %endpoint, "peer verified");
        } else {
            tracing::warn!(peer = %instance_id, "peer genesis hash not trusted; tracked unverified");
        }
        let peer = Peer {
            instance_id: instance_id.clone(),
            genesis_hash,
            endpoint,
            last_seen: now,
            verified,
            trust_score: if verified { 0.5 } else { 0.0 },
            public_key,
        };
        self.peers.write().insert(instance_id, peer);
        Ok(verified)
    }

    /// Refresh a peer's liveness.
    pub fn mark_seen(&self, instance_id: &InstanceId, now: Timestamp) {
        if let Some(peer) = self.peers.write().get_mut(instance_id) {
            peer.last_seen = now;
        }
    }

    /// Nudge a peer's trust score, clamped to [0, 1].
    pub fn adjust_trust(&self, instance_id: &InstanceId, delta: f64) {
        if let Some(peer) = self.peers.write().get_mut(instance_id) {
            peer.trust_score = (peer.trust_score + delta).clamp(0.0, 1.0);
        }
    }

    /// Look up one peer.
    pub fn get(&self, instance_id: &InstanceId) -> Option<Peer> {
        self.peers.read().get(instance_id).cloned()
    }

    /// All verified peers, the gossip fan-out set.
    pub fn verified_peers(&self) -> Vec<Peer> {
        self.peers
            .read()
            .values()
            .filter(|p| p.verified)
            .cloned()
            .collect()
    }

    /// Total tracked peers, verified or not.
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PeerTable {
        PeerTable::new(Arc::new(TrustSet::with([], ["aa".repeat(32)])))
    }

    #[test]
    fn trusted_genesis_verifies() {
        let table = table();
        let verified = table
            .admit(
                InstanceId::new("alpha").unwrap(),
                "aa".repeat(32),
                "alpha:7600".into(),
                None,
                Timestamp::from_unix_millis(0),
            )
            .unwrap();
        assert!(verified);
        assert_eq!(table.verified_peers().len(), 1);
    }

    #[test]
    fn unknown_genesis_tracked_but_unverified() {
        let table = table();
        let verified = table
            .admit(
                InstanceId::new("rogue").unwrap(),
                "bb".repeat(32),
                "rogue:7600".into(),
                None,
                Timestamp::from_unix_millis(0),
            )
            .unwrap();
        assert!(!verified);
        assert_eq!(table.len(), 1);
        assert!(table.verified_peers().is_empty());
    }

    #[test]
    fn trust_score_clamped() {
        let table = table();
        let id = InstanceId::new("alpha").unwrap();
        table
            .admit(id.clone(), "aa".repeat(32), "e".into(), None, Timestamp::from_unix_millis(0))
            .unwrap();
        table.adjust_trust(&id, 2.0);
        assert_eq!(table.get(&id).unwrap().trust_score, 1.0);
        table.adjust_trust(&id, -5.0);
        assert_eq!(table.get(&id).unwrap().trust_score, 0.0);
    }
}
