//! Gossip node: broadcast, dedup, and inbound dispatch
//!
//! Broadcasts go to all verified peers as independent tasks; an
//! unreachable peer is logged and never blocks progress toward the others.
//! Duplicate `message_id`s are suppressed, which together with monotone
//! per-sender timestamps makes downstream ingestion idempotent. Inbound
//! messages are dispatched by type to a single handler queue per type.

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use tokio::sync::mpsc;

use mirror_core::{
    Clock, Ed25519SigningKey, InstanceId, MessageId, MirrorError, Result,
};

use crate::message::{MessageType, NetworkMessage};
use crate::peer::PeerTable;
use crate::transport::PeerTransport;

/// Remembered message ids before old entries are evicted
const SEEN_CAP: usize = 4096;

struct SeenSet {
    ids: BTreeSet<MessageId>,
    order: VecDeque<MessageId>,
}

impl SeenSet {
    fn new() -> Self {
        Self {
            ids: BTreeSet::new(),
            order: VecDeque::new(),
        }
    }

    /// Returns false when the id was already present.
    fn insert(&mut self, id: MessageId) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > SEEN_CAP {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
        true
    }
}

/// A gossip participant bound to one instance identity
pub struct GossipNode {
    instance_id: InstanceId,
    genesis_hash: String,
    endpoint: String,
    signing_key: Ed25519SigningKey,
    peers: Arc<PeerTable>,
    transport: Arc<dyn PeerTransport>,
    clock: Arc<dyn Clock>,
    seen: Mutex<SeenSet>,
    handlers: RwLock<BTreeMap<MessageType, mpsc::UnboundedSender<NetworkMessage>>>,
}

impl GossipNode {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance_id: InstanceId,
        genesis_hash: String,
        endpoint: String,
        signing_key: Ed25519SigningKey,
        peers: Arc<PeerTable>,
        transport: Arc<dyn PeerTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            instance_id,
            genesis_hash,
            endpoint,
            signing_key,
            peers,
            transport,
            clock,
            seen: Mutex::new(SeenSet::new()),
            handlers: RwLock::new(BTreeMap::new()),
        }
    }

    /// The peer table this node gossips against.
    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    /// Register the single handler queue for a message type.
    pub fn subscribe(&self, message_type: MessageType) -> mpsc::UnboundedReceiver<NetworkMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.handlers.write().insert(message_type, tx);
        rx
    }

    /// The discovery payload this node advertises.
    fn discovery_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "genesis_hash": self.genesis_hash,
            "endpoint": self.endpoint,
            "public_key": self.signing_key.verifying_key().to_hex(),
        })
    }

    /// Contact each bootstrap endpoint with a discovery message. Failures
    /// are logged per endpoint and do not block the rest.
    pub async fn discover(&self, bootstrap_endpoints: &[String]) {
        for endpoint in bootstrap_endpoints {
            let message = match NetworkMessage::create(
                MessageType::Discovery,
                self.instance_id.clone(),
                None,
                self.discovery_payload(),
                self.clock.now(),
                &self.signing_key,
            ) {
                Ok(message) => message,
                Err(e) => {
                    tracing::error!(error = %e, "discovery message construction failed");
                    return;
                }
            };
            if let Err(e) = self.transport.send(endpoint, &message).await {
                tracing::warn!(endpoint = %endpoint, error = %e, "bootstrap endpoint unreachable");
            }
        }
    }

    /// Broadcast a signed message to every verified peer, one send task
    /// per peer.
    pub async fn broadcast(
        &self,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Result<NetworkMessage> {
        let message = NetworkMessage::create(
            message_type,
            self.instance_id.clone(),
            None,
            payload,
            self.clock.now(),
            &self.signing_key,
        )?;
        // Our own broadcasts are marked seen so an echo never re-dispatches.
        self.seen.lock().insert(message.message_id);

        for peer in self.peers.verified_peers() {
            let transport = Arc::clone(&self.transport);
            let outbound = message.clone();
            let endpoint = peer.endpoint.clone();
            let peer_id = peer.instance_id.clone();
            tokio::spawn(async move {
                if let Err(e) = transport.send(&endpoint, &outbound).await {
                    tracing::warn!(peer = %peer_id, error = %e, "gossip send failed");
                }
            });
        }
        Ok(message)
    }

    /// Ingest one inbound message: dedup, verify, admit/dispatch.
    ///
    /// Returns `Ok(false)` for duplicates, `Ok(true)` when the message was
    /// dispatched (or handled as discovery).
    pub async fn ingest(&self, message: NetworkMessage) -> Result<bool> {
        if !self.seen.lock().insert(message.message_id) {
            tracing::debug!(message = %message.message_id, "duplicate suppressed");
            return Ok(false);
        }

        if message.message_type == MessageType::Discovery {
            return self.handle_discovery(message).await.map(|_| true);
        }

        // Non-discovery traffic must come from a verified peer whose
        // advertised key checks out.
        let peer = self
            .peers
            .get(&message.sender_instance_id)
            .filter(|p| p.verified)
            .ok_or_else(|| {
                MirrorError::peer(format!(
                    "message from unverified instance {}",
                    message.sender_instance_id
                ))
            })?;
        let key = peer.verifying_key().ok_or_else(|| {
            MirrorError::peer(format!(
                "peer {} never advertised a signing key",
                message.sender_instance_id
            ))
        })?;
        message.verify(&key)?;
        self.peers
            .mark_seen(&message.sender_instance_id, self.clock.now());

        let handler = self.handlers.read().get(&message.message_type).cloned();
        match handler {
            Some(handler) => {
                handler
                    .send(message)
                    .map_err(|_| MirrorError::internal("handler queue closed"))?;
            }
            None => {
                tracing::debug!(kind = %message.message_type, "no handler registered; dropped");
            }
        }
        Ok(true)
    }

    async fn handle_discovery(&self, message: NetworkMessage) -> Result<()> {
        let payload = &message.payload;
        let genesis_hash = payload["genesis_hash"].as_str().unwrap_or_default();
        let endpoint = payload["endpoint"].as_str().unwrap_or_default();
        let public_key = payload["public_key"].as_str();

        // The envelope must verify under the key the sender advertises.
        if let Some(key_hex) = public_key {
            let key = mirror_core::Ed25519VerifyingKey::from_hex(key_hex)?;
            message.verify(&key)?;
        } else {
            return Err(MirrorError::peer("discovery without a public key"));
        }

        let verified = self.peers.admit(
            message.sender_instance_id.clone(),
            genesis_hash.to_string(),
            endpoint.to_string(),
            public_key.map(|s| s.to_string()),
            self.clock.now(),
        )?;

        // Answer verified newcomers so discovery converges both ways.
        if verified {
            let reply = NetworkMessage::create(
                MessageType::Discovery,
                self.instance_id.clone(),
                Some(message.sender_instance_id.clone()),
                self.discovery_payload(),
                self.clock.now(),
                &self.signing_key,
            )?;
            if let Err(e) = self.transport.send(endpoint, &reply).await {
                tracing::warn!(endpoint = %endpoint, error = %e, "discovery reply failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryHub, MemoryTransport};
    use mirror_core::{FixedClock, Timestamp};
    use mirror_recognition::TrustSet;

    struct Node {
        gossip: Arc<GossipNode>,
        inbox: mpsc::UnboundedReceiver<NetworkMessage>,
    }

    fn node(hub: &Arc<MemoryHub>, name: &str, genesis: &str, trusted: &str) -> Node {
        let inbox = hub.register(format!("{name}:7600"));
        let trust = Arc::new(TrustSet::with([], [trusted.to_string()]));
        let gossip = Arc::new(GossipNode::new(
            InstanceId::new(name).unwrap(),
            genesis.to_string(),
            format!("{name}:7600"),
            Ed25519SigningKey::generate(),
            Arc::new(PeerTable::new(trust)),
            Arc::new(MemoryTransport::new(Arc::clone(hub))),
            Arc::new(FixedClock::at(Timestamp::from_unix_millis(0))),
        ));
        Node { gossip, inbox }
    }

    #[tokio::test]
    async fn discovery_admits_verified_peers_and_replies() {
        let hub = MemoryHub::new();
        let genesis = "cc".repeat(32);
        let mut alpha = node(&hub, "alpha", &genesis, &genesis);
        let beta = node(&hub, "beta", &genesis, &genesis);

        // Beta contacts alpha's endpoint.
        beta.gossip.discover(&["alpha:7600".to_string()]).await;
        let discovery = alpha.inbox.recv().await.unwrap();
        assert_eq!(discovery.message_type, MessageType::Discovery);
        alpha.gossip.ingest(discovery).await.unwrap();

        assert_eq!(alpha.gossip.peers().verified_peers().len(), 1);
    }

    #[tokio::test]
    async fn rogue_genesis_stays_unverified() {
        let hub = MemoryHub::new();
        let genesis = "cc".repeat(32);
        let rogue_genesis = "dd".repeat(32);
        let mut alpha = node(&hub, "alpha", &genesis, &genesis);
        let rogue = node(&hub, "rogue", &rogue_genesis, &genesis);

        rogue.gossip.discover(&["alpha:7600".to_string()]).await;
        let discovery = alpha.inbox.recv().await.unwrap();
        alpha.gossip.ingest(discovery).await.unwrap();

        assert_eq!(alpha.gossip.peers().len(), 1);
        assert!(alpha.gossip.peers().verified_peers().is_empty());
    }

    #[tokio::test]
    async fn broadcast_reaches_verified_peers_and_dedups() {
        let hub = MemoryHub::new();
        let genesis = "cc".repeat(32);
        let mut alpha = node(&hub, "alpha", &genesis, &genesis);
        let mut beta = node(&hub, "beta", &genesis, &genesis);

        // Mutual discovery.
        beta.gossip.discover(&["alpha:7600".to_string()]).await;
        let d = alpha.inbox.recv().await.unwrap();
        alpha.gossip.ingest(d).await.unwrap();
        let reply = beta.inbox.recv().await.unwrap();
        beta.gossip.ingest(reply).await.unwrap();

        let mut fork_rx = beta.gossip.subscribe(MessageType::ForkAnnounce);
        let sent = alpha
            .gossip
            .broadcast(MessageType::ForkAnnounce, serde_json::json!({"fork": "garden"}))
            .await
            .unwrap();

        let delivered = beta.inbox.recv().await.unwrap();
        assert!(beta.gossip.ingest(delivered.clone()).await.unwrap());
        let handled = fork_rx.recv().await.unwrap();
        assert_eq!(handled.message_id, sent.message_id);

        // A duplicate of the same message id is suppressed.
        assert!(!beta.gossip.ingest(delivered).await.unwrap());
    }

    #[tokio::test]
    async fn unverified_sender_rejected_for_gossip() {
        let hub = MemoryHub::new();
        let genesis = "cc".repeat(32);
        let alpha = node(&hub, "alpha", &genesis, &genesis);

        let stranger_key = Ed25519SigningKey::generate();
        let message = NetworkMessage::create(
            MessageType::VoteCast,
            InstanceId::new("stranger").unwrap(),
            None,
            serde_json::json!({}),
            Timestamp::from_unix_millis(0),
            &stranger_key,
        )
        .unwrap();
        let err = alpha.gossip.ingest(message).await.unwrap_err();
        assert!(matches!(err, MirrorError::Peer { .. }));
    }
}
