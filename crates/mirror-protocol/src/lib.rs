//! # Mirror Protocol
//!
//! Peer discovery and gossip between instances: signed message envelopes,
//! genesis-hash peer admission, best-effort broadcast with duplicate
//! suppression, and transport-agnostic delivery (TCP or in-memory).

#![forbid(unsafe_code)]

/// Gossip node: broadcast, dedup, inbound dispatch
pub mod gossip;
/// Signed message envelope and message types
pub mod message;
/// Known peers and genesis admission
pub mod peer;
/// Peer transports (TCP, in-memory)
pub mod transport;

pub use gossip::GossipNode;
pub use message::{MessageType, NetworkMessage};
pub use peer::{Peer, PeerTable};
pub use transport::{serve_tcp, MemoryHub, MemoryTransport, PeerTransport, TcpTransport};
