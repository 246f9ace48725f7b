//! Peer transports
//!
//! Gossip is transport-agnostic behind one async trait. The TCP transport
//! writes one JSON message per line; the in-memory transport wires
//! instances together for tests and simulation.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use mirror_core::{MirrorError, Result};

use crate::message::NetworkMessage;

/// One-way message delivery to a peer endpoint
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Send a message to an endpoint. Errors are per-peer; callers log and
    /// keep fanning out.
    async fn send(&self, endpoint: &str, message: &NetworkMessage) -> Result<()>;
}

/// In-memory hub connecting named endpoints (tests, simulation)
#[derive(Default)]
pub struct MemoryHub {
    inboxes: RwLock<HashMap<String, mpsc::UnboundedSender<NetworkMessage>>>,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an endpoint and get its inbox.
    pub fn register(&self, endpoint: impl Into<String>) -> mpsc::UnboundedReceiver<NetworkMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.write().insert(endpoint.into(), tx);
        rx
    }
}

/// Transport delivering through a shared `MemoryHub`
pub struct MemoryTransport {
    hub: Arc<MemoryHub>,
}

impl MemoryTransport {
    pub fn new(hub: Arc<MemoryHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl PeerTransport for MemoryTransport {
    async fn send(&self, endpoint: &str, message: &NetworkMessage) -> Result<()> {
        let sender = self
            .hub
            .inboxes
            .read()
            .get(endpoint)
            .cloned()
            .ok_or_else(|| MirrorError::peer(format!("unknown endpoint {endpoint}")))?;
        sender
            .send(message.clone())
            .map_err(|_| MirrorError::peer(format!("endpoint {endpoint} closed")))
    }
}

/// Line-delimited JSON over TCP
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PeerTransport for TcpTransport {
    async fn send(&self, endpoint: &str, message: &NetworkMessage) -> Result<()> {
        let mut stream = TcpStream::connect(endpoint)
            .await
            .map_err(|e| MirrorError::peer(format!("connect {endpoint}: {e}")))?;
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        stream
            .write_all(&line)
            .await
            .map_err(|e| MirrorError::peer(format!("send to {endpoint}: {e}")))?;
        stream
            .flush()
            .await
            .map_err(|e| MirrorError::peer(format!("flush to {endpoint}: {e}")))?;
        Ok(())
    }
}

/// Accept loop: parse one JSON message per line and forward into `inbound`.
/// Malformed lines are logged and skipped; the loop ends when `inbound`
/// closes.
pub async fn serve_tcp(
    listener: TcpListener,
    inbound: mpsc::UnboundedSender<NetworkMessage>,
) -> Result<()> {
    loop {
        let (stream, remote) = listener
            .accept()
            .await
            .map_err(|e| MirrorError::peer(format!("accept: {e}")))?;
        let inbound = inbound.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<NetworkMessage>(&line) {
                    Ok(message) => {
                        if inbound.send(message).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(peer = %remote, error = %e, "malformed message line");
                    }
                }
            }
        });
    }
}
