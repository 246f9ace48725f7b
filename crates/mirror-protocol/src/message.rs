//! Inter-instance message envelope
//!
//! Every message is signed over the canonical JSON of all fields except
//! `signature`. Recipients decode keys and signatures to raw bytes before
//! verification; hex is only the transport form.

use serde::{Deserialize, Serialize};
use std::fmt;

use mirror_core::{
    canonical, Ed25519Signature, Ed25519SigningKey, Ed25519VerifyingKey, InstanceId, MessageId,
    MirrorError, Result, Timestamp,
};

/// Message types gossiped between instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Discovery,
    CommonsPublish,
    CommonsQuery,
    ForkAnnounce,
    VerificationRequest,
    VerificationResponse,
    AmendmentProposal,
    VoteCast,
    Ping,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::CommonsPublish => "commons_publish",
            Self::CommonsQuery => "commons_query",
            Self::ForkAnnounce => "fork_announce",
            Self::VerificationRequest => "verification_request",
            Self::VerificationResponse => "verification_response",
            Self::AmendmentProposal => "amendment_proposal",
            Self::VoteCast => "vote_cast",
            Self::Ping => "ping",
        }
    }

    /// Message types broadcast to all verified peers
    pub fn is_gossip(&self) -> bool {
        matches!(
            self,
            Self::CommonsPublish | Self::ForkAnnounce | Self::AmendmentProposal | Self::VoteCast
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signed message between instances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMessage {
    pub message_id: MessageId,
    pub message_type: MessageType,
    pub sender_instance_id: InstanceId,
    /// `None` means broadcast
    pub recipient_instance_id: Option<InstanceId>,
    pub payload: serde_json::Value,
    pub timestamp: Timestamp,
    /// Hex-encoded Ed25519 signature over the canonical envelope
    pub signature: String,
}

impl NetworkMessage {
    /// Build and sign a new message.
    pub fn create(
        message_type: MessageType,
        sender_instance_id: InstanceId,
        recipient_instance_id: Option<InstanceId>,
        payload: serde_json::Value,
        timestamp: Timestamp,
        signer: &Ed25519SigningKey,
    ) -> Result<Self> {
        let mut message = Self {
            message_id: MessageId::new(),
            message_type,
            sender_instance_id,
            recipient_instance_id,
            payload,
            timestamp,
            signature: String::new(),
        };
        let bytes = message.signing_bytes()?;
        message.signature = signer.sign(&bytes).to_hex();
        Ok(message)
    }

    /// Canonical bytes the signature covers: the envelope minus `signature`.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        let mut value = serde_json::to_value(self)?;
        if let Some(object) = value.as_object_mut() {
            object.remove("signature");
        }
        canonical::to_canonical_json(&value).map_err(|e| MirrorError::serialization(e.to_string()))
    }

    /// Verify the envelope signature against the sender's key.
    pub fn verify(&self, sender_key: &Ed25519VerifyingKey) -> Result<()> {
        let signature = Ed25519Signature::from_hex(&self.signature)?;
        sender_key.verify(&self.signing_bytes()?, &signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_message(signer: &Ed25519SigningKey) -> NetworkMessage {
        NetworkMessage::create(
            MessageType::CommonsPublish,
            InstanceId::new("alpha").unwrap(),
            None,
            serde_json::json!({"reflection": "shared text"}),
            Timestamp::from_unix_millis(42),
            signer,
        )
        .unwrap()
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let signer = Ed25519SigningKey::generate();
        let message = signed_message(&signer);
        message.verify(&signer.verifying_key()).unwrap();
    }

    #[test]
    fn payload_tamper_detected() {
        let signer = Ed25519SigningKey::generate();
        let mut message = signed_message(&signer);
        message.payload = serde_json::json!({"reflection": "forged"});
        assert!(message.verify(&signer.verifying_key()).is_err());
    }

    #[test]
    fn gossip_classification() {
        assert!(MessageType::ForkAnnounce.is_gossip());
        assert!(MessageType::VoteCast.is_gossip());
        assert!(!MessageType::Discovery.is_gossip());
        assert!(!MessageType::Ping.is_gossip());
    }

    #[test]
    fn wire_shape() {
        let signer = Ed25519SigningKey::generate();
        let message = signed_message(&signer);
        let line = serde_json::to_string(&message).unwrap();
        assert!(line.contains("\"commons_publish\""));
        let back: NetworkMessage = serde_json::from_str(&line).unwrap();
        assert_eq!(message, back);
        back.verify(&signer.verifying_key()).unwrap();
    }
}
