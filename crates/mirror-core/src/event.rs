//! Signed, hash-chained events
//!
//! The event is the atomic unit of the per-user log and the source of truth
//! for all derived state. `event_hash` commits to the canonical JSON of the
//! content fields plus `previous_hash`; the Ed25519 signature covers the
//! same canonical bytes. Events are append-only: never modified, never
//! deleted.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical;
use crate::crypto::{ed25519_verify, Ed25519Signature, Ed25519SigningKey, Ed25519VerifyingKey};
use crate::errors::{MirrorError, Result};
use crate::identifiers::{EventId, InstanceId, UserId};
use crate::time::Timestamp;

pub use crate::crypto::hash::GENESIS_HASH;

/// Closed enumeration of event types
///
/// Unknown strings decode to `Unknown` so that logs written by newer
/// software replay on older software with a warning instead of an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    ReflectionCreated,
    VoiceTranscribed,
    PatternDetected,
    TensionDetected,
    SafetySignal,
    ViolationDetected,
    ResponseShaped,
    AmendmentProposed,
    AmendmentVoted,
    ForkAnnounced,
    UpdateRegistered,
    /// Forward-compatible catch-all for event types this build does not know
    Unknown(String),
}

impl EventType {
    /// Wire name of the event type
    pub fn as_str(&self) -> &str {
        match self {
            Self::ReflectionCreated => "reflection_created",
            Self::VoiceTranscribed => "voice_transcribed",
            Self::PatternDetected => "pattern_detected",
            Self::TensionDetected => "tension_detected",
            Self::SafetySignal => "safety_signal",
            Self::ViolationDetected => "violation_detected",
            Self::ResponseShaped => "response_shaped",
            Self::AmendmentProposed => "amendment_proposed",
            Self::AmendmentVoted => "amendment_voted",
            Self::ForkAnnounced => "fork_announced",
            Self::UpdateRegistered => "update_registered",
            Self::Unknown(name) => name,
        }
    }

    /// Whether this build recognizes the event type
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "reflection_created" => Self::ReflectionCreated,
            "voice_transcribed" => Self::VoiceTranscribed,
            "pattern_detected" => Self::PatternDetected,
            "tension_detected" => Self::TensionDetected,
            "safety_signal" => Self::SafetySignal,
            "violation_detected" => Self::ViolationDetected,
            "response_shaped" => Self::ResponseShaped,
            "amendment_proposed" => Self::AmendmentProposed,
            "amendment_voted" => Self::AmendmentVoted,
            "fork_announced" => Self::ForkAnnounced,
            "update_registered" => Self::UpdateRegistered,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(EventType::from(s.as_str()))
    }
}

/// The fields committed to by `event_hash` and the signature, in one place
/// so hashing and signing can never drift apart.
#[derive(Serialize)]
struct SignedFields<'a> {
    timestamp: Timestamp,
    event_type: &'a EventType,
    instance_id: &'a InstanceId,
    user_id: &'a UserId,
    payload: &'a serde_json::Value,
    previous_hash: &'a str,
}

/// A signed, chained event in a per-(instance, user) stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub event_type: EventType,
    pub instance_id: InstanceId,
    pub user_id: UserId,
    pub payload: serde_json::Value,
    /// `event_hash` of the immediately preceding event, or all zeros for genesis
    pub previous_hash: String,
    /// Hex SHA-256 over the canonical JSON of the signed fields
    pub event_hash: String,
    /// Ed25519 signature over the same canonical bytes, hex-encoded
    pub signature: String,
}

impl Event {
    /// Build, hash, and sign a new event for the given stream position.
    pub fn create(
        timestamp: Timestamp,
        event_type: EventType,
        instance_id: InstanceId,
        user_id: UserId,
        payload: serde_json::Value,
        previous_hash: String,
        signing_key: &Ed25519SigningKey,
    ) -> Result<Self> {
        let bytes = Self::canonical_bytes(
            timestamp,
            &event_type,
            &instance_id,
            &user_id,
            &payload,
            &previous_hash,
        )?;
        let event_hash = crate::crypto::sha256_hex(&bytes);
        let signature = signing_key.sign(&bytes).to_hex();
        Ok(Self {
            id: EventId::new(),
            timestamp,
            event_type,
            instance_id,
            user_id,
            payload,
            previous_hash,
            event_hash,
            signature,
        })
    }

    /// Canonical bytes committed to by the hash and the signature.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        Self::canonical_bytes(
            self.timestamp,
            &self.event_type,
            &self.instance_id,
            &self.user_id,
            &self.payload,
            &self.previous_hash,
        )
    }

    fn canonical_bytes(
        timestamp: Timestamp,
        event_type: &EventType,
        instance_id: &InstanceId,
        user_id: &UserId,
        payload: &serde_json::Value,
        previous_hash: &str,
    ) -> Result<Vec<u8>> {
        canonical::to_canonical_json(&SignedFields {
            timestamp,
            event_type,
            instance_id,
            user_id,
            payload,
            previous_hash,
        })
        .map_err(|e| MirrorError::serialization(e.to_string()))
    }

    /// Recompute the hash from stored fields.
    pub fn recompute_hash(&self) -> Result<String> {
        Ok(crate::crypto::sha256_hex(&self.signing_bytes()?))
    }

    /// Verify stored hash and signature against the given issuer key.
    pub fn verify(&self, issuer: &Ed25519VerifyingKey) -> Result<()> {
        let bytes = self.signing_bytes()?;
        let recomputed = crate::crypto::sha256_hex(&bytes);
        if recomputed != self.event_hash {
            return Err(MirrorError::signature_invalid(format!(
                "event {} hash mismatch: stored {}, recomputed {}",
                self.id, self.event_hash, recomputed
            )));
        }
        let signature = Ed25519Signature::from_hex(&self.signature)?;
        if !ed25519_verify(&bytes, &signature, issuer)? {
            return Err(MirrorError::signature_invalid(format!(
                "event {} signature does not verify",
                self.id
            )));
        }
        Ok(())
    }

    /// Whether this is the first event of its stream.
    pub fn is_genesis(&self) -> bool {
        self.previous_hash == GENESIS_HASH
    }
}
