//! Rotating operational keys
//!
//! Day-to-day signing uses a short-lived ROK chained to the long-term
//! guardian key; compromising an ROK never compromises the root. The
//! private half is returned exactly once at issue time and never stored.

use serde::{Deserialize, Serialize};

use mirror_core::{
    canonical, Ed25519Signature, Ed25519SigningKey, Ed25519VerifyingKey, MirrorError, Result,
    RokId, Timestamp,
};

/// ROK lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RokStatus {
    Active,
    Expired,
    Revoked,
}

/// The persisted, public half of an operational key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RokRecord {
    pub key_id: RokId,
    /// Hex-encoded public key
    pub public_key: String,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
    pub status: RokStatus,
    /// Guardian signature over the canonical record (minus this field)
    pub signature: String,
}

impl RokRecord {
    fn canonical_bytes(
        key_id: RokId,
        public_key: &str,
        issued_at: Timestamp,
        expires_at: Timestamp,
    ) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct SignedFields<'a> {
            key_id: RokId,
            public_key: &'a str,
            issued_at: Timestamp,
            expires_at: Timestamp,
        }
        canonical::to_canonical_json(&SignedFields {
            key_id,
            public_key,
            issued_at,
            expires_at,
        })
        .map_err(|e| MirrorError::serialization(e.to_string()))
    }

    /// Verify the guardian's signature over this record.
    pub fn verify(&self, guardian_key: &Ed25519VerifyingKey) -> Result<()> {
        let bytes =
            Self::canonical_bytes(self.key_id, &self.public_key, self.issued_at, self.expires_at)?;
        let signature = Ed25519Signature::from_hex(&self.signature)?;
        guardian_key.verify(&bytes, &signature)
    }
}

/// Issue result: the record plus the one-time private half
///
/// Custody of `signing_key_hex` is the caller's responsibility; the service
/// keeps only the public record.
pub struct IssuedRok {
    pub record: RokRecord,
    pub signing_key_hex: String,
}

/// Mint a fresh operational key signed by the guardian key.
pub fn issue_rok(
    guardian: &Ed25519SigningKey,
    issued_at: Timestamp,
    expires_at: Timestamp,
) -> Result<IssuedRok> {
    let operational = Ed25519SigningKey::generate();
    let key_id = RokId::new();
    let public_key = operational.verifying_key().to_hex();
    let bytes = RokRecord::canonical_bytes(key_id, &public_key, issued_at, expires_at)?;
    let record = RokRecord {
        key_id,
        public_key,
        issued_at,
        expires_at,
        status: RokStatus::Active,
        signature: guardian.sign(&bytes).to_hex(),
    };
    tracing::info!(key_id = %key_id, expires_at = %expires_at, "operational key issued");
    Ok(IssuedRok {
        record,
        signing_key_hex: operational.to_hex(),
    })
}
