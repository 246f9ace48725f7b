//! M-of-N threshold signatures
//!
//! A threshold signature is a collection of plain Ed25519 signatures from
//! distinct guardians over the same message bytes. Verification iterates
//! every offered signature, checks it against the claimed guardian's
//! current public key, and requires at least `threshold` valid distinct
//! signers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use mirror_core::{Ed25519Signature, GuardianId, MirrorError, Result};

use crate::guardian::Guardian;

/// An M-of-N signature collection over one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSignature {
    pub threshold: usize,
    /// guardian_id → hex-encoded signature
    pub signatures: BTreeMap<GuardianId, String>,
}

impl ThresholdSignature {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            signatures: BTreeMap::new(),
        }
    }

    /// Attach one guardian's signature.
    pub fn add(&mut self, guardian_id: GuardianId, signature: Ed25519Signature) {
        self.signatures.insert(guardian_id, signature.to_hex());
    }

    /// Whether enough signatures have been collected (not yet verified).
    pub fn is_complete(&self) -> bool {
        self.signatures.len() >= self.threshold
    }

    /// Count the valid, distinct signers among the offered signatures.
    pub fn count_valid(
        &self,
        message: &[u8],
        guardians: &BTreeMap<GuardianId, Guardian>,
    ) -> usize {
        let mut valid: BTreeSet<GuardianId> = BTreeSet::new();
        for (guardian_id, signature_hex) in &self.signatures {
            let Some(guardian) = guardians.get(guardian_id) else {
                tracing::warn!(guardian = %guardian_id, "signature from unknown guardian");
                continue;
            };
            if !guardian.is_active() {
                tracing::warn!(guardian = %guardian_id, "signature from inactive guardian");
                continue;
            }
            let Ok(key) = guardian.verifying_key() else {
                continue;
            };
            let Ok(signature) = Ed25519Signature::from_hex(signature_hex) else {
                continue;
            };
            if key.verify(message, &signature).is_ok() {
                valid.insert(*guardian_id);
            }
        }
        valid.len()
    }

    /// Verify that at least `threshold` valid, distinct guardians signed.
    pub fn verify(
        &self,
        message: &[u8],
        guardians: &BTreeMap<GuardianId, Guardian>,
    ) -> Result<()> {
        let valid = self.count_valid(message, guardians);
        if valid >= self.threshold {
            tracing::debug!(valid, threshold = self.threshold, "threshold signature verified");
            Ok(())
        } else {
            Err(MirrorError::threshold_not_met(format!(
                "{valid} valid signatures of {} required",
                self.threshold
            )))
        }
    }
}
