//! Signed update manifests and the per-channel registry
//!
//! Manifests for the `constitution` and `governance` sections require a
//! threshold signature from the council; other sections accept a single
//! trusted guardian signature. The apply contract verifies signature,
//! artifact hashes, dependencies, and conflicts before anything changes on
//! disk, and records the specific failure reason otherwise.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use mirror_core::{
    canonical, Ed25519Signature, Ed25519SigningKey, GuardianId, InstanceId, MirrorError, Result,
    Timestamp, UpdateId,
};

use crate::guardian::Guardian;
use crate::threshold::ThresholdSignature;
use crate::trust::TrustSet;

/// Which part of the system an update touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSection {
    Orchestration,
    Workers,
    Governance,
    Constitution,
    Ui,
    Protocol,
}

impl UpdateSection {
    /// Sections whose manifests must be threshold-signed
    pub fn requires_threshold(&self) -> bool {
        matches!(self, Self::Constitution | Self::Governance)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orchestration => "orchestration",
            Self::Workers => "workers",
            Self::Governance => "governance",
            Self::Constitution => "constitution",
            Self::Ui => "ui",
            Self::Protocol => "protocol",
        }
    }
}

impl fmt::Display for UpdateSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Release channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateChannel {
    Stable,
    Beta,
    Dev,
}

/// A signed update manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateManifest {
    pub update_id: UpdateId,
    pub version: String,
    pub section: UpdateSection,
    pub channel: UpdateChannel,
    pub title: String,
    pub description: String,
    pub changes: Vec<String>,
    /// filename → hex SHA-256 the artifact on disk must hash to
    pub artifacts: BTreeMap<String, String>,
    pub dependencies: Vec<UpdateId>,
    pub conflicts: Vec<UpdateId>,
    pub min_version: Option<String>,
    pub max_version: Option<String>,
    /// Manifest to apply when this update must be reverted
    pub rollback_manifest: Option<Box<UpdateManifest>>,
    pub issued_at: Timestamp,
    pub issued_by: String,
    /// Hex-encoded signature over the canonical manifest minus this field
    pub signature: String,
}

impl UpdateManifest {
    /// Canonical bytes the signature covers: every field except `signature`.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        let mut value = serde_json::to_value(self)?;
        if let Some(object) = value.as_object_mut() {
            object.remove("signature");
        }
        canonical::to_canonical_json(&value).map_err(|e| MirrorError::serialization(e.to_string()))
    }

    /// Sign in place with the given guardian key.
    pub fn sign(&mut self, signer: &Ed25519SigningKey) -> Result<()> {
        self.signature = String::new();
        let bytes = self.signing_bytes()?;
        self.signature = signer.sign(&bytes).to_hex();
        Ok(())
    }

    /// Verify the embedded signature against a specific key.
    pub fn verify_signature(&self, key: &mirror_core::Ed25519VerifyingKey) -> Result<()> {
        let bytes = self.signing_bytes()?;
        let signature = Ed25519Signature::from_hex(&self.signature)?;
        key.verify(&bytes, &signature)
    }
}

/// Parse a dotted version string into comparable parts.
fn parse_version(version: &str) -> Result<(u64, u64, u64)> {
    let mut parts = version.split('.');
    let mut next = |name: &str| -> Result<u64> {
        parts
            .next()
            .unwrap_or("0")
            .parse::<u64>()
            .map_err(|_| MirrorError::invalid(format!("bad {name} in version {version:?}")))
    };
    Ok((next("major")?, next("minor")?, next("patch")?))
}

/// Application outcome for one (instance, update) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppliedState {
    Applied { at: Timestamp },
    Failed { at: Timestamp, reason: String },
}

#[derive(Default)]
struct RegistryState {
    manifests: BTreeMap<UpdateId, UpdateManifest>,
    outcomes: BTreeMap<InstanceId, BTreeMap<UpdateId, AppliedState>>,
}

/// The update registry
pub struct UpdateRegistry {
    trust: Arc<TrustSet>,
    state: RwLock<RegistryState>,
}

impl UpdateRegistry {
    pub fn new(trust: Arc<TrustSet>) -> Self {
        Self {
            trust,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Register a manifest for an ordinary section. The signature must
    /// verify under a trusted issuer key; protected sections are refused.
    pub fn register(&self, manifest: UpdateManifest) -> Result<UpdateId> {
        if manifest.section.requires_threshold() {
            return Err(MirrorError::unauthorized(format!(
                "section {} requires a threshold-signed registration",
                manifest.section
            )));
        }
        let issuer = mirror_core::Ed25519VerifyingKey::from_hex(&manifest.issued_by)?;
        if !self.trust.is_trusted_key(&issuer) {
            return Err(MirrorError::unauthorized(
                "manifest issuer is not a trusted guardian key",
            ));
        }
        manifest.verify_signature(&issuer)?;
        self.insert(manifest)
    }

    /// Register a constitution/governance manifest with an M-of-N council
    /// signature over the manifest's signing bytes.
    pub fn register_protected(
        &self,
        manifest: UpdateManifest,
        authorization: &ThresholdSignature,
        guardians: &BTreeMap<GuardianId, Guardian>,
    ) -> Result<UpdateId> {
        if !manifest.section.requires_threshold() {
            return Err(MirrorError::invalid(format!(
                "section {} does not take threshold registration",
                manifest.section
            )));
        }
        authorization.verify(&manifest.signing_bytes()?, guardians)?;
        self.insert(manifest)
    }

    fn insert(&self, manifest: UpdateManifest) -> Result<UpdateId> {
        parse_version(&manifest.version)?;
        let update_id = manifest.update_id;
        tracing::info!(
            update = %update_id,
            section = %manifest.section,
            version = %manifest.version,
            "update manifest registered"
        );
        self.state.write().manifests.insert(update_id, manifest);
        Ok(update_id)
    }

    /// Look up a manifest.
    pub fn get(&self, update_id: UpdateId) -> Option<UpdateManifest> {
        self.state.read().manifests.get(&update_id).cloned()
    }

    /// Manifests available to an instance: matching section and channel,
    /// version window containing `current_version`, and not yet applied.
    pub fn available(
        &self,
        instance_id: &InstanceId,
        current_version: &str,
        section: UpdateSection,
        channel: UpdateChannel,
    ) -> Result<Vec<UpdateManifest>> {
        let current = parse_version(current_version)?;
        let state = self.state.read();
        let applied: BTreeSet<UpdateId> = state
            .outcomes
            .get(instance_id)
            .map(|m| {
                m.iter()
                    .filter(|(_, outcome)| matches!(outcome, AppliedState::Applied { .. }))
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default();

        let mut manifests: Vec<UpdateManifest> = state
            .manifests
            .values()
            .filter(|m| m.section == section && m.channel == channel)
            .filter(|m| !applied.contains(&m.update_id))
            .filter(|m| {
                let min_ok = m
                    .min_version
                    .as_deref()
                    .and_then(|v| parse_version(v).ok())
                    .map_or(true, |min| min <= current);
                let max_ok = m
                    .max_version
                    .as_deref()
                    .and_then(|v| parse_version(v).ok())
                    .map_or(true, |max| current <= max);
                min_ok && max_ok
            })
            .cloned()
            .collect();
        manifests.sort_by_key(|m| parse_version(&m.version).unwrap_or((0, 0, 0)));
        Ok(manifests)
    }

    /// Record a successful application.
    pub fn mark_applied(&self, instance_id: InstanceId, update_id: UpdateId, at: Timestamp) {
        self.state
            .write()
            .outcomes
            .entry(instance_id)
            .or_default()
            .insert(update_id, AppliedState::Applied { at });
    }

    /// Record a failed application with its specific reason.
    pub fn mark_failed(
        &self,
        instance_id: InstanceId,
        update_id: UpdateId,
        at: Timestamp,
        reason: impl Into<String>,
    ) {
        let reason = reason.into();
        tracing::warn!(update = %update_id, reason = %reason, "update application failed");
        self.state
            .write()
            .outcomes
            .entry(instance_id)
            .or_default()
            .insert(update_id, AppliedState::Failed { at, reason });
    }

    /// Application outcome for one update on one instance.
    pub fn outcome(&self, instance_id: &InstanceId, update_id: UpdateId) -> Option<AppliedState> {
        self.state
            .read()
            .outcomes
            .get(instance_id)
            .and_then(|m| m.get(&update_id))
            .cloned()
    }

    /// Pre-apply contract: verify manifest signature, every artifact's
    /// on-disk hash, dependency application, and conflict absence.
    /// Returns the specific failure so callers can `mark_failed` with it.
    pub fn check_apply(
        &self,
        instance_id: &InstanceId,
        manifest: &UpdateManifest,
        artifacts_dir: &Path,
    ) -> Result<()> {
        let issuer = mirror_core::Ed25519VerifyingKey::from_hex(&manifest.issued_by)?;
        if !self.trust.is_trusted_key(&issuer) {
            return Err(MirrorError::unauthorized("manifest issuer not trusted"));
        }
        manifest.verify_signature(&issuer)?;

        for (filename, expected) in &manifest.artifacts {
            let path = artifacts_dir.join(filename);
            let bytes = std::fs::read(&path).map_err(|e| {
                MirrorError::storage(format!("artifact {filename} unreadable: {e}"))
            })?;
            let actual = mirror_core::sha256_hex(&bytes);
            if &actual != expected {
                return Err(MirrorError::invalid(format!(
                    "artifact {filename} hash mismatch: expected {expected}, got {actual}"
                )));
            }
        }

        for dependency in &manifest.dependencies {
            match self.outcome(instance_id, *dependency) {
                Some(AppliedState::Applied { .. }) => {}
                _ => {
                    return Err(MirrorError::invalid(format!(
                        "dependency {dependency} is not applied"
                    )))
                }
            }
        }
        for conflict in &manifest.conflicts {
            if let Some(AppliedState::Applied { .. }) = self.outcome(instance_id, *conflict) {
                return Err(MirrorError::invalid(format!(
                    "conflicting update {conflict} is applied"
                )));
            }
        }
        Ok(())
    }
}
