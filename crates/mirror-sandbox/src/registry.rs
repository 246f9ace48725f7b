//! Worker manifest registry
//!
//! Workers land as `proposed` and run only once `approved`. A worker's
//! version is immutable; shipping a new version means registering a new
//! worker id. Approval of workers touching protected surfaces requires an
//! M-of-N council signature.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use mirror_core::{
    canonical, Ed25519Signature, Ed25519SigningKey, Ed25519VerifyingKey, GuardianId, MirrorError,
    Result, WorkerId,
};
use mirror_recognition::{Guardian, ThresholdSignature};

/// Permissions that make a worker "protected": approving such a worker
/// takes a threshold signature, not a single approver.
pub const PROTECTED_PERMISSIONS: &[&str] =
    &["journal_write", "governance", "network", "identity_read"];

/// Worker lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Proposed,
    Approved,
    Suspended,
    Revoked,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Approved => "approved",
            Self::Suspended => "suspended",
            Self::Revoked => "revoked",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signed worker manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerManifest {
    pub worker_id: WorkerId,
    pub name: String,
    /// Immutable once registered; a new version is a new worker id
    pub version: String,
    /// Source handed to the sandbox interpreter
    pub code: String,
    pub entrypoint: String,
    pub required_permissions: Vec<String>,
    pub input_schema: serde_json::Value,
    pub output_schema: serde_json::Value,
    /// Hex-encoded author public key
    pub author: String,
    /// Hex-encoded signature over the canonical manifest minus
    /// `signature` and `status` (status changes after signing)
    pub signature: String,
    pub status: WorkerStatus,
}

impl WorkerManifest {
    /// Canonical bytes the author signs.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        let mut value = serde_json::to_value(self)?;
        if let Some(object) = value.as_object_mut() {
            object.remove("signature");
            object.remove("status");
        }
        canonical::to_canonical_json(&value).map_err(|e| MirrorError::serialization(e.to_string()))
    }

    /// Sign in place with the author's key.
    pub fn sign(&mut self, author: &Ed25519SigningKey) -> Result<()> {
        self.author = author.verifying_key().to_hex();
        let bytes = self.signing_bytes()?;
        self.signature = author.sign(&bytes).to_hex();
        Ok(())
    }

    /// Verify the author signature.
    pub fn verify_signature(&self) -> Result<()> {
        let key = Ed25519VerifyingKey::from_hex(&self.author)?;
        let signature = Ed25519Signature::from_hex(&self.signature)?;
        key.verify(&self.signing_bytes()?, &signature)
    }

    /// Whether any requested permission is on the protected list.
    pub fn touches_protected_surface(&self) -> bool {
        self.required_permissions
            .iter()
            .any(|p| PROTECTED_PERMISSIONS.contains(&p.as_str()))
    }
}

/// The worker registry
#[derive(Default)]
pub struct WorkerRegistry {
    workers: RwLock<BTreeMap<WorkerId, WorkerManifest>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a manifest; it lands in `proposed`.
    pub fn register(&self, mut manifest: WorkerManifest) -> Result<WorkerId> {
        manifest.verify_signature()?;
        manifest.status = WorkerStatus::Proposed;
        let worker_id = manifest.worker_id;
        let mut workers = self.workers.write();
        if workers.contains_key(&worker_id) {
            return Err(MirrorError::invalid(format!(
                "worker {worker_id} is already registered; new versions need a new worker id"
            )));
        }
        tracing::info!(worker = %worker_id, name = %manifest.name, "worker manifest registered");
        workers.insert(worker_id, manifest);
        Ok(worker_id)
    }

    /// Approve a proposed worker.
    ///
    /// Workers touching protected surfaces require a threshold signature
    /// over the manifest's signing bytes; `authorization` is ignored for
    /// ordinary workers.
    pub fn approve(
        &self,
        worker_id: WorkerId,
        approver: &str,
        authorization: Option<(&ThresholdSignature, &BTreeMap<GuardianId, Guardian>)>,
    ) -> Result<()> {
        let mut workers = self.workers.write();
        let manifest = workers
            .get_mut(&worker_id)
            .ok_or_else(|| MirrorError::not_found(format!("worker {worker_id}")))?;
        if manifest.status != WorkerStatus::Proposed {
            return Err(MirrorError::invalid(format!(
                "worker {worker_id} is {}, not proposed",
                manifest.status
            )));
        }
        if manifest.touches_protected_surface() {
            let (threshold_sig, guardians) = authorization.ok_or_else(|| {
                MirrorError::unauthorized(format!(
                    "worker {worker_id} touches protected surfaces; threshold approval required"
                ))
            })?;
            threshold_sig.verify(&manifest.signing_bytes()?, guardians)?;
        }
        manifest.status = WorkerStatus::Approved;
        tracing::info!(worker = %worker_id, approver, "worker approved");
        Ok(())
    }

    /// Suspend an approved worker.
    pub fn suspend(&self, worker_id: WorkerId) -> Result<()> {
        self.transition(worker_id, WorkerStatus::Suspended)
    }

    /// Revoke a worker permanently.
    pub fn revoke(&self, worker_id: WorkerId) -> Result<()> {
        self.transition(worker_id, WorkerStatus::Revoked)
    }

    fn transition(&self, worker_id: WorkerId, to: WorkerStatus) -> Result<()> {
        let mut workers = self.workers.write();
        let manifest = workers
            .get_mut(&worker_id)
            .ok_or_else(|| MirrorError::not_found(format!("worker {worker_id}")))?;
        if manifest.status == WorkerStatus::Revoked {
            return Err(MirrorError::invalid(format!(
                "worker {worker_id} is revoked; no further transitions"
            )));
        }
        manifest.status = to;
        Ok(())
    }

    /// Fetch a manifest.
    pub fn get(&self, worker_id: WorkerId) -> Option<WorkerManifest> {
        self.workers.read().get(&worker_id).cloned()
    }

    /// List manifests, optionally filtered by status.
    pub fn list(&self, status: Option<WorkerStatus>) -> Vec<WorkerManifest> {
        self.workers
            .read()
            .values()
            .filter(|m| status.map_or(true, |s| m.status == s))
            .cloned()
            .collect()
    }
}
