//! Recognition service: certificate lifecycle, heartbeats, operational keys
//!
//! Verification fails closed: any failed check returns `None` and is
//! logged. Revocation is monotone. A missing heartbeat is never grounds
//! for revocation; it is surfaced as staleness for external monitoring.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use mirror_core::{
    CertificateId, Clock, Ed25519SigningKey, Ed25519VerifyingKey, InstanceId, MirrorError, Result,
    RevocationId, RokId, Timestamp, UserId,
};

use crate::certificate::{
    CertificateStatus, RecognitionCertificate, RevocationCause, RevocationRecord,
};
use crate::rok::{issue_rok, IssuedRok, RokRecord, RokStatus};
use crate::trust::TrustSet;

/// Heartbeat freshness as seen by external monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatState {
    Fresh,
    Stale,
    Never,
}

/// One recorded liveness heartbeat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub user_id: UserId,
    pub at: Timestamp,
    pub metadata: serde_json::Value,
}

#[derive(Default)]
struct ServiceState {
    certificates: BTreeMap<CertificateId, RecognitionCertificate>,
    revocations: Vec<RevocationRecord>,
    heartbeats: BTreeMap<InstanceId, HeartbeatRecord>,
    roks: BTreeMap<RokId, RokRecord>,
}

/// The recognition service
pub struct RecognitionService {
    signer: Ed25519SigningKey,
    trust: Arc<TrustSet>,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
    state: RwLock<ServiceState>,
}

impl RecognitionService {
    pub fn new(
        signer: Ed25519SigningKey,
        trust: Arc<TrustSet>,
        clock: Arc<dyn Clock>,
        stale_after: Duration,
    ) -> Self {
        Self {
            signer,
            trust,
            clock,
            stale_after,
            state: RwLock::new(ServiceState::default()),
        }
    }

    /// The verifying key this service signs with
    pub fn issuer_key(&self) -> Ed25519VerifyingKey {
        self.signer.verifying_key()
    }

    /// Issue a certificate recognizing (instance, user) at `tier` for
    /// `duration`.
    pub fn certify(
        &self,
        instance_id: InstanceId,
        user_id: UserId,
        tier: impl Into<String>,
        duration: Duration,
    ) -> Result<RecognitionCertificate> {
        let issued_at = self.clock.now();
        let expires_at = issued_at.saturating_add(duration);
        let certificate = RecognitionCertificate::issue(
            instance_id,
            user_id,
            tier,
            issued_at,
            expires_at,
            &self.signer,
        )?;
        tracing::info!(cert = %certificate.cert_id, tier = %certificate.tier, "certificate issued");
        self.state
            .write()
            .certificates
            .insert(certificate.cert_id, certificate.clone());
        Ok(certificate)
    }

    /// Verify a certificate. Valid iff status is active, now is before
    /// expiry, the issuer key is trusted, and the signature verifies.
    /// Every failure path returns `None` and logs why.
    pub fn verify(&self, cert_id: CertificateId) -> Option<RecognitionCertificate> {
        let now = self.clock.now();
        let mut state = self.state.write();
        let certificate = match state.certificates.get_mut(&cert_id) {
            Some(certificate) => certificate,
            None => {
                tracing::debug!(cert = %cert_id, "verification failed: unknown certificate");
                return None;
            }
        };
        if certificate.status != CertificateStatus::Active {
            tracing::debug!(cert = %cert_id, status = %certificate.status, "verification failed: not active");
            return None;
        }
        if certificate.is_expired(now) {
            certificate.status = CertificateStatus::Expired;
            tracing::debug!(cert = %cert_id, "verification failed: expired");
            return None;
        }
        let issuer = match certificate.issuer_key() {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(cert = %cert_id, error = %e, "verification failed: bad issuer key");
                return None;
            }
        };
        if !self.trust.is_trusted_key(&issuer) {
            tracing::warn!(cert = %cert_id, "verification failed: issuer not in trust set");
            return None;
        }
        if let Err(e) = certificate.verify_signature() {
            tracing::warn!(cert = %cert_id, error = %e, "verification failed: bad signature");
            return None;
        }
        Some(certificate.clone())
    }

    /// Revoke a certificate. Monotone: once revoked, a certificate never
    /// becomes valid again; a second revocation is an error.
    pub fn revoke(
        &self,
        cert_id: CertificateId,
        cause: RevocationCause,
        reason: impl Into<String>,
        revoked_by: impl Into<String>,
    ) -> Result<RevocationId> {
        let mut state = self.state.write();
        let certificate = state
            .certificates
            .get_mut(&cert_id)
            .ok_or_else(|| MirrorError::not_found(format!("certificate {cert_id}")))?;
        if certificate.status == CertificateStatus::Revoked {
            return Err(MirrorError::invalid(format!(
                "certificate {cert_id} is already revoked"
            )));
        }
        certificate.status = CertificateStatus::Revoked;
        let record = RevocationRecord::create(
            cert_id,
            cause,
            reason,
            self.clock.now(),
            revoked_by,
            &self.signer,
        )?;
        let revocation_id = record.revocation_id;
        tracing::info!(cert = %cert_id, cause = %cause, "certificate revoked");
        state.revocations.push(record);
        Ok(revocation_id)
    }

    /// Revocation records for audit and export.
    pub fn revocations(&self) -> Vec<RevocationRecord> {
        self.state.read().revocations.clone()
    }

    /// Record a liveness heartbeat from an instance.
    pub fn record_heartbeat(
        &self,
        instance_id: InstanceId,
        user_id: UserId,
        metadata: serde_json::Value,
    ) {
        let record = HeartbeatRecord {
            user_id,
            at: self.clock.now(),
            metadata,
        };
        self.state.write().heartbeats.insert(instance_id, record);
    }

    /// Last heartbeat time, if any.
    pub fn last_heartbeat(&self, instance_id: &InstanceId) -> Option<Timestamp> {
        self.state.read().heartbeats.get(instance_id).map(|r| r.at)
    }

    /// Freshness classification for external monitoring.
    pub fn heartbeat_state(&self, instance_id: &InstanceId) -> HeartbeatState {
        match self.last_heartbeat(instance_id) {
            None => HeartbeatState::Never,
            Some(last) => {
                let age_ms = self.clock.now().millis_since(last) as u128;
                if age_ms > self.stale_after.as_millis() {
                    HeartbeatState::Stale
                } else {
                    HeartbeatState::Fresh
                }
            }
        }
    }

    /// Issue a rotating operational key valid for `duration`. The private
    /// half is in the return value and nowhere else.
    pub fn issue_operational_key(&self, duration: Duration) -> Result<IssuedRok> {
        let issued_at = self.clock.now();
        let issued = issue_rok(&self.signer, issued_at, issued_at.saturating_add(duration))?;
        self.state
            .write()
            .roks
            .insert(issued.record.key_id, issued.record.clone());
        Ok(issued)
    }

    /// Validate an operational key: known, active, unexpired, matching
    /// public key, and signed by this service's guardian key.
    pub fn validate_operational_key(&self, key_id: RokId, public_key_hex: &str) -> bool {
        let now = self.clock.now();
        let state = self.state.read();
        let Some(record) = state.roks.get(&key_id) else {
            tracing::debug!(key = %key_id, "ROK validation failed: unknown key");
            return false;
        };
        if record.status != RokStatus::Active {
            return false;
        }
        if now >= record.expires_at {
            return false;
        }
        if record.public_key != public_key_hex {
            tracing::warn!(key = %key_id, "ROK validation failed: public key mismatch");
            return false;
        }
        record.verify(&self.signer.verifying_key()).is_ok()
    }
}
