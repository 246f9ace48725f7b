//! Recognition certificates
//!
//! A certificate is a guardian's signed statement that an instance is
//! recognized at a given tier until a given time. The signed payload is
//! the canonical JSON of the identifying fields; tier is opaque metadata.

use serde::{Deserialize, Serialize};
use std::fmt;

use mirror_core::{
    canonical, Ed25519Signature, Ed25519SigningKey, Ed25519VerifyingKey, MirrorError, Result,
    CertificateId, InstanceId, RevocationId, Timestamp, UserId,
};

/// Certificate lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Active,
    Suspended,
    Revoked,
    Expired,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a certificate was revoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationCause {
    ConstitutionalViolation,
    PaymentFailure,
    UserRequest,
    SecurityBreach,
    GuardianDiscretion,
}

impl RevocationCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConstitutionalViolation => "constitutional_violation",
            Self::PaymentFailure => "payment_failure",
            Self::UserRequest => "user_request",
            Self::SecurityBreach => "security_breach",
            Self::GuardianDiscretion => "guardian_discretion",
        }
    }
}

impl fmt::Display for RevocationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fields a guardian signs when issuing a certificate
#[derive(Serialize)]
struct SignedFields<'a> {
    cert_id: CertificateId,
    instance_id: &'a InstanceId,
    user_id: &'a UserId,
    tier: &'a str,
    issued_at: Timestamp,
    expires_at: Timestamp,
    guardian_public_key: &'a str,
}

/// A signed recognition certificate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionCertificate {
    pub cert_id: CertificateId,
    pub instance_id: InstanceId,
    pub user_id: UserId,
    /// Opaque tier label; no enforcement surface in the core
    pub tier: String,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
    /// Hex-encoded issuer public key
    pub guardian_public_key: String,
    /// Hex-encoded Ed25519 signature over the canonical signed payload
    pub signature: String,
    pub status: CertificateStatus,
}

impl RecognitionCertificate {
    /// Build and sign a new certificate.
    pub fn issue(
        instance_id: InstanceId,
        user_id: UserId,
        tier: impl Into<String>,
        issued_at: Timestamp,
        expires_at: Timestamp,
        signer: &Ed25519SigningKey,
    ) -> Result<Self> {
        let cert_id = CertificateId::new();
        let tier = tier.into();
        let guardian_public_key = signer.verifying_key().to_hex();
        let bytes = Self::canonical_bytes(
            cert_id,
            &instance_id,
            &user_id,
            &tier,
            issued_at,
            expires_at,
            &guardian_public_key,
        )?;
        let signature = signer.sign(&bytes).to_hex();
        Ok(Self {
            cert_id,
            instance_id,
            user_id,
            tier,
            issued_at,
            expires_at,
            guardian_public_key,
            signature,
            status: CertificateStatus::Active,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn canonical_bytes(
        cert_id: CertificateId,
        instance_id: &InstanceId,
        user_id: &UserId,
        tier: &str,
        issued_at: Timestamp,
        expires_at: Timestamp,
        guardian_public_key: &str,
    ) -> Result<Vec<u8>> {
        canonical::to_canonical_json(&SignedFields {
            cert_id,
            instance_id,
            user_id,
            tier,
            issued_at,
            expires_at,
            guardian_public_key,
        })
        .map_err(|e| MirrorError::serialization(e.to_string()))
    }

    /// Canonical bytes the signature covers.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        Self::canonical_bytes(
            self.cert_id,
            &self.instance_id,
            &self.user_id,
            &self.tier,
            self.issued_at,
            self.expires_at,
            &self.guardian_public_key,
        )
    }

    /// The issuer key embedded in the certificate.
    pub fn issuer_key(&self) -> Result<Ed25519VerifyingKey> {
        Ed25519VerifyingKey::from_hex(&self.guardian_public_key)
    }

    /// Verify the certificate's signature against its embedded issuer key.
    pub fn verify_signature(&self) -> Result<()> {
        let key = self.issuer_key()?;
        let signature = Ed25519Signature::from_hex(&self.signature)?;
        key.verify(&self.signing_bytes()?, &signature)
    }

    /// Whether the certificate has passed its expiry.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

/// A signed revocation record. Revocation is monotone: once revoked a
/// certificate is never re-activated; a new certificate must be issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevocationRecord {
    pub revocation_id: RevocationId,
    pub cert_id: CertificateId,
    pub cause: RevocationCause,
    pub reason: String,
    pub revoked_at: Timestamp,
    pub revoked_by: String,
    /// Hex-encoded signature over the canonical record (minus this field)
    pub signature: String,
}

impl RevocationRecord {
    /// Build and sign a revocation record.
    pub fn create(
        cert_id: CertificateId,
        cause: RevocationCause,
        reason: impl Into<String>,
        revoked_at: Timestamp,
        revoked_by: impl Into<String>,
        signer: &Ed25519SigningKey,
    ) -> Result<Self> {
        let revocation_id = RevocationId::new();
        let reason = reason.into();
        let revoked_by = revoked_by.into();

        #[derive(Serialize)]
        struct SignedRevocation<'a> {
            revocation_id: RevocationId,
            cert_id: CertificateId,
            cause: RevocationCause,
            reason: &'a str,
            revoked_at: Timestamp,
            revoked_by: &'a str,
        }
        let bytes = canonical::to_canonical_json(&SignedRevocation {
            revocation_id,
            cert_id,
            cause,
            reason: &reason,
            revoked_at,
            revoked_by: &revoked_by,
        })
        .map_err(|e| MirrorError::serialization(e.to_string()))?;

        Ok(Self {
            revocation_id,
            cert_id,
            cause,
            reason,
            revoked_at,
            revoked_by,
            signature: signer.sign(&bytes).to_hex(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(signer: &Ed25519SigningKey) -> RecognitionCertificate {
        RecognitionCertificate::issue(
            InstanceId::new("i1").unwrap(),
            UserId::new("u1").unwrap(),
            "personal",
            Timestamp::from_unix_millis(0),
            Timestamp::from_unix_millis(1_000),
            signer,
        )
        .unwrap()
    }

    #[test]
    fn issue_and_verify() {
        let signer = Ed25519SigningKey::generate();
        let certificate = cert(&signer);
        assert_eq!(certificate.status, CertificateStatus::Active);
        certificate.verify_signature().unwrap();
    }

    #[test]
    fn tamper_with_tier_breaks_signature() {
        let signer = Ed25519SigningKey::generate();
        let mut certificate = cert(&signer);
        certificate.tier = "sovereign".into();
        assert!(certificate.verify_signature().is_err());
    }

    #[test]
    fn expiry_boundary() {
        let signer = Ed25519SigningKey::generate();
        let certificate = cert(&signer);
        assert!(!certificate.is_expired(Timestamp::from_unix_millis(999)));
        assert!(certificate.is_expired(Timestamp::from_unix_millis(1_000)));
    }

    #[test]
    fn revocation_record_roundtrip() {
        let signer = Ed25519SigningKey::generate();
        let certificate = cert(&signer);
        let record = RevocationRecord::create(
            certificate.cert_id,
            RevocationCause::UserRequest,
            "user asked to leave",
            Timestamp::from_unix_millis(500),
            "guardian",
            &signer,
        )
        .unwrap();
        assert_eq!(record.cert_id, certificate.cert_id);
        let json = serde_json::to_string(&record).unwrap();
        let back: RevocationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
