//! # Mirror Recognition
//!
//! Recognition, certification, and governance: Ed25519-signed recognition
//! certificates with full lifecycle, rotating operational keys chained to
//! guardian keys, M-of-N threshold governance for amendments, and the
//! signed update registry with its apply contract.

#![forbid(unsafe_code)]

/// Recognition certificates and revocation records
pub mod certificate;
/// Guardian council: proposals, votes, execution
pub mod council;
/// Guardian membership records
pub mod guardian;
/// Rotating operational keys
pub mod rok;
/// Certificate/heartbeat/ROK service
pub mod service;
/// M-of-N threshold signatures
pub mod threshold;
/// Read-often/write-rare trust state
pub mod trust;
/// Signed update manifests and registry
pub mod updates;

pub use certificate::{
    CertificateStatus, RecognitionCertificate, RevocationCause, RevocationRecord,
};
pub use council::{
    sign_vote, ConstitutionalProposal, ExecutionEffect, GuardianCouncil, ProposalStatus,
    ProposalType, Vote, VotePayload,
};
pub use guardian::{Guardian, GuardianRole, GuardianStatus};
pub use rok::{issue_rok, IssuedRok, RokRecord, RokStatus};
pub use service::{HeartbeatRecord, HeartbeatState, RecognitionService};
pub use threshold::ThresholdSignature;
pub use trust::TrustSet;
pub use updates::{
    AppliedState, UpdateChannel, UpdateManifest, UpdateRegistry, UpdateSection,
};
