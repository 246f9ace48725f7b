//! # Mirror Core - Foundation
//!
//! Single source of truth for the engine's domain concepts and interfaces:
//! canonical serialization, cryptographic primitives, identifiers, signed
//! events, shared domain types, collaborator interfaces, and configuration.
//!
//! This crate has zero dependencies on other Mirror crates. It contains no
//! pipeline logic, no storage implementations, and no network code; those
//! live in the layer crates built on top of it.

#![forbid(unsafe_code)]

/// Canonical JSON (RFC 8785) serialization and hashing
pub mod canonical;
/// Engine configuration, read once at startup
pub mod config;
/// Cryptographic primitives (SHA-256, Ed25519)
pub mod crypto;
/// Shared domain types (reflections, patterns, tensions, signals, violations)
pub mod domain;
/// Collaborator interfaces (response generator, ASR, notifier, clock)
pub mod effects;
/// Unified error handling
pub mod errors;
/// Signed, hash-chained events
pub mod event;
/// Core identifier types
pub mod identifiers;
/// Time semantics (wall timestamps, monotonic deadlines)
pub mod time;

pub use canonical::{canonical_hash, from_json_slice, to_canonical_json, to_canonical_string};
pub use config::{MirrorConfig, SandboxQuotas};
pub use crypto::{
    ed25519_verify, sha256, sha256_hex, Ed25519Signature, Ed25519SigningKey, Ed25519VerifyingKey,
    GENESIS_HASH,
};
pub use domain::{
    AxiomId, IdentitySnapshot, InvocationMode, Modality, Pattern, PatternStrength, PatternType,
    Reflection, SafetyCategory, SafetyLevel, SafetySignal, SemanticContext, Tension, TensionType,
    Violation, ViolationSeverity,
};
pub use effects::{
    Asr, Clock, FixedClock, GuardianNotifier, NullNotifier, ResponseGenerator, SystemClock,
    Transcript,
};
pub use errors::{MirrorError, Result};
pub use event::{Event, EventType};
pub use identifiers::{
    CertificateId, EventId, GuardianId, InstanceId, MessageId, ProposalId, ReflectionId,
    RevocationId, RokId, UpdateId, UserId, WorkerId,
};
pub use time::{Deadline, Timestamp};
