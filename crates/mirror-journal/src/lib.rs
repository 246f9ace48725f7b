//! # Mirror Journal
//!
//! The tamper-evident record layer: an append-only, hash-chained event log
//! per (instance, user) stream, a deterministic replay engine that derives
//! identity snapshots from those streams, and a separate hash-chained audit
//! trail for internal pipeline decisions.
//!
//! Identity state is a pure function of the event log. Snapshots may be
//! cached, but the log is always the source of truth.

#![forbid(unsafe_code)]

/// Hash-chained audit trail of pipeline decisions
pub mod audit;
/// Append-only chained event log
pub mod log;
/// Deterministic replay from events to identity snapshots
pub mod replay;
/// Log storage backends (file, memory)
pub mod store;

pub use audit::{
    truncate_evidence, AuditEvent, AuditEventType, AuditTrail, AuditVerification, EVIDENCE_CAP,
};
pub use log::{verify_events, ChainVerification, EventLog};
pub use replay::{dominant_tension, replay, ReplayOutcome, ReplayWarning};
pub use store::{FileStore, LogStore, MemoryStore, StreamKey};
