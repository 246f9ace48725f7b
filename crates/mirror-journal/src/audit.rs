//! Audit trail of internal pipeline decisions
//!
//! A separate hash-chained log, parallel to the event log but scoped to what
//! the pipeline decided and why. Nothing here is user-facing; evidence is
//! truncated before it is recorded.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use mirror_core::{canonical, EventId, MirrorError, Result, Timestamp, GENESIS_HASH};

/// Privacy cap applied to any evidence recorded in audit data
pub const EVIDENCE_CAP: usize = 100;

/// Truncate evidence text to the documented cap, on a char boundary.
pub fn truncate_evidence(text: &str) -> String {
    text.chars().take(EVIDENCE_CAP).collect()
}

/// Internal pipeline decisions the trail records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    StageEntered,
    SafetySignal,
    AxiomViolation,
    SemanticAnalysisComplete,
    ExpressionShapingComplete,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StageEntered => "stage_entered",
            Self::SafetySignal => "safety_signal",
            Self::AxiomViolation => "axiom_violation",
            Self::SemanticAnalysisComplete => "semantic_analysis_complete",
            Self::ExpressionShapingComplete => "expression_shaping_complete",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chained audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub event_type: AuditEventType,
    /// Pipeline stage that produced the record
    pub stage: String,
    pub data: serde_json::Value,
    pub previous_hash: String,
    pub event_hash: String,
}

impl AuditEvent {
    fn canonical_bytes(
        timestamp: Timestamp,
        event_type: AuditEventType,
        stage: &str,
        data: &serde_json::Value,
        previous_hash: &str,
    ) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct HashedFields<'a> {
            timestamp: Timestamp,
            event_type: AuditEventType,
            stage: &'a str,
            data: &'a serde_json::Value,
            previous_hash: &'a str,
        }
        canonical::to_canonical_json(&HashedFields {
            timestamp,
            event_type,
            stage,
            data,
            previous_hash,
        })
        .map_err(|e| MirrorError::serialization(e.to_string()))
    }

    /// Recompute this record's hash from stored fields.
    pub fn recompute_hash(&self) -> Result<String> {
        let bytes = Self::canonical_bytes(
            self.timestamp,
            self.event_type,
            &self.stage,
            &self.data,
            &self.previous_hash,
        )?;
        Ok(mirror_core::sha256_hex(&bytes))
    }
}

/// Result of verifying the audit chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditVerification {
    Ok,
    FirstBad(EventId),
}

impl AuditVerification {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Hash-chained audit log with optional file persistence
pub struct AuditTrail {
    inner: Mutex<AuditInner>,
    path: Option<PathBuf>,
}

struct AuditInner {
    events: Vec<AuditEvent>,
    tail: String,
}

impl AuditTrail {
    /// In-memory trail
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(AuditInner {
                events: Vec::new(),
                tail: GENESIS_HASH.to_string(),
            }),
            path: None,
        }
    }

    /// Trail persisted to a JSONL file, loading any existing records
    pub fn at_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut events = Vec::new();
        match std::fs::read_to_string(&path) {
            Ok(raw) => {
                for line in raw.lines().filter(|l| !l.trim().is_empty()) {
                    let event: AuditEvent = serde_json::from_str(line).map_err(|e| {
                        MirrorError::storage(format!("corrupt audit line in {}: {e}", path.display()))
                    })?;
                    events.push(event);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let tail = events
            .last()
            .map(|e| e.event_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        Ok(Self {
            inner: Mutex::new(AuditInner { events, tail }),
            path: Some(path),
        })
    }

    /// Append a record to the chain.
    pub fn log(
        &self,
        timestamp: Timestamp,
        event_type: AuditEventType,
        stage: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<AuditEvent> {
        let stage = stage.into();
        let mut inner = self.inner.lock();
        let previous_hash = inner.tail.clone();
        let bytes =
            AuditEvent::canonical_bytes(timestamp, event_type, &stage, &data, &previous_hash)?;
        let event = AuditEvent {
            id: EventId::new(),
            timestamp,
            event_type,
            stage,
            data,
            previous_hash,
            event_hash: mirror_core::sha256_hex(&bytes),
        };
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut line = serde_json::to_vec(&event)?;
            line.push(b'\n');
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            file.write_all(&line)?;
            file.sync_data()?;
        }
        inner.tail = event.event_hash.clone();
        inner.events.push(event.clone());
        Ok(event)
    }

    /// Walk the chain, recomputing hashes and linkage.
    pub fn verify_integrity(&self) -> AuditVerification {
        let inner = self.inner.lock();
        let mut expected_previous = GENESIS_HASH.to_string();
        for event in &inner.events {
            if event.previous_hash != expected_previous {
                return AuditVerification::FirstBad(event.id);
            }
            match event.recompute_hash() {
                Ok(hash) if hash == event.event_hash => {}
                _ => return AuditVerification::FirstBad(event.id),
            }
            expected_previous = event.event_hash.clone();
        }
        AuditVerification::Ok
    }

    /// All records, oldest first, optionally filtered by type.
    pub fn events(&self, filter: Option<AuditEventType>) -> Vec<AuditEvent> {
        let inner = self.inner.lock();
        inner
            .events
            .iter()
            .filter(|e| filter.map_or(true, |f| e.event_type == f))
            .cloned()
            .collect()
    }

    /// Per-type record counts.
    pub fn summary(&self) -> BTreeMap<String, u64> {
        let inner = self.inner.lock();
        let mut counts = BTreeMap::new();
        for event in &inner.events {
            *counts.entry(event.event_type.as_str().to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Export the full trail as a JSON array.
    pub fn export_json(&self) -> Result<String> {
        let inner = self.inner.lock();
        Ok(serde_json::to_string_pretty(&inner.events)?)
    }

    /// Export the full trail as CSV (data column is compact JSON).
    pub fn export_csv(&self) -> Result<String> {
        let inner = self.inner.lock();
        let mut out = String::from("id,timestamp,event_type,stage,data,previous_hash,event_hash\n");
        for event in &inner.events {
            let data = serde_json::to_string(&event.data)?;
            out.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                event.id,
                event.timestamp.as_millis(),
                event.event_type,
                csv_escape(&event.stage),
                csv_escape(&data),
                event.previous_hash,
                event.event_hash,
            ));
        }
        Ok(out)
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
