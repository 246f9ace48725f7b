//! # Mirror Policy
//!
//! The constitutional policy engine: layered checkers that gate every
//! response. L1 detects crisis signals, L0 enforces the 14 behavioral
//! invariants, L2 extracts semantic patterns and tensions, L3 adapts tone
//! and enforces leave-ability, and the orchestrator runs the stages in
//! order with a fail-closed policy and full audit emission.

#![forbid(unsafe_code)]

/// L0 constitutional layer (the 14 invariant checkers)
pub mod constitution;
/// L3 expression layer (tone, leave-ability)
pub mod expression;
/// Pipeline orchestrator
pub mod pipeline;
/// Built-in deterministic response provider
pub mod provider;
/// L1 safety layer (crisis detection)
pub mod safety;
/// L2 semantic layer (patterns, tensions)
pub mod semantic;
/// Telemetry governance and research-export anonymization
pub mod telemetry;

pub use constitution::{AxiomChecker, ConstitutionalLayer};
pub use expression::{enforce_leaveability, DetailLevel, ExpressionLayer, Preferences, Tone};
pub use pipeline::{Pipeline, PipelineRequest, PipelineResult, Stage, BLOCKED_FALLBACK};
pub use provider::TemplateGenerator;
pub use safety::{SafetyLayer, CRISIS_RESOURCES, CRISIS_TEMPLATE};
pub use semantic::SemanticLayer;
pub use telemetry::{
    ExportRecord, FeatureType, KAnonymityCheck, MetricCheck, ResearchAnonymizer, TelemetryPolicy,
    TimeGranularity, ALLOWED_METRICS, FORBIDDEN_METRIC_PATTERNS,
};
