//! Pipeline orchestrator
//!
//! Runs the layered stages in order with a fail-closed policy: any error
//! inside a stage blocks the response and the audit record is still
//! emitted. Stages 1-4 are a read-only prefix; journal events are appended
//! only in the persistence stage, after a response has passed every check,
//! so the event log records delivered responses (plus safety and violation
//! records, which are appended the moment they are decided).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use mirror_core::{
    Clock, Deadline, Ed25519SigningKey, EventType, GuardianNotifier, InstanceId, MirrorError,
    Modality, Reflection, ResponseGenerator, Result, SafetyLevel, SafetySignal, SemanticContext,
    Violation,
};
use mirror_journal::{truncate_evidence, AuditEventType, AuditTrail, EventLog};

use crate::constitution::ConstitutionalLayer;
use crate::expression::{ExpressionLayer, Preferences};
use crate::safety::{SafetyLayer, CRISIS_TEMPLATE};
use crate::semantic::SemanticLayer;

/// Generic fallback text for blocked responses; never exposes internals
pub const BLOCKED_FALLBACK: &str =
    "That response couldn't be shared. Your reflection was recorded as written.";

/// Request size cap enforced at admission
const MAX_CONTENT_BYTES: usize = 64 * 1024;

/// How far a request got before returning
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Admission,
    Safety,
    RequestCheck,
    Semantic,
    Generation,
    ResponseCheck,
    Shaping,
    Validation,
    Persistence,
    Complete,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admission => "admission",
            Self::Safety => "l1_safety",
            Self::RequestCheck => "l0_request",
            Self::Semantic => "l2_semantic",
            Self::Generation => "generation",
            Self::ResponseCheck => "l0_response",
            Self::Shaping => "l3_shape",
            Self::Validation => "l3_validate",
            Self::Persistence => "persistence",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request through the pipeline
pub struct PipelineRequest {
    pub reflection: Reflection,
    pub history: Vec<Reflection>,
    pub preferences: Preferences,
    /// Pre-generated candidate; when absent the configured generator runs
    pub candidate_response: Option<String>,
    pub deadline: Deadline,
}

/// Outcome of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub success: bool,
    pub response: Option<String>,
    pub violations: Vec<Violation>,
    /// Synthetic fail-closed marker for unhandled internal errors
    pub internal_error: Option<String>,
    pub signals: Vec<SafetySignal>,
    pub stage_reached: Stage,
    pub execution_time_ms: u64,
    pub crisis_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic: Option<SemanticContext>,
}

/// The ordered stage runner
pub struct Pipeline {
    safety: SafetyLayer,
    constitution: ConstitutionalLayer,
    semantic: SemanticLayer,
    expression: ExpressionLayer,
    generator: Arc<dyn ResponseGenerator>,
    notifier: Arc<dyn GuardianNotifier>,
    clock: Arc<dyn Clock>,
    log: Arc<EventLog>,
    audit: Arc<AuditTrail>,
    signing_key: Ed25519SigningKey,
    instance_id: InstanceId,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance_id: InstanceId,
        signing_key: Ed25519SigningKey,
        log: Arc<EventLog>,
        audit: Arc<AuditTrail>,
        generator: Arc<dyn ResponseGenerator>,
        notifier: Arc<dyn GuardianNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            safety: SafetyLayer::new(),
            constitution: ConstitutionalLayer::new(),
            semantic: SemanticLayer::new(),
            expression: ExpressionLayer::new(),
            generator,
            notifier,
            clock,
            log,
            audit,
            signing_key,
            instance_id,
        }
    }

    /// Process one request through all stages.
    ///
    /// Malformed requests and missed deadlines surface as errors; every
    /// policy outcome (violations, crisis, shaped response) travels inside
    /// the `PipelineResult`.
    pub async fn process(&self, request: PipelineRequest) -> Result<PipelineResult> {
        let started = Instant::now();
        match self.run(&request, started).await {
            Ok(result) => Ok(result),
            Err(e @ MirrorError::Invalid { .. }) | Err(e @ MirrorError::DeadlineExceeded { .. }) => {
                Err(e)
            }
            Err(e) => {
                // Fail closed: block the response, still emit the audit record.
                tracing::error!(error = %e, "pipeline stage failed; blocking response");
                let _ = self.audit.log(
                    self.clock.now(),
                    AuditEventType::AxiomViolation,
                    "internal",
                    serde_json::json!({ "internal_error": e.to_string() }),
                );
                Ok(PipelineResult {
                    success: false,
                    response: Some(BLOCKED_FALLBACK.to_string()),
                    violations: Vec::new(),
                    internal_error: Some(e.category().to_string()),
                    signals: Vec::new(),
                    stage_reached: Stage::Admission,
                    execution_time_ms: started.elapsed().as_millis() as u64,
                    crisis_detected: false,
                    semantic: None,
                })
            }
        }
    }

    async fn run(&self, request: &PipelineRequest, started: Instant) -> Result<PipelineResult> {
        let reflection = &request.reflection;

        // Stage 1: admission
        self.enter_stage(Stage::Admission, &request.deadline)?;
        if reflection.content.trim().is_empty() {
            return Err(MirrorError::invalid("reflection content is empty"));
        }
        if reflection.content.len() > MAX_CONTENT_BYTES {
            return Err(MirrorError::invalid(format!(
                "reflection content exceeds {MAX_CONTENT_BYTES} bytes"
            )));
        }

        // Stage 2: L1 safety
        self.enter_stage(Stage::Safety, &request.deadline)?;
        let signals = self.safety.check(&reflection.content);
        for signal in &signals {
            self.audit.log(
                self.clock.now(),
                AuditEventType::SafetySignal,
                Stage::Safety.as_str(),
                serde_json::json!({
                    "level": signal.level,
                    "category": signal.category,
                    "evidence": truncate_evidence(&signal.evidence),
                    "reason": signal.reason,
                }),
            )?;
        }
        let severity = SafetyLayer::severity(&signals);
        if severity == SafetyLevel::Critical {
            return self.crisis_short_circuit(request, signals, started).await;
        }
        if severity == SafetyLevel::Alert {
            self.notify(reflection, &signals).await;
        }

        // Stage 3: L0 on the request
        self.enter_stage(Stage::RequestCheck, &request.deadline)?;
        let request_violations = self.constitution.check_request(reflection);
        if !request_violations.is_empty() {
            return Ok(self.blocked(request_violations, Stage::RequestCheck, signals, started));
        }

        // Stage 4: L2 semantic analysis
        self.enter_stage(Stage::Semantic, &request.deadline)?;
        let context = self.semantic.analyze(reflection, &request.history);
        self.audit.log(
            self.clock.now(),
            AuditEventType::SemanticAnalysisComplete,
            Stage::Semantic.as_str(),
            serde_json::json!({
                "patterns": context.patterns.len(),
                "tensions": context.tensions.len(),
            }),
        )?;

        // Stage 5: response generation
        self.enter_stage(Stage::Generation, &request.deadline)?;
        let candidate = match &request.candidate_response {
            Some(candidate) => candidate.clone(),
            None => self.generator.generate(&reflection.content, &context).await?,
        };

        // Stage 6: L0 on the response
        self.enter_stage(Stage::ResponseCheck, &request.deadline)?;
        let response_violations = self.constitution.check_response(reflection, &candidate);
        if !response_violations.is_empty() {
            self.record_violations(reflection, &response_violations)?;
            let mut result = self.blocked(response_violations, Stage::ResponseCheck, signals, started);
            result.semantic = Some(context);
            return Ok(result);
        }

        // Stage 7: L3 shaping
        self.enter_stage(Stage::Shaping, &request.deadline)?;
        let mut shaped = self
            .expression
            .shape(&candidate, &request.preferences, &context);
        if severity == SafetyLevel::Alert {
            if let Some(signal) = signals.iter().find(|s| !s.resources.is_empty()) {
                shaped.push_str("\n\nSupport is available: ");
                shaped.push_str(&signal.resources.join("; "));
            }
        }
        self.audit.log(
            self.clock.now(),
            AuditEventType::ExpressionShapingComplete,
            Stage::Shaping.as_str(),
            serde_json::json!({ "length": shaped.chars().count() }),
        )?;

        // Stage 8: L3 validation
        self.enter_stage(Stage::Validation, &request.deadline)?;
        let shaping_violations = self.expression.validate(&shaped);
        if !shaping_violations.is_empty() {
            self.record_violations(reflection, &shaping_violations)?;
            let mut result = self.blocked(shaping_violations, Stage::Validation, signals, started);
            result.semantic = Some(context);
            return Ok(result);
        }

        // Stage 9: persistence
        self.enter_stage(Stage::Persistence, &request.deadline)?;
        self.persist(reflection, &context, &signals, &shaped)?;

        // Stage 10: done
        Ok(PipelineResult {
            success: true,
            response: Some(shaped),
            violations: Vec::new(),
            internal_error: None,
            signals,
            stage_reached: Stage::Complete,
            execution_time_ms: started.elapsed().as_millis() as u64,
            crisis_detected: false,
            semantic: Some(context),
        })
    }

    fn enter_stage(&self, stage: Stage, deadline: &Deadline) -> Result<()> {
        if deadline.expired() {
            return Err(MirrorError::deadline_exceeded(format!(
                "deadline passed entering stage {stage}"
            )));
        }
        self.audit.log(
            self.clock.now(),
            AuditEventType::StageEntered,
            stage.as_str(),
            serde_json::json!({}),
        )?;
        Ok(())
    }

    async fn crisis_short_circuit(
        &self,
        request: &PipelineRequest,
        signals: Vec<SafetySignal>,
        started: Instant,
    ) -> Result<PipelineResult> {
        let reflection = &request.reflection;
        self.notify(reflection, &signals).await;

        self.append_event(
            reflection,
            EventType::ReflectionCreated,
            serde_json::json!({
                "reflection_id": reflection.id,
                "content": reflection.content,
                "mode": reflection.mode,
                "modality": reflection.modality,
            }),
        )?;
        // Exactly one safety event per crisis: the highest-severity signal.
        if let Some(top) = signals
            .iter()
            .max_by_key(|s| s.level)
        {
            self.append_event(
                reflection,
                EventType::SafetySignal,
                serde_json::json!({ "signal": top }),
            )?;
        }

        tracing::warn!(user = %reflection.user_id, "crisis detected; short-circuiting pipeline");
        Ok(PipelineResult {
            success: true,
            response: Some(CRISIS_TEMPLATE.to_string()),
            violations: Vec::new(),
            internal_error: None,
            signals,
            stage_reached: Stage::Safety,
            execution_time_ms: started.elapsed().as_millis() as u64,
            crisis_detected: true,
            semantic: None,
        })
    }

    async fn notify(&self, reflection: &Reflection, signals: &[SafetySignal]) {
        let categories: Vec<String> = signals
            .iter()
            .map(|s| s.category.as_str().to_string())
            .collect();
        let resources: Vec<String> = signals
            .iter()
            .flat_map(|s| s.resources.iter().cloned())
            .collect();
        if let Err(e) = self
            .notifier
            .notify(
                &reflection.user_id,
                SafetyLayer::severity(signals),
                &categories,
                &resources,
            )
            .await
        {
            tracing::warn!(error = %e, "guardian notification failed");
        }
    }

    fn blocked(
        &self,
        violations: Vec<Violation>,
        stage: Stage,
        signals: Vec<SafetySignal>,
        started: Instant,
    ) -> PipelineResult {
        PipelineResult {
            success: false,
            response: Some(BLOCKED_FALLBACK.to_string()),
            violations,
            internal_error: None,
            signals,
            stage_reached: stage,
            execution_time_ms: started.elapsed().as_millis() as u64,
            crisis_detected: false,
            semantic: None,
        }
    }

    fn record_violations(&self, reflection: &Reflection, violations: &[Violation]) -> Result<()> {
        for violation in violations {
            self.audit.log(
                self.clock.now(),
                AuditEventType::AxiomViolation,
                Stage::ResponseCheck.as_str(),
                serde_json::json!({
                    "axiom": violation.axiom_id,
                    "name": violation.axiom_id.name(),
                    "evidence": truncate_evidence(&violation.evidence),
                    "reason": violation.reason,
                }),
            )?;
        }
        self.append_event(
            reflection,
            EventType::ViolationDetected,
            serde_json::json!({
                "reflection_id": reflection.id,
                "violations": violations,
            }),
        )?;
        Ok(())
    }

    fn persist(
        &self,
        reflection: &Reflection,
        context: &SemanticContext,
        signals: &[SafetySignal],
        shaped: &str,
    ) -> Result<()> {
        self.append_event(
            reflection,
            EventType::ReflectionCreated,
            serde_json::json!({
                "reflection_id": reflection.id,
                "content": reflection.content,
                "mode": reflection.mode,
                "modality": reflection.modality,
            }),
        )?;
        if reflection.modality == Modality::Voice {
            self.append_event(
                reflection,
                EventType::VoiceTranscribed,
                serde_json::json!({
                    "reflection_id": reflection.id,
                    "confidence": reflection.metadata.get("asr_confidence"),
                }),
            )?;
        }
        for pattern in &context.patterns {
            self.append_event(
                reflection,
                EventType::PatternDetected,
                serde_json::json!({ "pattern": pattern }),
            )?;
        }
        for tension in &context.tensions {
            self.append_event(
                reflection,
                EventType::TensionDetected,
                serde_json::json!({ "tension": tension }),
            )?;
        }
        for signal in signals {
            self.append_event(
                reflection,
                EventType::SafetySignal,
                serde_json::json!({ "signal": signal }),
            )?;
        }
        self.append_event(
            reflection,
            EventType::ResponseShaped,
            serde_json::json!({
                "reflection_id": reflection.id,
                "response": shaped,
            }),
        )?;
        Ok(())
    }

    fn append_event(
        &self,
        reflection: &Reflection,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Result<()> {
        self.log.append_new(
            self.clock.now(),
            event_type,
            self.instance_id.clone(),
            reflection.user_id.clone(),
            payload,
            &self.signing_key,
        )?;
        Ok(())
    }
}
