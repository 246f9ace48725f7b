//! The composition root: wires configuration into stores, the policy
//! pipeline, recognition, governance, updates, workers, and gossip, and
//! exposes the control surface the outer layers call.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use mirror_core::{
    Asr, CertificateId, Clock, Deadline, Ed25519SigningKey, Event, EventId, EventType,
    GuardianNotifier, InstanceId, InvocationMode, MirrorConfig, MirrorError, Modality, ProposalId,
    Reflection, ResponseGenerator, Result, UpdateId, UserId,
};
use mirror_journal::{
    replay, AuditTrail, ChainVerification, EventLog, FileStore, LogStore, ReplayOutcome,
};
use mirror_policy::{
    ExportRecord, FeatureType, KAnonymityCheck, Pipeline, PipelineRequest, PipelineResult,
    Preferences, ResearchAnonymizer, TelemetryPolicy,
};
use mirror_recognition::{
    ConstitutionalProposal, ExecutionEffect, Guardian, GuardianCouncil, GuardianRole,
    HeartbeatState, ProposalStatus, RecognitionCertificate, RecognitionService, RevocationCause,
    TrustSet, UpdateChannel, UpdateManifest, UpdateRegistry, UpdateSection,
};
use mirror_sandbox::{SandboxExecutor, SandboxOutcome, WorkerManifest, WorkerRegistry};
use mirror_protocol::{GossipNode, MessageType, PeerTable, PeerTransport};

/// Reserved stream for governance events, which are instance-scoped rather
/// than user-scoped.
const GOVERNANCE_STREAM: &str = "governance";

/// Everything pluggable the engine consumes
pub struct EngineDeps {
    pub generator: Arc<dyn ResponseGenerator>,
    pub notifier: Arc<dyn GuardianNotifier>,
    pub clock: Arc<dyn Clock>,
    pub asr: Option<Arc<dyn Asr>>,
    /// When present, the engine gossips governance artifacts to peers
    pub transport: Option<Arc<dyn PeerTransport>>,
}

/// The assembled Mirror engine
pub struct MirrorEngine {
    config: MirrorConfig,
    instance_id: InstanceId,
    signing_key: Ed25519SigningKey,
    clock: Arc<dyn Clock>,
    asr: Option<Arc<dyn Asr>>,
    log: Arc<EventLog>,
    audit: Arc<AuditTrail>,
    pipeline: Pipeline,
    recognition: RecognitionService,
    council: GuardianCouncil,
    local_guardian: Guardian,
    updates: UpdateRegistry,
    workers: WorkerRegistry,
    sandbox: SandboxExecutor,
    gossip: Option<Arc<GossipNode>>,
}

impl MirrorEngine {
    /// Assemble an engine from configuration and collaborators.
    ///
    /// The signing key is both the instance's event-signing key and the
    /// local guardian key; additional guardian keys come from config.
    pub fn new(config: MirrorConfig, signing_key: Ed25519SigningKey, deps: EngineDeps) -> Result<Self> {
        config.validate()?;
        let instance_id = InstanceId::new(config.instance_id.clone())?;

        let mut trusted_keys = config.guardian_keys()?;
        trusted_keys.push(signing_key.verifying_key());
        let trust = Arc::new(TrustSet::with(
            trusted_keys,
            config.trusted_genesis_hashes.iter().cloned(),
        ));

        let store: Arc<dyn LogStore> = Arc::new(FileStore::new(&config.data_dir));
        let log = Arc::new(EventLog::new(store, signing_key.verifying_key()));
        let audit = Arc::new(AuditTrail::at_path(&config.audit_path)?);

        let pipeline = Pipeline::new(
            instance_id.clone(),
            signing_key.clone(),
            Arc::clone(&log),
            Arc::clone(&audit),
            Arc::clone(&deps.generator),
            Arc::clone(&deps.notifier),
            Arc::clone(&deps.clock),
        );

        let recognition = RecognitionService::new(
            signing_key.clone(),
            Arc::clone(&trust),
            Arc::clone(&deps.clock),
            config.heartbeat_stale_after(),
        );

        let local_guardian = Guardian::new(
            format!("{instance_id}-guardian"),
            &signing_key.verifying_key(),
            GuardianRole::Founder,
            deps.clock.now(),
        );
        let council = GuardianCouncil::new(
            [local_guardian.clone()],
            config.default_threshold,
            config.default_voting_period(),
            Arc::clone(&deps.clock),
        );

        let updates = UpdateRegistry::new(Arc::clone(&trust));
        let workers = WorkerRegistry::new();
        let sandbox =
            SandboxExecutor::new(config.sandbox_interpreter.clone(), config.sandbox.clone());

        let gossip = match (&deps.transport, config.trusted_genesis_hashes.first()) {
            (Some(transport), Some(genesis)) => Some(Arc::new(GossipNode::new(
                instance_id.clone(),
                genesis.clone(),
                config
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| format!("{instance_id}:7600")),
                signing_key.clone(),
                Arc::new(PeerTable::new(Arc::clone(&trust))),
                Arc::clone(transport),
                Arc::clone(&deps.clock),
            ))),
            _ => None,
        };

        Ok(Self {
            instance_id,
            signing_key,
            clock: deps.clock,
            asr: deps.asr,
            log,
            audit,
            pipeline,
            recognition,
            council,
            local_guardian,
            updates,
            workers,
            sandbox,
            gossip,
            config,
        })
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn gossip(&self) -> Option<&Arc<GossipNode>> {
        self.gossip.as_ref()
    }

    fn governance_user() -> UserId {
        // The literal is a valid identifier; construction cannot fail.
        UserId::new(GOVERNANCE_STREAM).unwrap_or_else(|_| unreachable!())
    }

    fn request_deadline(&self) -> Deadline {
        Deadline::after(self.config.request_deadline())
    }

    /// Prior reflections for a user, rebuilt from `reflection_created`
    /// events.
    fn history(&self, user_id: &UserId) -> Result<Vec<Reflection>> {
        let events = self.log.read_all(&self.instance_id, user_id)?;
        let mut history = Vec::new();
        for event in &events {
            if event.event_type != EventType::ReflectionCreated {
                continue;
            }
            let content = event.payload["content"].as_str().unwrap_or_default();
            let mode: InvocationMode =
                serde_json::from_value(event.payload["mode"].clone())
                    .unwrap_or(InvocationMode::PostAction);
            if !content.is_empty() {
                history.push(Reflection::new_text(
                    user_id.clone(),
                    content,
                    mode,
                    event.timestamp,
                ));
            }
        }
        Ok(history)
    }

    /// Submit a reflection through the full pipeline.
    pub async fn submit_reflection(
        &self,
        user_id: UserId,
        content: impl Into<String>,
        mode: InvocationMode,
        modality: Modality,
        metadata: BTreeMap<String, serde_json::Value>,
        preferences: Preferences,
        candidate_response: Option<String>,
    ) -> Result<PipelineResult> {
        let mut reflection =
            Reflection::new_text(user_id.clone(), content, mode, self.clock.now());
        reflection.modality = modality;
        reflection.metadata = metadata;

        let history = self.history(&user_id)?;
        self.pipeline
            .process(PipelineRequest {
                reflection,
                history,
                preferences,
                candidate_response,
                deadline: self.request_deadline(),
            })
            .await
    }

    /// Transcribe audio via the ASR collaborator and submit the transcript
    /// as a voice reflection.
    pub async fn submit_voice(
        &self,
        user_id: UserId,
        audio: &[u8],
        format: &str,
        language: &str,
        preferences: Preferences,
    ) -> Result<PipelineResult> {
        let asr = self
            .asr
            .as_ref()
            .ok_or_else(|| MirrorError::invalid("no ASR collaborator configured"))?;
        let transcript = asr.transcribe(audio, format, language).await?;
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "asr_confidence".to_string(),
            serde_json::json!(transcript.confidence),
        );
        self.submit_reflection(
            user_id,
            transcript.transcript,
            InvocationMode::PostAction,
            Modality::Voice,
            metadata,
            preferences,
            None,
        )
        .await
    }

    /// Read a user's event history with pagination.
    pub fn get_history(
        &self,
        user_id: &UserId,
        limit: Option<usize>,
        cursor: Option<EventId>,
    ) -> Result<Vec<Event>> {
        self.log.read(&self.instance_id, user_id, cursor, limit)
    }

    /// Verify a user's hash chain.
    pub fn verify_chain(&self, user_id: &UserId) -> Result<ChainVerification> {
        self.log.verify_chain(&self.instance_id, user_id)
    }

    /// Replay a user's stream into an identity snapshot.
    pub fn snapshot(&self, user_id: &UserId) -> Result<ReplayOutcome> {
        let events = self.log.read_all(&self.instance_id, user_id)?;
        Ok(replay(&events))
    }

    // --- Recognition surface ---

    pub fn certify(
        &self,
        user_id: UserId,
        tier: impl Into<String>,
        duration: Duration,
    ) -> Result<RecognitionCertificate> {
        self.recognition
            .certify(self.instance_id.clone(), user_id, tier, duration)
    }

    pub fn verify_cert(&self, cert_id: CertificateId) -> Option<RecognitionCertificate> {
        self.recognition.verify(cert_id)
    }

    pub fn revoke(
        &self,
        cert_id: CertificateId,
        cause: RevocationCause,
        reason: impl Into<String>,
    ) -> Result<mirror_core::RevocationId> {
        self.recognition
            .revoke(cert_id, cause, reason, self.local_guardian.name.clone())
    }

    pub fn record_heartbeat(&self) {
        self.recognition.record_heartbeat(
            self.instance_id.clone(),
            Self::governance_user(),
            serde_json::json!({}),
        );
    }

    pub fn heartbeat_state(&self) -> HeartbeatState {
        self.recognition.heartbeat_state(&self.instance_id)
    }

    pub fn recognition(&self) -> &RecognitionService {
        &self.recognition
    }

    // --- Governance surface ---

    pub fn council(&self) -> &GuardianCouncil {
        &self.council
    }

    pub fn local_guardian(&self) -> &Guardian {
        &self.local_guardian
    }

    /// Create a proposal, append the governance event, and gossip it.
    pub async fn propose(
        &self,
        proposal_type: mirror_recognition::ProposalType,
        title: impl Into<String>,
        description: impl Into<String>,
        changes: serde_json::Value,
    ) -> Result<ConstitutionalProposal> {
        let proposal = self.council.create_proposal(
            proposal_type,
            title,
            description,
            changes,
            self.local_guardian.guardian_id,
        )?;
        self.append_governance_event(
            EventType::AmendmentProposed,
            serde_json::json!({ "proposal": proposal }),
        )?;
        self.announce(
            MessageType::AmendmentProposal,
            serde_json::json!({ "proposal": proposal }),
        )
        .await;
        Ok(proposal)
    }

    /// Vote as the local guardian.
    pub async fn vote(&self, proposal_id: ProposalId, approve: bool) -> Result<ProposalStatus> {
        let timestamp = self.clock.now();
        let signature = mirror_recognition::sign_vote(
            &self.signing_key,
            proposal_id,
            self.local_guardian.guardian_id,
            approve,
            timestamp,
        )?;
        let status = self.council.vote(
            proposal_id,
            self.local_guardian.guardian_id,
            approve,
            timestamp,
            &signature,
        )?;
        self.append_governance_event(
            EventType::AmendmentVoted,
            serde_json::json!({
                "proposal_id": proposal_id,
                "guardian_id": self.local_guardian.guardian_id,
                "approve": approve,
            }),
        )?;
        self.announce(
            MessageType::VoteCast,
            serde_json::json!({
                "proposal_id": proposal_id,
                "approve": approve,
            }),
        )
        .await;
        Ok(status)
    }

    /// Execute an approved proposal.
    pub fn execute(&self, proposal_id: ProposalId) -> Result<ExecutionEffect> {
        self.council
            .execute_proposal(proposal_id, self.local_guardian.guardian_id)
    }

    // --- Update surface ---

    pub fn updates(&self) -> &UpdateRegistry {
        &self.updates
    }

    /// Register an ordinary-section update manifest and log + gossip it.
    pub async fn register_update(&self, manifest: UpdateManifest) -> Result<UpdateId> {
        let update_id = self.updates.register(manifest.clone())?;
        self.append_governance_event(
            EventType::UpdateRegistered,
            serde_json::json!({ "manifest": manifest }),
        )?;
        self.announce(
            MessageType::CommonsPublish,
            serde_json::json!({ "update": manifest }),
        )
        .await;
        Ok(update_id)
    }

    pub fn available_updates(
        &self,
        current_version: &str,
        section: UpdateSection,
        channel: UpdateChannel,
    ) -> Result<Vec<UpdateManifest>> {
        self.updates
            .available(&self.instance_id, current_version, section, channel)
    }

    pub fn mark_applied(&self, update_id: UpdateId) {
        self.updates
            .mark_applied(self.instance_id.clone(), update_id, self.clock.now());
    }

    pub fn mark_failed(&self, update_id: UpdateId, reason: impl Into<String>) {
        self.updates
            .mark_failed(self.instance_id.clone(), update_id, self.clock.now(), reason);
    }

    // --- Worker surface ---

    pub fn workers(&self) -> &WorkerRegistry {
        &self.workers
    }

    pub async fn execute_worker(
        &self,
        worker_id: mirror_core::WorkerId,
        input: &serde_json::Value,
    ) -> Result<SandboxOutcome> {
        let manifest: WorkerManifest = self
            .workers
            .get(worker_id)
            .ok_or_else(|| MirrorError::not_found(format!("worker {worker_id}")))?;
        self.sandbox.execute(&manifest, input).await
    }

    // --- Telemetry & research-export surface ---

    /// System health metrics, filtered through the telemetry whitelist so
    /// nothing about the user ever leaves as a metric.
    pub fn telemetry_snapshot(&self) -> BTreeMap<String, serde_json::Value> {
        let summary = self.audit.summary();
        let mut metrics = BTreeMap::new();
        metrics.insert(
            "constitutional_violation_count".to_string(),
            serde_json::json!(summary.get("axiom_violation").copied().unwrap_or(0)),
        );
        metrics.insert(
            "l1_tier1_blocks".to_string(),
            serde_json::json!(summary.get("safety_signal").copied().unwrap_or(0)),
        );
        metrics.insert(
            "export_count".to_string(),
            serde_json::json!(summary.values().sum::<u64>()),
        );
        TelemetryPolicy::new().filter_allowed(&metrics)
    }

    /// Validate a proposed metric batch against the telemetry whitelist.
    pub fn check_telemetry(
        &self,
        metrics: &BTreeMap<String, serde_json::Value>,
    ) -> BTreeMap<String, mirror_policy::MetricCheck> {
        TelemetryPolicy::new().validate_batch(metrics)
    }

    /// Anonymize records for research export: declared features are
    /// abstracted and the whole dataset is gated on k-anonymity (k >= 10).
    pub fn prepare_research_export(
        &self,
        records: &[ExportRecord],
        quasi_identifiers: &[&str],
        feature_types: &BTreeMap<String, FeatureType>,
    ) -> (Vec<ExportRecord>, KAnonymityCheck) {
        ResearchAnonymizer::default().prepare_research_export(
            records,
            quasi_identifiers,
            feature_types,
        )
    }

    // --- P2P surface ---

    /// Announce a fork of this instance's constitution to peers.
    pub async fn announce_fork(&self, fork_name: &str, genesis_hash: &str) -> Result<()> {
        self.append_governance_event(
            EventType::ForkAnnounced,
            serde_json::json!({ "fork_name": fork_name, "genesis_hash": genesis_hash }),
        )?;
        self.announce(
            MessageType::ForkAnnounce,
            serde_json::json!({ "fork_name": fork_name, "genesis_hash": genesis_hash }),
        )
        .await;
        Ok(())
    }

    /// Contact bootstrap peers.
    pub async fn discover_peers(&self) {
        if let Some(gossip) = &self.gossip {
            gossip.discover(&self.config.bootstrap_peers).await;
        }
    }

    async fn announce(&self, message_type: MessageType, payload: serde_json::Value) {
        if let Some(gossip) = &self.gossip {
            if let Err(e) = gossip.broadcast(message_type, payload).await {
                tracing::warn!(kind = %message_type, error = %e, "gossip announcement failed");
            }
        }
    }

    fn append_governance_event(
        &self,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Result<()> {
        self.log.append_new(
            self.clock.now(),
            event_type,
            self.instance_id.clone(),
            Self::governance_user(),
            payload,
            &self.signing_key,
        )?;
        Ok(())
    }
}
