//! End-to-end scenarios against the assembled engine

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use mirror_core::{
    AxiomId, Clock, Ed25519SigningKey, EventType, FixedClock, InvocationMode, MirrorConfig,
    Modality, NullNotifier, PatternStrength, PatternType, SafetyCategory, SafetyLevel, Timestamp,
    UserId,
};
use mirror_journal::ChainVerification;
use mirror_node::{EngineDeps, MirrorEngine};
use mirror_policy::{Preferences, TemplateGenerator};
use mirror_recognition::{ProposalStatus, RevocationCause};

struct Fixture {
    engine: MirrorEngine,
    clock: Arc<FixedClock>,
    _dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config = MirrorConfig {
        instance_id: "i1".into(),
        data_dir: dir.path().join("data"),
        audit_path: dir.path().join("data/audit.log"),
        ..Default::default()
    };
    let clock = Arc::new(FixedClock::at(Timestamp::from_unix_millis(1_000)));
    let engine = MirrorEngine::new(
        config,
        Ed25519SigningKey::generate(),
        EngineDeps {
            generator: Arc::new(TemplateGenerator::new()),
            notifier: Arc::new(NullNotifier),
            clock: Arc::clone(&clock) as Arc<dyn mirror_core::Clock>,
            asr: None,
            transport: None,
        },
    )
    .unwrap();
    Fixture {
        engine,
        clock,
        _dir: dir,
    }
}

async fn submit(
    fx: &Fixture,
    user: &str,
    content: &str,
    candidate: Option<&str>,
) -> mirror_policy::PipelineResult {
    fx.engine
        .submit_reflection(
            UserId::new(user).unwrap(),
            content,
            InvocationMode::PostAction,
            Modality::Text,
            BTreeMap::new(),
            Preferences::default(),
            candidate.map(|c| c.to_string()),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn s1_critical_crisis_short_circuit() {
    let fx = fixture();
    let result = submit(&fx, "u1", "I want to kill myself", None).await;

    assert!(result.crisis_detected);
    assert!(result.response.as_deref().unwrap().contains("988"));
    // L2 never ran.
    assert!(result.semantic.is_none());

    let user = UserId::new("u1").unwrap();
    let events = fx.engine.get_history(&user, None, None).unwrap();
    let safety: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == EventType::SafetySignal)
        .collect();
    assert_eq!(safety.len(), 1);
    let signal: mirror_core::SafetySignal =
        serde_json::from_value(safety[0].payload["signal"].clone()).unwrap();
    assert_eq!(signal.level, SafetyLevel::Critical);
    assert_eq!(signal.category, SafetyCategory::Suicidal);
}

#[tokio::test]
async fn s2_axiom_violation_blocks_response() {
    let fx = fixture();
    let result = submit(
        &fx,
        "u1",
        "Feeling stressed",
        Some("You are definitely depressed and you need Mirror every day."),
    )
    .await;

    assert!(!result.success);
    let axioms: Vec<AxiomId> = result.violations.iter().map(|v| v.axiom_id).collect();
    assert!(axioms.contains(&AxiomId::I4), "expected diagnosis violation");
    assert!(axioms.contains(&AxiomId::I6), "expected necessity violation");

    let user = UserId::new("u1").unwrap();
    let events = fx.engine.get_history(&user, None, None).unwrap();
    assert!(events
        .iter()
        .all(|e| e.event_type != EventType::ResponseShaped));
}

#[tokio::test]
async fn s3_pattern_emerges_after_threshold() {
    let fx = fixture();
    for text in [
        "Felt anxious on the commute.",
        "Anxious before the standup again.",
        "Still anxious about the review.",
    ] {
        let result = submit(&fx, "u1", text, None).await;
        assert!(result.success);
        fx.clock.advance(60_000);
    }

    let result = submit(&fx, "u1", "Woke up anxious about the week.", None).await;
    assert!(result.success);

    let semantic = result.semantic.unwrap();
    let anxiety: Vec<_> = semantic
        .patterns
        .iter()
        .filter(|p| p.name == "anxiety")
        .collect();
    assert_eq!(anxiety.len(), 1);
    let pattern = anxiety[0];
    assert_eq!(pattern.pattern_type, PatternType::Emotion);
    assert_eq!(pattern.occurrences, 4);
    assert_eq!(pattern.strength(), PatternStrength::Strong);
    assert!(pattern.confidence >= 0.8);
}

#[tokio::test]
async fn s4_chain_tamper_detection() {
    let fx = fixture();
    for n in 0..3 {
        let result = submit(&fx, "u1", &format!("Ordinary day number {n}."), None).await;
        assert!(result.success);
        fx.clock.advance(1_000);
    }

    let user = UserId::new("u1").unwrap();
    let events = fx.engine.get_history(&user, None, None).unwrap();
    assert!(events.len() >= 5);
    assert!(fx.engine.verify_chain(&user).unwrap().is_ok());

    // Mutate event #3 (index 2) in place on disk.
    let path = fx._dir.path().join("data/events/i1/u1.log");
    let raw = std::fs::read_to_string(&path).unwrap();
    let mut lines: Vec<String> = raw.lines().map(|l| l.to_string()).collect();
    let mut tampered: serde_json::Value = serde_json::from_str(&lines[2]).unwrap();
    tampered["payload"] = serde_json::json!({ "content": "rewritten history" });
    lines[2] = serde_json::to_string(&tampered).unwrap();
    std::fs::write(&path, lines.join("\n") + "\n").unwrap();

    match fx.engine.verify_chain(&user).unwrap() {
        ChainVerification::FirstBad(event_id) => {
            assert_eq!(event_id, events[2].id);
        }
        ChainVerification::Ok => panic!("tamper went undetected"),
    }
}

#[tokio::test]
async fn s5_certificate_issuance_and_revocation() {
    let fx = fixture();
    let certificate = fx
        .engine
        .certify(
            UserId::new("u1").unwrap(),
            "personal",
            Duration::from_secs(30 * 24 * 3600),
        )
        .unwrap();

    let verified = fx.engine.verify_cert(certificate.cert_id).unwrap();
    assert_eq!(verified.cert_id, certificate.cert_id);

    fx.engine
        .revoke(certificate.cert_id, RevocationCause::UserRequest, "done")
        .unwrap();
    assert!(fx.engine.verify_cert(certificate.cert_id).is_none());
    // Monotone: a second verify is also nil.
    assert!(fx.engine.verify_cert(certificate.cert_id).is_none());
}

#[tokio::test]
async fn s6_proposal_reaches_threshold() {
    // Five guardians, threshold three; exercised on the council component
    // directly since the assembled engine seeds a single local guardian.
    use mirror_recognition::{sign_vote, Guardian, GuardianCouncil, GuardianRole, ProposalType};

    let clock = Arc::new(FixedClock::at(Timestamp::from_unix_millis(0)));
    let mut keys = Vec::new();
    let mut members = Vec::new();
    for i in 0..5 {
        let key = Ed25519SigningKey::generate();
        members.push(Guardian::new(
            format!("g{i}"),
            &key.verifying_key(),
            GuardianRole::Appointed,
            Timestamp::from_unix_millis(0),
        ));
        keys.push(key);
    }
    let ids: Vec<_> = members.iter().map(|g| g.guardian_id).collect();
    let council = GuardianCouncil::new(
        members,
        3,
        Duration::from_secs(3600),
        Arc::clone(&clock) as Arc<dyn mirror_core::Clock>,
    );

    let proposal = council
        .create_proposal(
            ProposalType::ConstitutionalAmendment,
            "amendment",
            "extend axiom catalog",
            serde_json::json!({"section": "constitution"}),
            ids[0],
        )
        .unwrap();

    // Three approvals, two rejections.
    let mut status = ProposalStatus::Voting;
    for (i, approve) in [(0, true), (1, true), (3, false), (4, false), (2, true)] {
        let ts = clock.now();
        let sig = sign_vote(&keys[i], proposal.proposal_id, ids[i], approve, ts).unwrap();
        status = council
            .vote(proposal.proposal_id, ids[i], approve, ts, &sig)
            .unwrap();
    }
    assert_eq!(status, ProposalStatus::Approved);
    council.execute_proposal(proposal.proposal_id, ids[0]).unwrap();
}

#[tokio::test]
async fn governance_events_land_in_their_own_stream() {
    let fx = fixture();
    let proposal = fx
        .engine
        .propose(
            mirror_recognition::ProposalType::ProtocolChange,
            "tune gossip",
            "",
            serde_json::json!({}),
        )
        .await
        .unwrap();
    let status = fx.engine.vote(proposal.proposal_id, true).await.unwrap();
    // Single-guardian council with threshold 1: first approval settles it.
    assert_eq!(status, ProposalStatus::Approved);
    fx.engine.execute(proposal.proposal_id).unwrap();

    let governance = UserId::new("governance").unwrap();
    let events = fx.engine.get_history(&governance, None, None).unwrap();
    assert!(events
        .iter()
        .any(|e| e.event_type == EventType::AmendmentProposed));
    assert!(events
        .iter()
        .any(|e| e.event_type == EventType::AmendmentVoted));
    assert!(fx.engine.verify_chain(&governance).unwrap().is_ok());
}

#[tokio::test]
async fn voice_reflections_flow_through_asr() {
    struct CannedAsr;
    #[async_trait::async_trait]
    impl mirror_core::Asr for CannedAsr {
        async fn transcribe(
            &self,
            _audio: &[u8],
            _format: &str,
            _language: &str,
        ) -> mirror_core::Result<mirror_core::Transcript> {
            Ok(mirror_core::Transcript {
                transcript: "Long day, feeling settled now.".into(),
                confidence: 0.93,
                duration_ms: 2_400,
                word_timestamps: vec![],
            })
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let config = MirrorConfig {
        instance_id: "i1".into(),
        data_dir: dir.path().join("data"),
        audit_path: dir.path().join("data/audit.log"),
        ..Default::default()
    };
    let clock = Arc::new(FixedClock::at(Timestamp::from_unix_millis(1_000)));
    let engine = MirrorEngine::new(
        config,
        Ed25519SigningKey::generate(),
        EngineDeps {
            generator: Arc::new(TemplateGenerator::new()),
            notifier: Arc::new(NullNotifier),
            clock: clock as Arc<dyn mirror_core::Clock>,
            asr: Some(Arc::new(CannedAsr)),
            transport: None,
        },
    )
    .unwrap();

    let result = engine
        .submit_voice(
            UserId::new("u1").unwrap(),
            b"opus-bytes",
            "opus",
            "en",
            Preferences::default(),
        )
        .await
        .unwrap();
    assert!(result.success);

    let events = engine
        .get_history(&UserId::new("u1").unwrap(), None, None)
        .unwrap();
    let transcribed: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == EventType::VoiceTranscribed)
        .collect();
    assert_eq!(transcribed.len(), 1);
    assert_eq!(transcribed[0].payload["confidence"], serde_json::json!(0.93));
}

#[tokio::test]
async fn telemetry_surface_never_exports_user_metrics() {
    let fx = fixture();
    // One blocked candidate produces an axiom_violation audit record.
    let result = submit(
        &fx,
        "u1",
        "Feeling stressed",
        Some("You need Mirror to stay healthy."),
    )
    .await;
    assert!(!result.success);

    let metrics = fx.engine.telemetry_snapshot();
    assert!(metrics.contains_key("constitutional_violation_count"));
    assert!(metrics["constitutional_violation_count"].as_u64().unwrap() >= 1);
    // Every exported name sits on the whitelist.
    let checks = fx.engine.check_telemetry(&metrics);
    assert!(checks.values().all(|c| c.allowed));

    // A forbidden metric is flagged, with the reason attached.
    let mut proposed = metrics.clone();
    proposed.insert("mood_tracking".to_string(), serde_json::json!(0.8));
    let checks = fx.engine.check_telemetry(&proposed);
    assert!(!checks["mood_tracking"].allowed);
}

#[tokio::test]
async fn research_export_is_k_anonymity_gated() {
    use mirror_policy::{ExportRecord, FeatureType};

    let fx = fixture();
    let mut feature_types = std::collections::BTreeMap::new();
    feature_types.insert("age".to_string(), FeatureType::Age);

    let records: Vec<ExportRecord> = (0..12)
        .map(|i| {
            let mut record = ExportRecord::new();
            record.insert("age".to_string(), serde_json::json!(26 + (i % 9)));
            record.insert("country".to_string(), serde_json::json!("US"));
            record
        })
        .collect();

    let (exported, check) =
        fx.engine
            .prepare_research_export(&records, &["age", "country"], &feature_types);
    assert!(check.passed);
    assert_eq!(exported.len(), 12);
    assert!(exported.iter().all(|r| r["age"] == serde_json::json!("25-34")));

    // Too few records in a group: nothing leaves.
    let (exported, check) =
        fx.engine
            .prepare_research_export(&records[..3], &["age", "country"], &feature_types);
    assert!(!check.passed);
    assert!(exported.is_empty());
}

#[tokio::test]
async fn snapshot_is_reproducible_from_the_log() {
    let fx = fixture();
    for text in [
        "Anxious about work deadlines.",
        "Work again, anxious evening.",
        "Anxious, but the work shipped.",
    ] {
        assert!(submit(&fx, "u1", text, None).await.success);
        fx.clock.advance(1_000);
    }

    let user = UserId::new("u1").unwrap();
    let first = fx.engine.snapshot(&user).unwrap();
    let second = fx.engine.snapshot(&user).unwrap();
    assert_eq!(first.snapshot, second.snapshot);
    assert!(first.warnings.is_empty());
    assert_eq!(first.snapshot.dominant_emotion.as_deref(), Some("anxiety"));
}
