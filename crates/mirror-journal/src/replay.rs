//! Deterministic replay: events in, identity snapshot out
//!
//! A pure left fold with no clock or network access. The same events in the
//! same order produce a byte-identical snapshot on every platform (all
//! aggregation is over ordered maps, and output vectors are sorted before
//! the snapshot is returned).

use std::collections::BTreeMap;

use mirror_core::{Event, EventId, EventType, IdentitySnapshot, Pattern, PatternType, Tension};

/// Non-fatal observations made during replay
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayWarning {
    /// Event type not known to this build; state unchanged
    UnknownEventSeen { event_id: EventId, event_type: String },
    /// Known event type whose payload did not parse; state unchanged
    MalformedPayload { event_id: EventId, detail: String },
}

/// Result of replaying one stream
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutcome {
    pub snapshot: IdentitySnapshot,
    pub warnings: Vec<ReplayWarning>,
}

#[derive(Default)]
struct FoldState {
    patterns: BTreeMap<(String, String), Pattern>,
    tensions: BTreeMap<(String, String), Tension>,
    event_count: u64,
    hash_concat: String,
}

impl FoldState {
    fn merge_pattern(&mut self, pattern: Pattern) {
        let key = (
            pattern.pattern_type.as_str().to_string(),
            pattern.name.clone(),
        );
        match self.patterns.get_mut(&key) {
            Some(existing) => {
                // Later events carry fresher aggregates; adopt them while
                // preserving the earliest first_seen.
                if pattern.occurrences >= existing.occurrences {
                    let first_seen = existing.first_seen.min(pattern.first_seen);
                    *existing = pattern;
                    existing.first_seen = first_seen;
                } else if pattern.last_seen > existing.last_seen {
                    existing.last_seen = pattern.last_seen;
                }
            }
            None => {
                self.patterns.insert(key, pattern);
            }
        }
    }

    fn merge_tension(&mut self, tension: Tension) {
        let key = (
            tension.tension_type.as_str().to_string(),
            tension.description.clone(),
        );
        match self.tensions.get_mut(&key) {
            Some(existing) => {
                if tension.severity >= existing.severity {
                    *existing = tension;
                }
            }
            None => {
                self.tensions.insert(key, tension);
            }
        }
    }
}

/// Replay a stream of events into an identity snapshot.
pub fn replay(events: &[Event]) -> ReplayOutcome {
    let mut state = FoldState::default();
    let mut warnings = Vec::new();

    for event in events {
        state.event_count += 1;
        state.hash_concat.push_str(&event.event_hash);

        match &event.event_type {
            EventType::PatternDetected => {
                match serde_json::from_value::<Pattern>(event.payload["pattern"].clone()) {
                    Ok(pattern) => state.merge_pattern(pattern),
                    Err(e) => warnings.push(ReplayWarning::MalformedPayload {
                        event_id: event.id,
                        detail: format!("pattern_detected: {e}"),
                    }),
                }
            }
            EventType::TensionDetected => {
                match serde_json::from_value::<Tension>(event.payload["tension"].clone()) {
                    Ok(tension) => state.merge_tension(tension),
                    Err(e) => warnings.push(ReplayWarning::MalformedPayload {
                        event_id: event.id,
                        detail: format!("tension_detected: {e}"),
                    }),
                }
            }
            // These event types record history but carry no snapshot state.
            EventType::ReflectionCreated
            | EventType::VoiceTranscribed
            | EventType::SafetySignal
            | EventType::ViolationDetected
            | EventType::ResponseShaped
            | EventType::AmendmentProposed
            | EventType::AmendmentVoted
            | EventType::ForkAnnounced
            | EventType::UpdateRegistered => {}
            EventType::Unknown(name) => {
                warnings.push(ReplayWarning::UnknownEventSeen {
                    event_id: event.id,
                    event_type: name.clone(),
                });
            }
        }
    }

    let patterns: Vec<Pattern> = state.patterns.into_values().collect();
    let tensions: Vec<Tension> = state.tensions.into_values().collect();

    let dominant_emotion = patterns
        .iter()
        .filter(|p| p.pattern_type == PatternType::Emotion)
        .max_by(|a, b| {
            a.occurrences
                .cmp(&b.occurrences)
                .then_with(|| b.name.cmp(&a.name))
        })
        .map(|p| p.name.clone());

    let mut themed: Vec<&Pattern> = patterns
        .iter()
        .filter(|p| p.pattern_type == PatternType::Topic && p.occurrences >= 2)
        .collect();
    themed.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| a.name.cmp(&b.name))
    });
    let recurring_themes = themed.into_iter().map(|p| p.name.clone()).collect();

    let snapshot = IdentitySnapshot {
        patterns,
        tensions,
        beliefs: Vec::new(),
        recurring_themes,
        dominant_emotion,
        event_count: state.event_count,
        source_merkle_root: mirror_core::sha256_hex(state.hash_concat.as_bytes()),
    };

    ReplayOutcome { snapshot, warnings }
}

/// The dominant tension, by severity then stable ordering.
pub fn dominant_tension(snapshot: &IdentitySnapshot) -> Option<&Tension> {
    snapshot.tensions.iter().max_by(|a, b| {
        a.severity
            .partial_cmp(&b.severity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.description.cmp(&a.description))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::{
        canonical, Ed25519SigningKey, InstanceId, PatternStrength, TensionType, Timestamp, UserId,
        GENESIS_HASH,
    };

    struct Builder {
        signing_key: Ed25519SigningKey,
        previous: String,
        events: Vec<Event>,
        n: i64,
    }

    impl Builder {
        fn new() -> Self {
            Self {
                signing_key: Ed25519SigningKey::generate(),
                previous: GENESIS_HASH.to_string(),
                events: Vec::new(),
                n: 0,
            }
        }

        fn push(&mut self, event_type: EventType, payload: serde_json::Value) {
            let event = Event::create(
                Timestamp::from_unix_millis(self.n),
                event_type,
                InstanceId::new("i1").unwrap(),
                UserId::new("u1").unwrap(),
                payload,
                self.previous.clone(),
                &self.signing_key,
            )
            .unwrap();
            self.previous = event.event_hash.clone();
            self.n += 1;
            self.events.push(event);
        }

        fn pattern(name: &str, occurrences: u32, pattern_type: PatternType) -> serde_json::Value {
            serde_json::json!({
                "pattern": Pattern {
                    pattern_type,
                    name: name.into(),
                    occurrences,
                    first_seen: Timestamp::from_unix_millis(0),
                    last_seen: Timestamp::from_unix_millis(occurrences as i64),
                    confidence: (0.2 * occurrences as f64).min(1.0),
                    contexts: vec![],
                }
            })
        }
    }

    #[test]
    fn fold_aggregates_patterns_and_dominant_emotion() {
        let mut b = Builder::new();
        b.push(EventType::ReflectionCreated, serde_json::json!({"content": "x"}));
        b.push(
            EventType::PatternDetected,
            Builder::pattern("anxiety", 2, PatternType::Emotion),
        );
        b.push(
            EventType::PatternDetected,
            Builder::pattern("anxiety", 4, PatternType::Emotion),
        );
        b.push(
            EventType::PatternDetected,
            Builder::pattern("joy", 2, PatternType::Emotion),
        );
        b.push(
            EventType::PatternDetected,
            Builder::pattern("work", 3, PatternType::Topic),
        );

        let outcome = replay(&b.events);
        assert!(outcome.warnings.is_empty());
        let snapshot = &outcome.snapshot;
        assert_eq!(snapshot.event_count, 5);
        assert_eq!(snapshot.dominant_emotion.as_deref(), Some("anxiety"));
        assert_eq!(snapshot.recurring_themes, vec!["work".to_string()]);

        let anxiety = snapshot.pattern("anxiety").unwrap();
        assert_eq!(anxiety.occurrences, 4);
        assert_eq!(anxiety.strength(), PatternStrength::Strong);
        // first_seen survives the aggregate refresh
        assert_eq!(anxiety.first_seen, Timestamp::from_unix_millis(0));
    }

    #[test]
    fn tension_keeps_highest_severity() {
        let mut b = Builder::new();
        let mk = |severity: f64| {
            serde_json::json!({
                "tension": Tension {
                    tension_type: TensionType::Emotional,
                    description: "anxiety vs calm".into(),
                    severity,
                    evidence: vec![],
                }
            })
        };
        b.push(EventType::TensionDetected, mk(0.4));
        b.push(EventType::TensionDetected, mk(0.7));
        b.push(EventType::TensionDetected, mk(0.5));

        let outcome = replay(&b.events);
        assert_eq!(outcome.snapshot.tensions.len(), 1);
        assert_eq!(outcome.snapshot.tensions[0].severity, 0.7);
        assert_eq!(
            dominant_tension(&outcome.snapshot).unwrap().description,
            "anxiety vs calm"
        );
    }

    #[test]
    fn unknown_events_warn_but_do_not_fail() {
        let mut b = Builder::new();
        b.push(
            EventType::Unknown("belief_revised".into()),
            serde_json::json!({"belief": "x"}),
        );
        let outcome = replay(&b.events);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(matches!(
            &outcome.warnings[0],
            ReplayWarning::UnknownEventSeen { event_type, .. } if event_type == "belief_revised"
        ));
        assert_eq!(outcome.snapshot.event_count, 1);
    }

    #[test]
    fn malformed_payload_warns() {
        let mut b = Builder::new();
        b.push(EventType::PatternDetected, serde_json::json!({"pattern": 42}));
        let outcome = replay(&b.events);
        assert!(matches!(
            &outcome.warnings[0],
            ReplayWarning::MalformedPayload { .. }
        ));
        assert!(outcome.snapshot.patterns.is_empty());
    }

    #[test]
    fn replay_is_deterministic_to_the_byte() {
        let mut b = Builder::new();
        b.push(
            EventType::PatternDetected,
            Builder::pattern("stress", 3, PatternType::Emotion),
        );
        b.push(
            EventType::PatternDetected,
            Builder::pattern("health", 2, PatternType::Topic),
        );

        let first = replay(&b.events);
        let second = replay(&b.events);
        assert_eq!(
            canonical::to_canonical_json(&first.snapshot).unwrap(),
            canonical::to_canonical_json(&second.snapshot).unwrap()
        );
        assert_eq!(first.snapshot.source_merkle_root.len(), 64);
    }

    #[test]
    fn merkle_root_tracks_event_hashes() {
        let mut a = Builder::new();
        a.push(EventType::ReflectionCreated, serde_json::json!({"content": "x"}));
        let mut b = Builder::new();
        b.push(EventType::ReflectionCreated, serde_json::json!({"content": "y"}));

        let root_a = replay(&a.events).snapshot.source_merkle_root;
        let root_b = replay(&b.events).snapshot.source_merkle_root;
        assert_ne!(root_a, root_b);
    }
}
