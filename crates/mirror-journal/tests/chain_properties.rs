//! Property tests for hash-chain integrity and replay determinism

use std::sync::Arc;

use proptest::prelude::*;

use mirror_core::{
    canonical, Ed25519SigningKey, Event, EventType, InstanceId, Timestamp, UserId, GENESIS_HASH,
};
use mirror_journal::{replay, verify_events, ChainVerification, EventLog, MemoryStore};

fn build_chain(signing_key: &Ed25519SigningKey, contents: &[String]) -> Vec<Event> {
    let instance_id = InstanceId::new("prop-i").unwrap();
    let user_id = UserId::new("prop-u").unwrap();
    let mut previous = GENESIS_HASH.to_string();
    let mut events = Vec::with_capacity(contents.len());
    for (n, content) in contents.iter().enumerate() {
        let event = Event::create(
            Timestamp::from_unix_millis(n as i64),
            EventType::ReflectionCreated,
            instance_id.clone(),
            user_id.clone(),
            serde_json::json!({ "content": content }),
            previous,
            signing_key,
        )
        .unwrap();
        previous = event.event_hash.clone();
        events.push(event);
    }
    events
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn valid_appends_always_verify(contents in prop::collection::vec(".{0,40}", 1..12)) {
        let signing_key = Ed25519SigningKey::generate();
        let events = build_chain(&signing_key, &contents);

        let log = EventLog::new(Arc::new(MemoryStore::new()), signing_key.verifying_key());
        for event in &events {
            log.append(event).unwrap();
        }
        let verification = log
            .verify_chain(&InstanceId::new("prop-i").unwrap(), &UserId::new("prop-u").unwrap())
            .unwrap();
        prop_assert!(verification.is_ok());
    }

    #[test]
    fn mutating_any_event_is_detected(
        contents in prop::collection::vec(".{0,40}", 2..10),
        victim_seed in any::<prop::sample::Index>(),
        field in 0usize..4,
    ) {
        let signing_key = Ed25519SigningKey::generate();
        let mut events = build_chain(&signing_key, &contents);
        let victim = victim_seed.index(events.len());
        prop_assume!(contents[victim] != "tampered");

        match field {
            0 => events[victim].payload = serde_json::json!({ "content": "tampered" }),
            1 => events[victim].previous_hash = "f".repeat(64),
            2 => events[victim].event_hash = "f".repeat(64),
            _ => events[victim].timestamp = Timestamp::from_unix_millis(9_999_999),
        }

        let verification = verify_events(&events, &signing_key.verifying_key());
        match verification {
            ChainVerification::Ok => prop_assert!(false, "tamper went undetected"),
            ChainVerification::FirstBad(id) => {
                // The first reported event is the victim itself or, when the
                // mutation only breaks the next link, its successor.
                let bad_pos = events.iter().position(|e| e.id == id).unwrap();
                prop_assert!(bad_pos >= victim);
                prop_assert!(bad_pos <= victim + 1);
            }
        }
    }

    #[test]
    fn replay_is_deterministic(contents in prop::collection::vec(".{0,40}", 0..10)) {
        let signing_key = Ed25519SigningKey::generate();
        let events = build_chain(&signing_key, &contents);

        let first = replay(&events);
        let second = replay(&events);
        prop_assert_eq!(
            canonical::to_canonical_json(&first.snapshot).unwrap(),
            canonical::to_canonical_json(&second.snapshot).unwrap()
        );
        prop_assert_eq!(first.snapshot.event_count, events.len() as u64);
    }
}
