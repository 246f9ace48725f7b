//! Append-only chained event log
//!
//! Appends for a given stream are linearized through a per-stream lock so
//! the hash chain is well-defined without distributed consensus. Reads are
//! concurrent with writes and always observe a consistent prefix.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

use mirror_core::{
    Ed25519VerifyingKey, Event, EventId, InstanceId, MirrorError, Result, UserId, GENESIS_HASH,
};

use crate::store::{LogStore, StreamKey};

/// Result of walking a stream's hash chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerification {
    /// Every link checks out
    Ok,
    /// Identifier of the first event that fails verification
    FirstBad(EventId),
}

impl ChainVerification {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

#[derive(Default)]
struct StreamState {
    /// Hash of the last appended event; `None` until the tail is loaded
    tail: Option<String>,
    loaded: bool,
}

/// The per-user event log
///
/// Every event appended here was signed by this instance's key; `verify`
/// checks signatures against that same key.
pub struct EventLog {
    store: Arc<dyn LogStore>,
    issuer: Ed25519VerifyingKey,
    streams: RwLock<HashMap<StreamKey, Arc<Mutex<StreamState>>>>,
}

impl EventLog {
    pub fn new(store: Arc<dyn LogStore>, issuer: Ed25519VerifyingKey) -> Self {
        Self {
            store,
            issuer,
            streams: RwLock::new(HashMap::new()),
        }
    }

    fn stream_state(&self, key: &StreamKey) -> Arc<Mutex<StreamState>> {
        if let Some(state) = self.streams.read().get(key) {
            return Arc::clone(state);
        }
        let mut streams = self.streams.write();
        Arc::clone(streams.entry(key.clone()).or_default())
    }

    fn load_tail(&self, key: &StreamKey, state: &mut StreamState) -> Result<()> {
        if state.loaded {
            return Ok(());
        }
        let events = self.store.read_all(key)?;
        state.tail = events.last().map(|e| e.event_hash.clone());
        state.loaded = true;
        Ok(())
    }

    /// Append an event, enforcing chain linkage and signature validity.
    ///
    /// Returns the appended event's hash. Fails with `ChainMismatch` when
    /// `previous_hash` does not equal the current tail, `GenesisViolation`
    /// when a non-genesis `previous_hash` arrives on an empty stream, and
    /// `SignatureInvalid` when hash or signature do not verify.
    pub fn append(&self, event: &Event) -> Result<String> {
        let key = StreamKey::new(event.instance_id.clone(), event.user_id.clone());
        let state = self.stream_state(&key);
        let mut state = state.lock();
        self.load_tail(&key, &mut state)?;

        match &state.tail {
            None => {
                if event.previous_hash != GENESIS_HASH {
                    return Err(MirrorError::genesis_violation(format!(
                        "stream {}/{} is empty but previous_hash is {}",
                        key.instance_id, key.user_id, event.previous_hash
                    )));
                }
            }
            Some(tail) => {
                if &event.previous_hash != tail {
                    return Err(MirrorError::chain_mismatch(format!(
                        "stream {}/{} tail is {}, got previous_hash {}",
                        key.instance_id, key.user_id, tail, event.previous_hash
                    )));
                }
            }
        }

        event.verify(&self.issuer)?;
        self.store.append(&key, event)?;
        state.tail = Some(event.event_hash.clone());
        tracing::debug!(
            instance = %key.instance_id,
            user = %key.user_id,
            event_type = %event.event_type,
            hash = %event.event_hash,
            "event appended"
        );
        Ok(event.event_hash.clone())
    }

    /// Build, sign, and append a new event at the current tail, all under
    /// the stream lock so concurrent writers cannot race the tail read.
    #[allow(clippy::too_many_arguments)]
    pub fn append_new(
        &self,
        timestamp: mirror_core::Timestamp,
        event_type: mirror_core::EventType,
        instance_id: InstanceId,
        user_id: UserId,
        payload: serde_json::Value,
        signing_key: &mirror_core::Ed25519SigningKey,
    ) -> Result<Event> {
        let key = StreamKey::new(instance_id.clone(), user_id.clone());
        let state = self.stream_state(&key);
        let mut state = state.lock();
        self.load_tail(&key, &mut state)?;
        let previous_hash = state
            .tail
            .clone()
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let event = Event::create(
            timestamp,
            event_type,
            instance_id,
            user_id,
            payload,
            previous_hash,
            signing_key,
        )?;
        event.verify(&self.issuer)?;
        self.store.append(&key, &event)?;
        state.tail = Some(event.event_hash.clone());
        tracing::debug!(
            instance = %key.instance_id,
            user = %key.user_id,
            event_type = %event.event_type,
            hash = %event.event_hash,
            "event appended"
        );
        Ok(event)
    }

    /// Hash of the last event in a stream, if any.
    pub fn tail_hash(&self, instance_id: &InstanceId, user_id: &UserId) -> Result<Option<String>> {
        let key = StreamKey::new(instance_id.clone(), user_id.clone());
        let state = self.stream_state(&key);
        let mut state = state.lock();
        self.load_tail(&key, &mut state)?;
        Ok(state.tail.clone())
    }

    /// Read a full stream in append order.
    pub fn read_all(&self, instance_id: &InstanceId, user_id: &UserId) -> Result<Vec<Event>> {
        self.store
            .read_all(&StreamKey::new(instance_id.clone(), user_id.clone()))
    }

    /// Read events after the given id (exclusive), up to `limit`.
    ///
    /// With `after_id = None` the read starts at the beginning of the stream.
    pub fn read(
        &self,
        instance_id: &InstanceId,
        user_id: &UserId,
        after_id: Option<EventId>,
        limit: Option<usize>,
    ) -> Result<Vec<Event>> {
        let events = self.read_all(instance_id, user_id)?;
        let start = match after_id {
            None => 0,
            Some(id) => match events.iter().position(|e| e.id == id) {
                Some(pos) => pos + 1,
                None => {
                    return Err(MirrorError::not_found(format!(
                        "event {id} not present in stream {instance_id}/{user_id}"
                    )))
                }
            },
        };
        let mut slice: Vec<Event> = events.into_iter().skip(start).collect();
        if let Some(limit) = limit {
            slice.truncate(limit);
        }
        Ok(slice)
    }

    /// Walk a stream in order, recomputing each hash, checking linkage and
    /// signatures. Returns the id of the first bad event, if any.
    pub fn verify_chain(
        &self,
        instance_id: &InstanceId,
        user_id: &UserId,
    ) -> Result<ChainVerification> {
        let events = self.read_all(instance_id, user_id)?;
        Ok(verify_events(&events, &self.issuer))
    }
}

/// Chain verification over an in-memory event slice.
///
/// Shared by the log and by peers verifying gossiped streams.
pub fn verify_events(events: &[Event], issuer: &Ed25519VerifyingKey) -> ChainVerification {
    let mut expected_previous = GENESIS_HASH.to_string();
    for event in events {
        if event.previous_hash != expected_previous {
            tracing::warn!(event = %event.id, "chain linkage broken");
            return ChainVerification::FirstBad(event.id);
        }
        let recomputed = match event.recompute_hash() {
            Ok(hash) => hash,
            Err(_) => return ChainVerification::FirstBad(event.id),
        };
        if recomputed != event.event_hash {
            tracing::warn!(event = %event.id, "stored hash does not match recomputation");
            return ChainVerification::FirstBad(event.id);
        }
        if event.verify(issuer).is_err() {
            tracing::warn!(event = %event.id, "event signature failed verification");
            return ChainVerification::FirstBad(event.id);
        }
        expected_previous = event.event_hash.clone();
    }
    ChainVerification::Ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use mirror_core::{Ed25519SigningKey, EventType, Timestamp};

    struct Fixture {
        log: EventLog,
        signing_key: Ed25519SigningKey,
        instance_id: InstanceId,
        user_id: UserId,
    }

    impl Fixture {
        fn new() -> Self {
            let signing_key = Ed25519SigningKey::generate();
            let log = EventLog::new(Arc::new(MemoryStore::new()), signing_key.verifying_key());
            Self {
                log,
                signing_key,
                instance_id: InstanceId::new("i1").unwrap(),
                user_id: UserId::new("u1").unwrap(),
            }
        }

        fn append_next(&self, n: i64) -> Event {
            let previous = self
                .log
                .tail_hash(&self.instance_id, &self.user_id)
                .unwrap()
                .unwrap_or_else(|| GENESIS_HASH.to_string());
            let event = Event::create(
                Timestamp::from_unix_millis(n),
                EventType::ReflectionCreated,
                self.instance_id.clone(),
                self.user_id.clone(),
                serde_json::json!({ "n": n }),
                previous,
                &self.signing_key,
            )
            .unwrap();
            self.log.append(&event).unwrap();
            event
        }
    }

    #[test]
    fn append_and_verify_chain() {
        let fx = Fixture::new();
        for n in 0..5 {
            fx.append_next(n);
        }
        let verification = fx.log.verify_chain(&fx.instance_id, &fx.user_id).unwrap();
        assert!(verification.is_ok());
        assert_eq!(fx.log.read_all(&fx.instance_id, &fx.user_id).unwrap().len(), 5);
    }

    #[test]
    fn genesis_violation_on_empty_stream() {
        let fx = Fixture::new();
        let event = Event::create(
            Timestamp::from_unix_millis(0),
            EventType::ReflectionCreated,
            fx.instance_id.clone(),
            fx.user_id.clone(),
            serde_json::json!({}),
            "1".repeat(64),
            &fx.signing_key,
        )
        .unwrap();
        assert!(matches!(
            fx.log.append(&event),
            Err(MirrorError::GenesisViolation { .. })
        ));
    }

    #[test]
    fn chain_mismatch_on_stale_tail() {
        let fx = Fixture::new();
        fx.append_next(0);
        let event = Event::create(
            Timestamp::from_unix_millis(1),
            EventType::ReflectionCreated,
            fx.instance_id.clone(),
            fx.user_id.clone(),
            serde_json::json!({}),
            GENESIS_HASH.to_string(),
            &fx.signing_key,
        )
        .unwrap();
        assert!(matches!(
            fx.log.append(&event),
            Err(MirrorError::ChainMismatch { .. })
        ));
    }

    #[test]
    fn foreign_signature_rejected() {
        let fx = Fixture::new();
        let other = Ed25519SigningKey::generate();
        let event = Event::create(
            Timestamp::from_unix_millis(0),
            EventType::ReflectionCreated,
            fx.instance_id.clone(),
            fx.user_id.clone(),
            serde_json::json!({}),
            GENESIS_HASH.to_string(),
            &other,
        )
        .unwrap();
        assert!(matches!(
            fx.log.append(&event),
            Err(MirrorError::SignatureInvalid { .. })
        ));
    }

    #[test]
    fn read_after_id_with_limit() {
        let fx = Fixture::new();
        let events: Vec<Event> = (0..5).map(|n| fx.append_next(n)).collect();
        let page = fx
            .log
            .read(&fx.instance_id, &fx.user_id, Some(events[1].id), Some(2))
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, events[2].id);
        assert_eq!(page[1].id, events[3].id);
    }

    #[test]
    fn tamper_with_middle_event_reported() {
        let fx = Fixture::new();
        let events: Vec<Event> = (0..5).map(|n| fx.append_next(n)).collect();

        let mut tampered = fx.log.read_all(&fx.instance_id, &fx.user_id).unwrap();
        tampered[2].payload = serde_json::json!({ "n": 999 });
        let verification = verify_events(&tampered, &fx.signing_key.verifying_key());
        assert_eq!(verification, ChainVerification::FirstBad(events[2].id));
    }

    #[test]
    fn append_new_links_automatically() {
        let fx = Fixture::new();
        for n in 0..3 {
            fx.log
                .append_new(
                    Timestamp::from_unix_millis(n),
                    EventType::ReflectionCreated,
                    fx.instance_id.clone(),
                    fx.user_id.clone(),
                    serde_json::json!({ "n": n }),
                    &fx.signing_key,
                )
                .unwrap();
        }
        assert!(fx.log.verify_chain(&fx.instance_id, &fx.user_id).unwrap().is_ok());
    }

    #[test]
    fn different_streams_are_independent() {
        let fx = Fixture::new();
        fx.append_next(0);

        let other_user = UserId::new("u2").unwrap();
        let event = Event::create(
            Timestamp::from_unix_millis(0),
            EventType::ReflectionCreated,
            fx.instance_id.clone(),
            other_user.clone(),
            serde_json::json!({}),
            GENESIS_HASH.to_string(),
            &fx.signing_key,
        )
        .unwrap();
        fx.log.append(&event).unwrap();
        assert_eq!(fx.log.read_all(&fx.instance_id, &other_user).unwrap().len(), 1);
    }
}
