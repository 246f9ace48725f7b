//! Log storage backends
//!
//! A stream is the ordered event list for one (instance, user) pair. The
//! file backend keeps one JSON line per event in
//! `events/{instance}/{user}.log` and fsyncs after each append, giving
//! crash-consistent single-event atomicity. The memory backend backs tests
//! and simulation.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use mirror_core::{Event, InstanceId, MirrorError, Result, UserId};

/// Key identifying one event stream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub instance_id: InstanceId,
    pub user_id: UserId,
}

impl StreamKey {
    pub fn new(instance_id: InstanceId, user_id: UserId) -> Self {
        Self {
            instance_id,
            user_id,
        }
    }
}

/// Ordered, append-only storage for event streams
pub trait LogStore: Send + Sync {
    /// Append one event to the end of a stream.
    fn append(&self, key: &StreamKey, event: &Event) -> Result<()>;

    /// Read a full stream in append order. Unknown streams read as empty.
    fn read_all(&self, key: &StreamKey) -> Result<Vec<Event>>;

    /// Streams currently present in the store.
    fn streams(&self) -> Result<Vec<StreamKey>>;
}

/// In-memory store for tests and simulation
#[derive(Default)]
pub struct MemoryStore {
    streams: RwLock<HashMap<StreamKey, Vec<Event>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for MemoryStore {
    fn append(&self, key: &StreamKey, event: &Event) -> Result<()> {
        self.streams
            .write()
            .entry(key.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    fn read_all(&self, key: &StreamKey) -> Result<Vec<Event>> {
        Ok(self
            .streams
            .read()
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    fn streams(&self) -> Result<Vec<StreamKey>> {
        let mut keys: Vec<_> = self.streams.read().keys().cloned().collect();
        keys.sort_by(|a, b| {
            (a.instance_id.as_str(), a.user_id.as_str())
                .cmp(&(b.instance_id.as_str(), b.user_id.as_str()))
        });
        Ok(keys)
    }
}

/// File-backed store: one JSON line per event, fsync after append
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Store rooted at `{root}/events/...`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn stream_path(&self, key: &StreamKey) -> PathBuf {
        self.root
            .join("events")
            .join(key.instance_id.as_str())
            .join(format!("{}.log", key.user_id))
    }
}

impl LogStore for FileStore {
    fn append(&self, key: &StreamKey, event: &Event) -> Result<()> {
        let path = self.stream_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&line)?;
        file.sync_data()?;
        tracing::debug!(stream = %path.display(), event = %event.id, "appended event");
        Ok(())
    }

    fn read_all(&self, key: &StreamKey) -> Result<Vec<Event>> {
        let path = self.stream_path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| {
                    MirrorError::storage(format!(
                        "corrupt event line in {}: {e}",
                        path.display()
                    ))
                })
            })
            .collect()
    }

    fn streams(&self) -> Result<Vec<StreamKey>> {
        let events_dir = self.root.join("events");
        let mut keys = Vec::new();
        let instances = match fs::read_dir(&events_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };
        for instance_entry in instances {
            let instance_entry = instance_entry?;
            let instance_name = instance_entry.file_name().to_string_lossy().into_owned();
            let Ok(instance_id) = InstanceId::new(instance_name) else {
                continue;
            };
            for user_entry in fs::read_dir(instance_entry.path())? {
                let user_entry = user_entry?;
                let file_name = user_entry.file_name().to_string_lossy().into_owned();
                let Some(user_name) = file_name.strip_suffix(".log") else {
                    continue;
                };
                let Ok(user_id) = UserId::new(user_name) else {
                    continue;
                };
                keys.push(StreamKey::new(instance_id.clone(), user_id));
            }
        }
        keys.sort_by(|a, b| {
            (a.instance_id.as_str(), a.user_id.as_str())
                .cmp(&(b.instance_id.as_str(), b.user_id.as_str()))
        });
        Ok(keys)
    }
}
