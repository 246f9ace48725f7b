//! Time semantics for the Mirror engine
//!
//! Wall-clock timestamps appear only in event payloads and signed records;
//! deadlines are tracked against the monotonic clock so that request
//! cancellation is immune to wall-clock adjustment. Replay never touches
//! either: it consumes the timestamps already recorded in events.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Construct from milliseconds since the Unix epoch
    pub fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the Unix epoch
    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Read the system wall clock
    pub fn now_system() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Timestamp advanced by the given duration (saturating)
    pub fn saturating_add(&self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_millis() as i64))
    }

    /// Elapsed milliseconds from `earlier` to `self` (zero if earlier is later)
    pub fn millis_since(&self, earlier: Timestamp) -> i64 {
        (self.0 - earlier.0).max(0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Request deadline against the monotonic clock
///
/// Pipeline stages check this at entry and exit; a missed deadline fails the
/// request closed with no partial response.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    /// Deadline `duration` from now
    pub fn after(duration: Duration) -> Self {
        Self {
            expires_at: Instant::now() + duration,
        }
    }

    /// Deadline that never expires (for tests and offline tooling)
    pub fn unbounded() -> Self {
        // ~100 years out; Instant has no "infinite" value.
        Self {
            expires_at: Instant::now() + Duration::from_secs(3_153_600_000),
        }
    }

    /// Whether the deadline has passed
    pub fn expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Time remaining before expiry (zero once expired)
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}
