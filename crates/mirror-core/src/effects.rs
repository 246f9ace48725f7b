//! Collaborator interfaces consumed by the engine
//!
//! These traits describe the external systems the core talks to. The engine
//! never assumes a vendor: a response generator output is only ever a
//! *candidate* that must still pass the constitutional and expression
//! layers, and clock access goes through `Clock` so replay stays pure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{SafetyLevel, SemanticContext};
use crate::errors::Result;
use crate::identifiers::UserId;
use crate::time::Timestamp;

/// Opaque response generator (LLM or otherwise)
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Produce a candidate response for the given prompt and context.
    async fn generate(&self, prompt: &str, context: &SemanticContext) -> Result<String>;
}

/// Transcription result for voice reflections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub transcript: String,
    /// In [0, 1]
    pub confidence: f64,
    /// Audio duration in milliseconds
    pub duration_ms: u64,
    /// (word, start_ms, end_ms) triples
    #[serde(default)]
    pub word_timestamps: Vec<(String, u64, u64)>,
}

/// Automatic speech recognition for the voice modality
#[async_trait]
pub trait Asr: Send + Sync {
    /// Transcribe raw audio bytes.
    async fn transcribe(&self, audio: &[u8], format: &str, language: &str) -> Result<Transcript>;
}

/// Guardian notification hook, invoked on alert and critical safety signals
#[async_trait]
pub trait GuardianNotifier: Send + Sync {
    /// Deliver a notification. Failure is logged, never propagated into the
    /// user-facing response path.
    async fn notify(
        &self,
        user: &UserId,
        level: SafetyLevel,
        categories: &[String],
        resources: &[String],
    ) -> Result<()>;
}

/// Wall-clock source for timestamps in event payloads
///
/// Deadlines use the monotonic clock directly (`time::Deadline`); this trait
/// only covers wall time so tests can pin it.
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> Timestamp;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now_system()
    }
}

/// Fixed clock for tests; advances only when told to
#[derive(Debug, Default)]
pub struct FixedClock {
    now: std::sync::atomic::AtomicI64,
}

impl FixedClock {
    /// Clock pinned at the given timestamp
    pub fn at(timestamp: Timestamp) -> Self {
        Self {
            now: std::sync::atomic::AtomicI64::new(timestamp.as_millis()),
        }
    }

    /// Advance the clock by `millis`
    pub fn advance(&self, millis: i64) {
        self.now
            .fetch_add(millis, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.now.load(std::sync::atomic::Ordering::SeqCst))
    }
}

/// Notifier that drops everything; used where no hook is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl GuardianNotifier for NullNotifier {
    async fn notify(
        &self,
        user: &UserId,
        level: SafetyLevel,
        _categories: &[String],
        _resources: &[String],
    ) -> Result<()> {
        tracing::debug!(user = %user, level = %level, "guardian notification (no hook configured)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::at(Timestamp::from_unix_millis(100));
        assert_eq!(clock.now().as_millis(), 100);
        clock.advance(50);
        assert_eq!(clock.now().as_millis(), 150);
    }

    #[tokio::test]
    async fn null_notifier_accepts_everything() {
        let notifier = NullNotifier;
        notifier
            .notify(
                &UserId::new("u1").unwrap(),
                SafetyLevel::Critical,
                &["suicidal".into()],
                &[],
            )
            .await
            .unwrap();
    }
}
