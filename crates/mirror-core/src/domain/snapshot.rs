//! Derived identity views
//!
//! Snapshots are recomputed from events and never the source of truth; a
//! cached snapshot must be byte-reproducible by replay.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::pattern::Pattern;
use super::tension::Tension;

/// Identity state derived by replaying a user's event stream
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub patterns: Vec<Pattern>,
    pub tensions: Vec<Tension>,
    pub beliefs: Vec<String>,
    pub recurring_themes: Vec<String>,
    pub dominant_emotion: Option<String>,
    /// Number of events folded into this snapshot
    pub event_count: u64,
    /// Hex SHA-256 over the concatenated event hashes of the source stream
    pub source_merkle_root: String,
}

impl IdentitySnapshot {
    /// Look up a pattern by name
    pub fn pattern(&self, name: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.name == name)
    }
}

/// Output of the semantic layer for one pipeline run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SemanticContext {
    pub patterns: Vec<Pattern>,
    pub tensions: Vec<Tension>,
    pub recurring_themes: Vec<String>,
    /// Dominant emotion pattern across current + history, if any
    pub emotional_baseline: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl SemanticContext {
    /// Patterns at strong strength
    pub fn strong_patterns(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns
            .iter()
            .filter(|p| p.strength() == super::pattern::PatternStrength::Strong)
    }

    /// Whether a strong pattern with the given name is present
    pub fn has_strong_pattern(&self, name: &str) -> bool {
        self.strong_patterns().any(|p| p.name == name)
    }
}
