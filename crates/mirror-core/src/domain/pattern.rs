//! Detected patterns in a user's reflections

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::time::Timestamp;

/// What kind of signal the pattern tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Emotion,
    Topic,
    Behavior,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emotion => "emotion",
            Self::Topic => "topic",
            Self::Behavior => "behavior",
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strength bands derived from occurrence counts (thresholds 1 / 2 / 3 / 5+)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStrength {
    Weak,
    Emerging,
    Moderate,
    Strong,
}

impl PatternStrength {
    /// Band for a given occurrence count
    pub fn from_occurrences(occurrences: u32) -> Self {
        match occurrences {
            0..=1 => Self::Weak,
            2 => Self::Emerging,
            3 => Self::Moderate,
            _ => Self::Strong,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weak => "weak",
            Self::Emerging => "emerging",
            Self::Moderate => "moderate",
            Self::Strong => "strong",
        }
    }
}

impl fmt::Display for PatternStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recurring signal across reflections. Exists once `occurrences >= 2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern_type: PatternType,
    pub name: String,
    pub occurrences: u32,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    /// In [0, 1]; 0.2 per occurrence, capped at 1.0
    pub confidence: f64,
    /// Sample utterances (first 3 matches, truncated to 80 chars)
    pub contexts: Vec<String>,
}

impl Pattern {
    /// Strength band for the current occurrence count
    pub fn strength(&self) -> PatternStrength {
        PatternStrength::from_occurrences(self.occurrences)
    }
}
