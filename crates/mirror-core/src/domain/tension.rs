//! Detected tensions between what a user says, does, and used to say

use serde::{Deserialize, Serialize};
use std::fmt;

/// The flavor of contradiction a tension captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensionType {
    /// Opposing emotions co-occurring (anxiety alongside calm)
    Emotional,
    /// Stated intention without a matching action pattern
    Behavioral,
    /// Conflicting values
    Value,
    /// Past self versus present self ("used to ... now")
    Temporal,
    /// The user states the contradiction outright ("but", "however")
    ExplicitContradiction,
}

impl TensionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emotional => "emotional",
            Self::Behavioral => "behavioral",
            Self::Value => "value",
            Self::Temporal => "temporal",
            Self::ExplicitContradiction => "explicit_contradiction",
        }
    }
}

impl fmt::Display for TensionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected tension with supporting evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tension {
    pub tension_type: TensionType,
    pub description: String,
    /// In [0, 1]
    pub severity: f64,
    pub evidence: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names() {
        assert_eq!(
            serde_json::to_string(&TensionType::ExplicitContradiction).unwrap(),
            "\"explicit_contradiction\""
        );
    }
}
