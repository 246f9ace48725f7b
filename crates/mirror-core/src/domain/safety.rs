//! Safety signals produced by the L1 layer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity ranking: `critical > alert > watch > none`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    None,
    Watch,
    Alert,
    Critical,
}

impl SafetyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Watch => "watch",
            Self::Alert => "alert",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crisis category of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyCategory {
    Suicidal,
    SelfHarm,
    Abuse,
    Crisis,
}

impl SafetyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Suicidal => "suicidal",
            Self::SelfHarm => "self_harm",
            Self::Abuse => "abuse",
            Self::Crisis => "crisis",
        }
    }
}

impl fmt::Display for SafetyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured output of a safety checker. Never silently dropped: every
/// signal is recorded in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetySignal {
    pub level: SafetyLevel,
    pub category: SafetyCategory,
    /// Matched text, truncated for privacy before it reaches any store
    pub evidence: String,
    pub reason: String,
    /// Support resources attached to alert/critical responses
    pub resources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(SafetyLevel::Critical > SafetyLevel::Alert);
        assert!(SafetyLevel::Alert > SafetyLevel::Watch);
        assert!(SafetyLevel::Watch > SafetyLevel::None);
    }

    #[test]
    fn wire_names() {
        assert_eq!(
            serde_json::to_string(&SafetyCategory::SelfHarm).unwrap(),
            "\"self_harm\""
        );
        assert_eq!(
            serde_json::to_string(&SafetyLevel::Critical).unwrap(),
            "\"critical\""
        );
    }
}
