//! Constitutional violations
//!
//! A response carrying any violation is never returned to the user.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The 14 fixed behavioral invariants enforced by the constitutional layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AxiomId {
    I1,
    I2,
    I3,
    I4,
    I5,
    I6,
    I7,
    I8,
    I9,
    I10,
    I11,
    I12,
    I13,
    I14,
}

impl AxiomId {
    /// Short machine name of the axiom
    pub fn name(&self) -> &'static str {
        match self {
            Self::I1 => "certainty",
            Self::I2 => "sovereignty",
            Self::I3 => "manipulation",
            Self::I4 => "diagnosis",
            Self::I5 => "post_action",
            Self::I6 => "necessity",
            Self::I7 => "exit_freedom",
            Self::I8 => "departure_inference",
            Self::I9 => "advice",
            Self::I10 => "context_collapse",
            Self::I11 => "certainty_self",
            Self::I12 => "optimization",
            Self::I13 => "coercion",
            Self::I14 => "capture",
        }
    }

    /// Grouping used in audit summaries
    pub fn category(&self) -> &'static str {
        match self {
            Self::I1 | Self::I2 | Self::I3 | Self::I4 => "core",
            Self::I5 | Self::I6 | Self::I7 | Self::I8 => "mirror_specific",
            Self::I9 | Self::I10 | Self::I11 => "interaction",
            Self::I12 | Self::I13 | Self::I14 => "system",
        }
    }

    /// All 14 axioms in order
    pub fn all() -> [AxiomId; 14] {
        [
            Self::I1,
            Self::I2,
            Self::I3,
            Self::I4,
            Self::I5,
            Self::I6,
            Self::I7,
            Self::I8,
            Self::I9,
            Self::I10,
            Self::I11,
            Self::I12,
            Self::I13,
            Self::I14,
        ]
    }
}

impl fmt::Display for AxiomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Every constitutional violation is fatal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Fatal,
}

/// A violation raised by a checker, with the matched evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub axiom_id: AxiomId,
    pub severity: ViolationSeverity,
    /// Matched substring, truncated before storage
    pub evidence: String,
    pub reason: String,
}

impl Violation {
    /// Fatal violation with evidence and reason
    pub fn fatal(
        axiom_id: AxiomId,
        evidence: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            axiom_id,
            severity: ViolationSeverity::Fatal,
            evidence: evidence.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourteen_axioms_with_stable_names() {
        let all = AxiomId::all();
        assert_eq!(all.len(), 14);
        assert_eq!(AxiomId::I4.name(), "diagnosis");
        assert_eq!(AxiomId::I14.name(), "capture");
    }

    #[test]
    fn categories_cover_expected_set() {
        let categories: std::collections::BTreeSet<_> =
            AxiomId::all().iter().map(|a| a.category()).collect();
        let expected: std::collections::BTreeSet<_> =
            ["core", "mirror_specific", "interaction", "system"].into();
        assert_eq!(categories, expected);
    }

    #[test]
    fn violations_are_always_fatal() {
        let v = Violation::fatal(AxiomId::I6, "you need mirror", "necessity language");
        assert_eq!(v.severity, ViolationSeverity::Fatal);
        assert_eq!(v.axiom_id, AxiomId::I6);
    }
}
