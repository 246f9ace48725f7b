//! L1 safety layer: crisis-signal detection
//!
//! Per-category checkers scan the utterance with word-boundary, case-
//! insensitive patterns. Detection is deterministic; matching whole tokens
//! or multi-word phrases only, never embedded substrings, so "skill myself
//! in Rust" never trips the "kill myself" pattern.

use once_cell::sync::Lazy;
use regex::Regex;

use mirror_core::{SafetyCategory, SafetyLevel, SafetySignal};
use mirror_journal::truncate_evidence;

/// Support resources attached to alert and critical responses
pub const CRISIS_RESOURCES: &[&str] = &[
    "Call or text 988 (Suicide & Crisis Lifeline)",
    "Text HOME to 741741 (Crisis Text Line)",
    "If you are in immediate danger, call 911",
];

/// The documented critical-response template. Always contains "988".
pub const CRISIS_TEMPLATE: &str = "What you're describing sounds serious, and you deserve \
support right now. You can call or text 988 (Suicide & Crisis Lifeline) at any time, or text \
HOME to 741741 to reach the Crisis Text Line. If you are in immediate danger, please call 911. \
You don't have to carry this alone.";

struct Catalog {
    category: SafetyCategory,
    level: SafetyLevel,
    reason: &'static str,
    patterns: &'static Lazy<Vec<Regex>>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| {
            // Phrase gaps tolerate any whitespace run, so "kill  myself"
            // across a line break still matches.
            let gap_tolerant = p.replace(' ', r"\s+");
            Regex::new(&format!(r"(?i)\b(?:{gap_tolerant})\b")).unwrap_or_else(|e| {
                // Catalog entries are static; a bad entry is a programming
                // error caught by the catalog tests below.
                panic!("invalid safety pattern {p:?}: {e}")
            })
        })
        .collect()
}

static SUICIDAL: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "kill myself",
        "kill me",
        "end it all",
        "end my life",
        "suicide",
        "suicidal",
        "don't want to be alive",
        "can't go on",
        "no reason to live",
        "better off dead",
    ])
});

static SELF_HARM: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&["hurt myself", "cut myself", "cutting myself", "overdose"])
});

static ABUSE: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "hits me",
        "hurts me",
        "threatens me",
        "afraid to go home",
        "afraid of him",
        "afraid of her",
    ])
});

static HOPELESSNESS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "no point",
        "no hope",
        "nothing matters",
        "give up",
        "can't do this anymore",
        "worthless",
        "can't escape",
    ])
});

static ISOLATION: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "no one cares",
        "all alone",
        "completely alone",
        "nobody understands",
        "push everyone away",
    ])
});

static DISTRESS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "can't cope",
        "can't handle",
        "falling apart",
        "losing control",
        "numb the pain",
    ])
});

static CATALOGS: &[Catalog] = &[
    Catalog {
        category: SafetyCategory::Suicidal,
        level: SafetyLevel::Critical,
        reason: "suicidal ideation language",
        patterns: &SUICIDAL,
    },
    Catalog {
        category: SafetyCategory::SelfHarm,
        level: SafetyLevel::Critical,
        reason: "self-harm language",
        patterns: &SELF_HARM,
    },
    Catalog {
        category: SafetyCategory::Abuse,
        level: SafetyLevel::Alert,
        reason: "abuse indicators",
        patterns: &ABUSE,
    },
    Catalog {
        category: SafetyCategory::Crisis,
        level: SafetyLevel::Alert,
        reason: "hopelessness language",
        patterns: &HOPELESSNESS,
    },
    Catalog {
        category: SafetyCategory::Crisis,
        level: SafetyLevel::Alert,
        reason: "isolation language",
        patterns: &ISOLATION,
    },
    Catalog {
        category: SafetyCategory::Crisis,
        level: SafetyLevel::Watch,
        reason: "distress language",
        patterns: &DISTRESS,
    },
];

/// The L1 safety layer
#[derive(Debug, Default, Clone, Copy)]
pub struct SafetyLayer;

impl SafetyLayer {
    pub fn new() -> Self {
        Self
    }

    /// Scan the utterance and return every matching signal.
    ///
    /// One signal per matched pattern; nothing is deduplicated here because
    /// no signal may be silently dropped before the audit trail sees it.
    pub fn check(&self, content: &str) -> Vec<SafetySignal> {
        let mut signals = Vec::new();
        for catalog in CATALOGS {
            for pattern in catalog.patterns.iter() {
                if let Some(found) = pattern.find(content) {
                    let resources = if catalog.level >= SafetyLevel::Alert {
                        CRISIS_RESOURCES.iter().map(|r| r.to_string()).collect()
                    } else {
                        Vec::new()
                    };
                    signals.push(SafetySignal {
                        level: catalog.level,
                        category: catalog.category,
                        evidence: truncate_evidence(found.as_str()),
                        reason: catalog.reason.to_string(),
                        resources,
                    });
                }
            }
        }
        signals
    }

    /// Highest severity across the given signals.
    pub fn severity(signals: &[SafetySignal]) -> SafetyLevel {
        signals
            .iter()
            .map(|s| s.level)
            .max()
            .unwrap_or(SafetyLevel::None)
    }
}
