//! L0 constitutional layer: the 14 invariant checkers
//!
//! Each checker is a value behind one flat trait, holding a catalog of
//! literal phrases and regex patterns. Checkers are deterministic and
//! mode-aware; every violation is fatal. A checker that errors is treated
//! as a violation of its own axiom so the layer fails closed.

use once_cell::sync::Lazy;
use regex::Regex;

use mirror_core::{AxiomId, InvocationMode, Reflection, Result, Violation};
use mirror_journal::truncate_evidence;

/// A single invariant checker over request/response pairs
pub trait AxiomChecker: Send + Sync {
    /// Which axiom this checker enforces
    fn axiom(&self) -> AxiomId;

    /// Check the inbound request. Most axioms only constrain responses.
    fn check_request(&self, _request: &Reflection) -> Result<Vec<Violation>> {
        Ok(Vec::new())
    }

    /// Check a candidate response in the context of the request.
    fn check_response(&self, request: &Reflection, response: &str) -> Result<Vec<Violation>>;
}

/// Catalog-driven checker: matches literal phrases and regex patterns,
/// optionally gated to specific invocation modes.
struct CatalogChecker {
    axiom: AxiomId,
    reason: &'static str,
    patterns: &'static Lazy<Vec<Regex>>,
    /// When set, the checker only applies in these request modes
    modes: Option<&'static [InvocationMode]>,
}

impl CatalogChecker {
    fn applies(&self, mode: InvocationMode) -> bool {
        self.modes.map_or(true, |modes| modes.contains(&mode))
    }
}

impl AxiomChecker for CatalogChecker {
    fn axiom(&self) -> AxiomId {
        self.axiom
    }

    fn check_response(&self, request: &Reflection, response: &str) -> Result<Vec<Violation>> {
        if !self.applies(request.mode) {
            return Ok(Vec::new());
        }
        let mut violations = Vec::new();
        for pattern in self.patterns.iter() {
            if let Some(found) = pattern.find(response) {
                violations.push(Violation::fatal(
                    self.axiom,
                    truncate_evidence(found.as_str()),
                    self.reason,
                ));
                // One violation per axiom is enough to block; keep scanning
                // only across checkers, not within one catalog.
                break;
            }
        }
        Ok(violations)
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| {
            let gap_tolerant = p.replace(' ', r"\s+");
            Regex::new(&format!(r"(?i)\b(?:{gap_tolerant})\b"))
                .unwrap_or_else(|e| panic!("invalid axiom pattern {p:?}: {e}"))
        })
        .collect()
}

static CERTAINTY: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "you are definitely",
        "you're definitely",
        "you will definitely",
        "this will make you",
        "you will always",
        "you will never",
        "there is no doubt that you",
    ])
});

static SOVEREIGNTY: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "you have no choice",
        "you can't decide",
        "i won't let you",
        "i know better than you",
        "that decision isn't yours",
    ])
});

static MANIPULATION: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "streak",
        "don't break the chain",
        "limited time",
        "act now",
        "miss out",
        "exclusive offer",
        "level up",
        "unlock",
        "reward points",
        "leaderboard",
    ])
});

static DIAGNOSIS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "depression",
        "depressed",
        "clinical",
        "ptsd",
        "adhd",
        "bipolar",
        "ocd",
        "anxiety disorder",
        "panic disorder",
        "you should see a therapist",
        "you need therapy",
        "you need medication",
        "diagnos(?:is|ed|e)",
    ])
});

static POST_ACTION: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "you should",
        "you must",
        "you need to",
        "you have to",
        "make sure to",
        "the right thing to do is",
    ])
});

static NECESSITY: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "you need mirror",
        "you need to use mirror",
        "keep using",
        "continue with mirror",
        "mirror can help",
        "mirror will help",
        "come back",
        "return to mirror",
        "keep reflecting",
        "use mirror daily",
    ])
});

static EXIT_FREEDOM: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "we'll miss you",
        "we will miss you",
        "we hope you come back",
        "sad to see you go",
        "you'll lose",
        "you will lose",
        "you'll miss out",
        "without mirror",
    ])
});

static DEPARTURE_INFERENCE: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "you haven't written",
        "you haven't reflected",
        "you've been away",
        "you've been gone",
        "it's been a while since",
        "your absence",
    ])
});

static ADVICE: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "you should",
        "you must",
        "you ought to",
        "i recommend",
        "my advice",
        "i suggest you",
    ])
});

static CONTEXT_COLLAPSE: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "in every area of your life",
        "in all areas of your life",
        "across every context",
        "this is who you are everywhere",
        "your whole identity",
    ])
});

static CERTAINTY_SELF: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "you feel",
        "you believe",
        "you really think",
        "deep down you",
        "you secretly",
        "what you actually want",
    ])
});

static OPTIMIZATION: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "engagement",
        "retention",
        "daily active",
        "keep you engaged",
        "maximize your usage",
        "stickiness",
        "churn",
        "session length",
    ])
});

static COERCION: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "letting yourself down",
        "you'll regret",
        "you will regret",
        "others are better",
        "everyone else manages",
        "you should be ashamed",
        "disappointed in you",
        "you're failing",
    ])
});

static CAPTURE: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        "can't leave",
        "don't leave",
        "you'd be lost without",
        "nothing works without",
        "only mirror can",
        "you belong here",
        "stay with us",
    ])
});

const POST_ACTION_ONLY: &[InvocationMode] = &[InvocationMode::PostAction];

/// The constitutional layer: all 14 checkers behind one registry
pub struct ConstitutionalLayer {
    checkers: Vec<Box<dyn AxiomChecker>>,
}

impl Default for ConstitutionalLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstitutionalLayer {
    /// Registry with the full 14-axiom catalog
    pub fn new() -> Self {
        let checkers: Vec<Box<dyn AxiomChecker>> = vec![
            Box::new(CatalogChecker {
                axiom: AxiomId::I1,
                reason: "asserts certainty about the user's state or future",
                patterns: &CERTAINTY,
                modes: None,
            }),
            Box::new(CatalogChecker {
                axiom: AxiomId::I2,
                reason: "overrides explicit user autonomy",
                patterns: &SOVEREIGNTY,
                modes: None,
            }),
            Box::new(CatalogChecker {
                axiom: AxiomId::I3,
                reason: "gamification, FOMO, or scarcity framing",
                patterns: &MANIPULATION,
                modes: None,
            }),
            Box::new(CatalogChecker {
                axiom: AxiomId::I4,
                reason: "clinical label or treatment directive",
                patterns: &DIAGNOSIS,
                modes: None,
            }),
            Box::new(CatalogChecker {
                axiom: AxiomId::I5,
                reason: "prescriptive advice in post-action mode",
                patterns: &POST_ACTION,
                modes: Some(POST_ACTION_ONLY),
            }),
            Box::new(CatalogChecker {
                axiom: AxiomId::I6,
                reason: "necessity language about the system",
                patterns: &NECESSITY,
                modes: None,
            }),
            Box::new(CatalogChecker {
                axiom: AxiomId::I7,
                reason: "exit guilt",
                patterns: &EXIT_FREEDOM,
                modes: None,
            }),
            Box::new(CatalogChecker {
                axiom: AxiomId::I8,
                reason: "inference drawn from the user's absence",
                patterns: &DEPARTURE_INFERENCE,
                modes: None,
            }),
            Box::new(CatalogChecker {
                axiom: AxiomId::I9,
                reason: "directive advice outside guidance mode",
                patterns: &ADVICE,
                modes: Some(POST_ACTION_ONLY),
            }),
            Box::new(CatalogChecker {
                axiom: AxiomId::I10,
                reason: "treats separate contexts as one identity",
                patterns: &CONTEXT_COLLAPSE,
                modes: None,
            }),
            Box::new(CatalogChecker {
                axiom: AxiomId::I11,
                reason: "claims about inner state the user did not express",
                patterns: &CERTAINTY_SELF,
                modes: None,
            }),
            Box::new(CatalogChecker {
                axiom: AxiomId::I12,
                reason: "engagement or retention optimization language",
                patterns: &OPTIMIZATION,
                modes: None,
            }),
            Box::new(CatalogChecker {
                axiom: AxiomId::I13,
                reason: "guilt, shame, or fear framing",
                patterns: &COERCION,
                modes: None,
            }),
            Box::new(CatalogChecker {
                axiom: AxiomId::I14,
                reason: "lock-in language or discouragement of leaving",
                patterns: &CAPTURE,
                modes: None,
            }),
        ];
        Self { checkers }
    }

    /// Number of registered checkers (always 14)
    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    /// Check the inbound request against every axiom.
    pub fn check_request(&self, request: &Reflection) -> Vec<Violation> {
        self.run(|checker| checker.check_request(request))
    }

    /// Check a candidate response against every axiom.
    pub fn check_response(&self, request: &Reflection, response: &str) -> Vec<Violation> {
        self.run(|checker| checker.check_response(request, response))
    }

    fn run(
        &self,
        mut check: impl FnMut(&dyn AxiomChecker) -> Result<Vec<Violation>>,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();
        for checker in &self.checkers {
            match check(checker.as_ref()) {
                Ok(found) => violations.extend(found),
                Err(e) => {
                    // Fail closed: a broken checker blocks the response.
                    tracing::error!(axiom = %checker.axiom(), error = %e, "axiom checker failed");
                    violations.push(Violation::fatal(
                        checker.axiom(),
                        "",
                        format!("checker error: {e}"),
                    ));
                }
            }
        }
        violations
    }
}
