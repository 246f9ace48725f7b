//! L3 expression layer: tone adaptation and leave-ability rewriting
//!
//! Pure string rewriting, no external calls. Leave-ability enforcement is
//! mandatory and runs first, even when it contradicts the requested tone;
//! the post-condition is `validate(shape(x, ..)) == []` for every input.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use mirror_core::{AxiomId, SemanticContext, Violation};
use mirror_journal::truncate_evidence;

/// Requested voice of the response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    /// Empathetic, supportive
    Warm,
    /// Professional, analytical
    Clinical,
    /// Concise, minimal hedging
    Direct,
    /// Default mix; identity transformation
    Balanced,
}

/// Requested response length band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    Brief,
    Moderate,
    Detailed,
}

/// User expression preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub tone: Tone,
    pub detail_level: DetailLevel,
    pub use_questions: bool,
    /// Hard cap on response length in chars, truncated at sentence boundary
    pub max_length: Option<usize>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            tone: Tone::Balanced,
            detail_level: DetailLevel::Moderate,
            use_questions: true,
            max_length: None,
        }
    }
}

/// Directive → suggestion substitutions (necessity becomes autonomy)
const AUTONOMY_REPLACEMENTS: &[(&str, &str)] = &[
    ("you need to", "you might"),
    ("you should", "you could"),
    ("you must", "you might"),
    ("you have to", "you could"),
    ("try to", "if you want to"),
    ("make sure to", "if it helps,"),
    ("don't forget to", "if you'd like,"),
];

/// Necessity phrases; any sentence containing one is removed
const NECESSITY_VIOLATIONS: &[&str] = &[
    "you need mirror",
    "you need to use mirror",
    "keep using mirror",
    "continue with mirror",
    "mirror can help",
    "mirror will help",
    "come back to mirror",
    "return to mirror",
    "keep reflecting",
    "you should reflect",
    "try to reflect",
    "make sure to reflect",
    "remember to reflect",
];

/// Exit-guilt phrases; any sentence containing one is removed
const EXIT_GUILT: &[&str] = &[
    "we'll miss you",
    "we hope you come back",
    "sad to see you go",
    "you'll lose",
    "you'll miss out",
    "without mirror",
];

// Directive detection in `validate` reuses AUTONOMY_PATTERNS so the check
// matches exactly what enforcement rewrites.

static AUTONOMY_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    AUTONOMY_REPLACEMENTS
        .iter()
        .map(|(directive, suggestion)| {
            let regex = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(directive)))
                .unwrap_or_else(|e| panic!("invalid directive {directive:?}: {e}"));
            (regex, *suggestion)
        })
        .collect()
});

static SOFTEN_STEP: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [("you could", "you might")]
        .iter()
        .map(|(from, to)| {
            let regex = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(from)))
                .unwrap_or_else(|e| panic!("invalid soften pattern {from:?}: {e}"));
            (regex, *to)
        })
        .collect()
});

/// Replace matches with `to`, carrying the capitalization of the match's
/// first character so sentence starts stay sentence starts.
fn replace_preserving_case(regex: &Regex, text: &str, to: &str) -> String {
    regex
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let matched = caps.get(0).map(|m| m.as_str()).unwrap_or("");
            let starts_upper = matched.chars().next().is_some_and(|c| c.is_uppercase());
            if starts_upper {
                let mut chars = to.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            } else {
                to.to_string()
            }
        })
        .into_owned()
}

/// Split into sentences, keeping terminal punctuation attached.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }
    sentences
}

fn join_sentences(sentences: Vec<String>) -> String {
    sentences
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn contains_any<'a>(text: &str, phrases: &[&'a str]) -> Option<&'a str> {
    let lowered = text.to_lowercase();
    phrases
        .iter()
        .find(|phrase| lowered.contains(&phrase.to_lowercase()))
        .copied()
}

/// Leave-ability enforcement: soften directives, then drop sentences that
/// carry necessity or exit-guilt language. Idempotent.
pub fn enforce_leaveability(text: &str) -> String {
    // Directives are softened before removal so they survive as
    // suggestions instead of disappearing.
    let mut softened = text.to_string();
    for (pattern, suggestion) in AUTONOMY_PATTERNS.iter() {
        softened = replace_preserving_case(pattern, &softened, suggestion);
    }

    let kept: Vec<String> = split_sentences(&softened)
        .into_iter()
        .filter(|sentence| contains_any(sentence, NECESSITY_VIOLATIONS).is_none())
        .filter(|sentence| contains_any(sentence, EXIT_GUILT).is_none())
        .collect();
    join_sentences(kept)
}

fn apply_warm(text: &str) -> String {
    let lowered = text.to_lowercase();
    if ["i hear", "i'm here", "with you"]
        .iter()
        .any(|phrase| lowered.contains(phrase))
    {
        return text.to_string();
    }
    let mut sentences = split_sentences(text);
    if sentences.len() > 1 {
        sentences.insert(1, "I hear you.".to_string());
        join_sentences(sentences)
    } else {
        text.to_string()
    }
}

fn replace_all_ci(text: &str, from: &str, to: &str) -> String {
    match Regex::new(&format!(r"(?i){}", regex::escape(from))) {
        Ok(regex) => regex.replace_all(text, to).into_owned(),
        Err(_) => text.to_string(),
    }
}

fn apply_clinical(text: &str) -> String {
    let mut result = text.to_string();
    for (from, to) in [
        ("feeling", "experiencing"),
        ("i hear", "I observe"),
        ("it sounds like", "it appears"),
        ("you share", "you report"),
    ] {
        result = replace_all_ci(&result, from, to);
    }
    result = replace_all_ci(&result, "i'm here with you", "");
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn apply_direct(text: &str) -> String {
    let mut result = text.to_string();
    for hedge in [
        "it seems that ",
        "it appears that ",
        "perhaps ",
        "maybe ",
        "i think ",
        "i notice that ",
        "quite ",
        "very ",
    ] {
        result = replace_all_ci(&result, hedge, "");
    }
    result = replace_all_ci(&result, "it sounds like you", "you");
    result = replace_all_ci(&result, "it seems you", "you");
    result
}

fn apply_detail(text: &str, level: DetailLevel) -> String {
    match level {
        DetailLevel::Brief => {
            let sentences = split_sentences(text);
            join_sentences(sentences.into_iter().take(2).collect())
        }
        DetailLevel::Moderate | DetailLevel::Detailed => text.to_string(),
    }
}

fn strip_questions(text: &str) -> String {
    let kept: Vec<String> = split_sentences(text)
        .into_iter()
        .filter(|s| !s.trim_end().ends_with('?'))
        .collect();
    join_sentences(kept)
}

/// Truncate at the nearest sentence boundary at or below `max` chars; when
/// no boundary lands in the last 30% of the window, hard-truncate with an
/// ellipsis.
fn apply_length_cap(text: &str, max: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max || max == 0 {
        return text.to_string();
    }
    let mut last_boundary = None;
    for (i, c) in chars.iter().enumerate().take(max) {
        if matches!(c, '.' | '!' | '?') {
            last_boundary = Some(i + 1);
        }
    }
    let floor = (max as f64 * 0.7) as usize;
    match last_boundary {
        Some(boundary) if boundary >= floor => {
            chars[..boundary].iter().collect::<String>().trim_end().to_string()
        }
        _ => {
            let cut = max.saturating_sub(1);
            let mut truncated: String = chars[..cut].iter().collect();
            truncated.push('…');
            truncated
        }
    }
}

/// The L3 expression layer
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpressionLayer;

impl ExpressionLayer {
    pub fn new() -> Self {
        Self
    }

    /// Shape a candidate response: leave-ability, tone, detail, length cap,
    /// context-aware softening, in that order.
    pub fn shape(
        &self,
        candidate: &str,
        preferences: &Preferences,
        context: &SemanticContext,
    ) -> String {
        let mut text = enforce_leaveability(candidate);

        text = match preferences.tone {
            Tone::Warm => apply_warm(&text),
            Tone::Clinical => apply_clinical(&text),
            Tone::Direct => apply_direct(&text),
            Tone::Balanced => text,
        };

        text = apply_detail(&text, preferences.detail_level);
        if !preferences.use_questions {
            text = strip_questions(&text);
        }

        if let Some(max) = preferences.max_length {
            text = apply_length_cap(&text, max);
        }

        if context.has_strong_pattern("anxiety") {
            for (pattern, to) in SOFTEN_STEP.iter() {
                text = replace_preserving_case(pattern, &text, to);
            }
        }

        // Truncation can re-expose a directive prefix ("you shouldn't" cut
        // to "you should…"); enforcement is idempotent, so a final pass
        // costs nothing on already-clean text.
        enforce_leaveability(&text)
    }

    /// Check shaped text for surviving necessity, exit-guilt, or directive
    /// language. Empty output is the post-condition of `shape`.
    pub fn validate(&self, text: &str) -> Vec<Violation> {
        let mut violations = Vec::new();
        if let Some(phrase) = contains_any(text, NECESSITY_VIOLATIONS) {
            violations.push(Violation::fatal(
                AxiomId::I6,
                truncate_evidence(phrase),
                "necessity language survived shaping",
            ));
        }
        if let Some(phrase) = contains_any(text, EXIT_GUILT) {
            violations.push(Violation::fatal(
                AxiomId::I7,
                truncate_evidence(phrase),
                "exit guilt survived shaping",
            ));
        }
        if let Some(found) = AUTONOMY_PATTERNS
            .iter()
            .find_map(|(pattern, _)| pattern.find(text))
        {
            violations.push(Violation::fatal(
                AxiomId::I9,
                truncate_evidence(found.as_str()),
                "directive language survived shaping",
            ));
        }
        violations
    }
}
