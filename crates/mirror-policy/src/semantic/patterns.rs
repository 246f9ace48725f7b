//! Pattern detectors: emotion, topic, and behavior
//!
//! Each detector scans current ∪ history and counts the reflections in
//! which a canonical term occurs. A pattern is emitted once it has been
//! seen in at least two reflections; `confidence = min(1.0, 0.2·occ)`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use mirror_core::{Pattern, PatternType, Reflection};

use super::vocabulary::{BEHAVIOR_STEMS, EMOTION_VOCAB, TOPIC_BUCKETS};

/// Minimum reflections a term must appear in before it is a pattern
pub const MIN_OCCURRENCES: u32 = 2;
/// Confidence added per occurrence, capped at 1.0
pub const CONFIDENCE_PER_OCCURRENCE: f64 = 0.2;
/// Sample contexts kept per pattern
const MAX_CONTEXTS: usize = 3;
/// Context utterances are truncated to this many chars
const CONTEXT_CAP: usize = 80;

/// A detector over the tokens of current + historical reflections
pub trait PatternDetector: Send + Sync {
    /// Detect patterns across the given reflections.
    fn detect(&self, current: &Reflection, history: &[Reflection]) -> Vec<Pattern>;
}

struct VocabularyMatcher {
    pattern_type: PatternType,
    entries: Vec<(String, Regex)>,
}

fn compile_vocab(catalog: &[(&str, &[&str])]) -> Vec<(String, Regex)> {
    catalog
        .iter()
        .map(|(canonical, terms)| {
            let alternation = terms
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|");
            let regex = Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
                .unwrap_or_else(|e| panic!("invalid vocabulary for {canonical:?}: {e}"));
            (canonical.to_string(), regex)
        })
        .collect()
}

impl VocabularyMatcher {
    fn detect(&self, current: &Reflection, history: &[Reflection]) -> Vec<Pattern> {
        // Accumulate per canonical name, ordered for determinism.
        let mut found: BTreeMap<&str, Pattern> = BTreeMap::new();
        let all = history.iter().chain(std::iter::once(current));
        for reflection in all {
            for (canonical, regex) in &self.entries {
                if !regex.is_match(&reflection.content) {
                    continue;
                }
                let entry = found.entry(canonical.as_str()).or_insert_with(|| Pattern {
                    pattern_type: self.pattern_type,
                    name: canonical.clone(),
                    occurrences: 0,
                    first_seen: reflection.timestamp,
                    last_seen: reflection.timestamp,
                    confidence: 0.0,
                    contexts: Vec::new(),
                });
                entry.occurrences += 1;
                entry.first_seen = entry.first_seen.min(reflection.timestamp);
                entry.last_seen = entry.last_seen.max(reflection.timestamp);
                if entry.contexts.len() < MAX_CONTEXTS {
                    entry
                        .contexts
                        .push(reflection.content.chars().take(CONTEXT_CAP).collect());
                }
            }
        }
        found
            .into_values()
            .filter(|p| p.occurrences >= MIN_OCCURRENCES)
            .map(|mut p| {
                p.confidence = (CONFIDENCE_PER_OCCURRENCE * p.occurrences as f64).min(1.0);
                p
            })
            .collect()
    }
}

/// Emotion detector backed by the emotion vocabulary map
pub struct EmotionDetector {
    matcher: VocabularyMatcher,
}

static EMOTION_ENTRIES: Lazy<Vec<(String, Regex)>> = Lazy::new(|| compile_vocab(EMOTION_VOCAB));
static TOPIC_ENTRIES: Lazy<Vec<(String, Regex)>> = Lazy::new(|| compile_vocab(TOPIC_BUCKETS));
static BEHAVIOR_ENTRIES: Lazy<Vec<(String, Regex)>> = Lazy::new(|| compile_vocab(BEHAVIOR_STEMS));

impl Default for EmotionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl EmotionDetector {
    pub fn new() -> Self {
        Self {
            matcher: VocabularyMatcher {
                pattern_type: PatternType::Emotion,
                entries: EMOTION_ENTRIES.clone(),
            },
        }
    }
}

impl PatternDetector for EmotionDetector {
    fn detect(&self, current: &Reflection, history: &[Reflection]) -> Vec<Pattern> {
        self.matcher.detect(current, history)
    }
}

/// Topic detector: lemma-level keyword match against domain buckets
pub struct TopicDetector {
    matcher: VocabularyMatcher,
}

impl Default for TopicDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicDetector {
    pub fn new() -> Self {
        Self {
            matcher: VocabularyMatcher {
                pattern_type: PatternType::Topic,
                entries: TOPIC_ENTRIES.clone(),
            },
        }
    }
}

impl PatternDetector for TopicDetector {
    fn detect(&self, current: &Reflection, history: &[Reflection]) -> Vec<Pattern> {
        self.matcher.detect(current, history)
    }
}

/// Behavior detector: verb-stem match (run → run, ran, running)
pub struct BehaviorDetector {
    matcher: VocabularyMatcher,
}

impl Default for BehaviorDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl BehaviorDetector {
    pub fn new() -> Self {
        Self {
            matcher: VocabularyMatcher {
                pattern_type: PatternType::Behavior,
                entries: BEHAVIOR_ENTRIES.clone(),
            },
        }
    }
}

impl PatternDetector for BehaviorDetector {
    fn detect(&self, current: &Reflection, history: &[Reflection]) -> Vec<Pattern> {
        self.matcher.detect(current, history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::{InvocationMode, PatternStrength, Timestamp, UserId};

    fn reflection(content: &str, millis: i64) -> Reflection {
        Reflection::new_text(
            UserId::new("u1").unwrap(),
            content,
            InvocationMode::PostAction,
            Timestamp::from_unix_millis(millis),
        )
    }

    #[test]
    fn anxiety_pattern_after_four_mentions() {
        let history = vec![
            reflection("Feeling really anxious about work today.", 1),
            reflection("Still anxious, could not sleep.", 2),
            reflection("Anxious again before the meeting.", 3),
        ];
        let current = reflection("Woke up feeling anxious about the week ahead.", 4);

        let patterns = EmotionDetector::new().detect(&current, &history);
        let anxiety: Vec<_> = patterns.iter().filter(|p| p.name == "anxiety").collect();
        assert_eq!(anxiety.len(), 1);
        let anxiety = anxiety[0];
        assert_eq!(anxiety.pattern_type, PatternType::Emotion);
        assert_eq!(anxiety.occurrences, 4);
        assert!(anxiety.confidence >= 0.8);
        assert_eq!(anxiety.strength(), PatternStrength::Strong);
        assert_eq!(anxiety.contexts.len(), 3);
        assert_eq!(anxiety.first_seen, Timestamp::from_unix_millis(1));
        assert_eq!(anxiety.last_seen, Timestamp::from_unix_millis(4));
    }

    #[test]
    fn single_occurrence_is_not_a_pattern() {
        let current = reflection("I'm feeling happy today.", 1);
        assert!(EmotionDetector::new().detect(&current, &[]).is_empty());
    }

    #[test]
    fn one_count_per_reflection_even_with_repeats() {
        let history = vec![reflection("anxious anxious anxious", 1)];
        let current = reflection("anxious again", 2);
        let patterns = EmotionDetector::new().detect(&current, &history);
        assert_eq!(patterns[0].occurrences, 2);
    }

    #[test]
    fn topic_detection() {
        let history = vec![
            reflection("Big project deadline at work.", 1),
            reflection("My boss moved the meeting.", 2),
        ];
        let current = reflection("Another long day at the office.", 3);
        let patterns = TopicDetector::new().detect(&current, &history);
        let work = patterns.iter().find(|p| p.name == "work").unwrap();
        assert_eq!(work.pattern_type, PatternType::Topic);
        assert_eq!(work.occurrences, 3);
    }

    #[test]
    fn behavior_stems_cover_inflections() {
        let history = vec![reflection("Went running this morning.", 1)];
        let current = reflection("I ran again before breakfast.", 2);
        let patterns = BehaviorDetector::new().detect(&current, &history);
        let run = patterns.iter().find(|p| p.name == "run").unwrap();
        assert_eq!(run.pattern_type, PatternType::Behavior);
        assert_eq!(run.occurrences, 2);
    }

    #[test]
    fn contexts_are_truncated() {
        let long = format!("anxious {}", "x".repeat(200));
        let history = vec![reflection(&long, 1)];
        let current = reflection(&long, 2);
        let patterns = EmotionDetector::new().detect(&current, &history);
        assert!(patterns[0].contexts.iter().all(|c| c.chars().count() <= 80));
    }

    #[test]
    fn confidence_caps_at_one() {
        let history: Vec<Reflection> =
            (0..10).map(|n| reflection("anxious day", n)).collect();
        let current = reflection("still anxious", 10);
        let patterns = EmotionDetector::new().detect(&current, &history);
        assert_eq!(patterns[0].confidence, 1.0);
    }
}
