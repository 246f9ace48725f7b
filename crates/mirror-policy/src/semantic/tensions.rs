//! Tension mappers: emotional, behavioral, and contradiction-marker based

use once_cell::sync::Lazy;
use regex::Regex;

use mirror_core::{Pattern, Reflection, Tension, TensionType};

use super::vocabulary::{BEHAVIOR_STEMS, EMOTION_VOCAB, OPPOSING_EMOTIONS};

/// Confidence both opposing emotions must reach before a tension is raised
pub const OPPOSITION_CONFIDENCE_THRESHOLD: f64 = 0.5;

static INTENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:should|need to|want to|plan to|going to)\s+([a-z]+)")
        .unwrap_or_else(|e| panic!("invalid intention pattern: {e}"))
});

static EXPLICIT_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(but|however|although|on the other hand)\b")
        .unwrap_or_else(|e| panic!("invalid contradiction marker: {e}"))
});

static TEMPORAL_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bused to\b.{0,80}\b(?:now|these days|anymore)\b")
        .unwrap_or_else(|e| panic!("invalid temporal marker: {e}"))
});

fn emotion_term(word: &str) -> Option<&'static str> {
    let lowered = word.to_lowercase();
    EMOTION_VOCAB
        .iter()
        .find(|(_, terms)| terms.contains(&lowered.as_str()))
        .map(|(canonical, _)| *canonical)
}

fn behavior_canonical(word: &str) -> Option<&'static str> {
    let lowered = word.to_lowercase();
    BEHAVIOR_STEMS
        .iter()
        .find(|(_, terms)| terms.contains(&lowered.as_str()))
        .map(|(canonical, _)| *canonical)
}

/// Opposing emotion patterns co-occurring above the confidence threshold
pub fn emotional_tensions(patterns: &[Pattern]) -> Vec<Tension> {
    let mut tensions = Vec::new();
    for (a, b) in OPPOSING_EMOTIONS {
        let left = patterns.iter().find(|p| p.name == *a);
        let right = patterns.iter().find(|p| p.name == *b);
        if let (Some(left), Some(right)) = (left, right) {
            if left.confidence > OPPOSITION_CONFIDENCE_THRESHOLD
                && right.confidence > OPPOSITION_CONFIDENCE_THRESHOLD
            {
                let severity = left.confidence.min(right.confidence);
                let mut evidence: Vec<String> = Vec::new();
                evidence.extend(left.contexts.iter().take(1).cloned());
                evidence.extend(right.contexts.iter().take(1).cloned());
                tensions.push(Tension {
                    tension_type: TensionType::Emotional,
                    description: format!("{a} and {b} keep appearing side by side"),
                    severity,
                    evidence,
                });
            }
        }
    }
    tensions
}

/// Stated intentions ("need to run") with no matching behavior pattern
pub fn behavioral_tensions(
    current: &Reflection,
    history: &[Reflection],
    behavior_patterns: &[Pattern],
) -> Vec<Tension> {
    let mut seen = std::collections::BTreeSet::new();
    let mut tensions = Vec::new();
    let all = history.iter().chain(std::iter::once(current));
    for reflection in all {
        for capture in INTENTION.captures_iter(&reflection.content) {
            let Some(verb) = capture.get(1) else { continue };
            let Some(canonical) = behavior_canonical(verb.as_str()) else {
                continue;
            };
            if !seen.insert(canonical) {
                continue;
            }
            let acted = behavior_patterns.iter().any(|p| p.name == canonical);
            if !acted {
                tensions.push(Tension {
                    tension_type: TensionType::Behavioral,
                    description: format!("intends to {canonical} but no matching action appears"),
                    severity: 0.5,
                    evidence: vec![reflection.content.chars().take(80).collect()],
                });
            }
        }
    }
    tensions
}

/// Explicit, value, and temporal contradictions in the current utterance
pub fn contradiction_tensions(current: &Reflection) -> Vec<Tension> {
    let mut tensions = Vec::new();
    let content = &current.content;

    if let Some(marker) = EXPLICIT_MARKER.find(content) {
        let (before, after) = content.split_at(marker.start());
        let emotion_before = before.split_whitespace().find_map(emotion_term);
        let emotion_after = after.split_whitespace().find_map(emotion_term);
        if let (Some(a), Some(b)) = (emotion_before, emotion_after) {
            if a != b {
                tensions.push(Tension {
                    tension_type: TensionType::ExplicitContradiction,
                    description: format!("states {a} but also {b} in the same breath"),
                    severity: 0.6,
                    evidence: vec![content.chars().take(80).collect()],
                });
            }
        }
    }

    if TEMPORAL_MARKER.is_match(content) {
        tensions.push(Tension {
            tension_type: TensionType::Temporal,
            description: "past self and present self diverge".to_string(),
            severity: 0.4,
            evidence: vec![content.chars().take(80).collect()],
        });
    }

    tensions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::patterns::{BehaviorDetector, EmotionDetector, PatternDetector};
    use mirror_core::{InvocationMode, PatternType, Timestamp, UserId};

    fn reflection(content: &str, millis: i64) -> Reflection {
        Reflection::new_text(
            UserId::new("u1").unwrap(),
            content,
            InvocationMode::PostAction,
            Timestamp::from_unix_millis(millis),
        )
    }

    fn pattern(name: &str, confidence: f64) -> Pattern {
        Pattern {
            pattern_type: PatternType::Emotion,
            name: name.into(),
            occurrences: (confidence / 0.2) as u32,
            first_seen: Timestamp::from_unix_millis(0),
            last_seen: Timestamp::from_unix_millis(1),
            confidence,
            contexts: vec![format!("{name} context")],
        }
    }

    #[test]
    fn opposing_emotions_above_threshold_raise_tension() {
        let patterns = vec![pattern("anxiety", 0.8), pattern("calm", 0.6)];
        let tensions = emotional_tensions(&patterns);
        assert_eq!(tensions.len(), 1);
        let tension = &tensions[0];
        assert_eq!(tension.tension_type, TensionType::Emotional);
        assert!(tension.description.contains("anxiety"));
        assert!(tension.description.contains("calm"));
        assert_eq!(tension.severity, 0.6);
        assert_eq!(tension.evidence.len(), 2);
    }

    #[test]
    fn low_confidence_opposition_ignored() {
        let patterns = vec![pattern("anxiety", 0.4), pattern("calm", 0.9)];
        assert!(emotional_tensions(&patterns).is_empty());
    }

    #[test]
    fn intention_without_action_is_behavioral_tension() {
        let history = vec![
            reflection("I really need to exercise this week.", 1),
            reflection("Too tired again today.", 2),
        ];
        let current = reflection("Another day without moving.", 3);
        let behavior = BehaviorDetector::new().detect(&current, &history);
        let tensions = behavioral_tensions(&current, &history, &behavior);
        assert_eq!(tensions.len(), 1);
        assert_eq!(tensions[0].tension_type, TensionType::Behavioral);
        assert!(tensions[0].description.contains("exercise"));
    }

    #[test]
    fn intention_with_matching_action_is_fine() {
        let history = vec![
            reflection("I need to run more.", 1),
            reflection("Went running after lunch.", 2),
            reflection("Ran again this morning.", 3),
        ];
        let current = reflection("Thinking about my running habit.", 4);
        let behavior = BehaviorDetector::new().detect(&current, &history);
        let tensions = behavioral_tensions(&current, &history, &behavior);
        assert!(tensions.is_empty());
    }

    #[test]
    fn explicit_contradiction_detected() {
        let current = reflection("I feel calm about it but honestly still anxious underneath.", 1);
        let tensions = contradiction_tensions(&current);
        assert_eq!(tensions.len(), 1);
        assert_eq!(tensions[0].tension_type, TensionType::ExplicitContradiction);
    }

    #[test]
    fn marker_without_emotional_clauses_ignored() {
        let current = reflection("I went out but the store was closed.", 1);
        assert!(contradiction_tensions(&current).is_empty());
    }

    #[test]
    fn temporal_contradiction_detected() {
        let current = reflection("I used to love mornings, now I dread them.", 1);
        let tensions = contradiction_tensions(&current);
        assert!(tensions
            .iter()
            .any(|t| t.tension_type == TensionType::Temporal));
    }

    #[test]
    fn full_stack_emotional_tension() {
        // Build real patterns from text, then feed them to the mapper.
        let history = vec![
            reflection("Anxious about everything.", 1),
            reflection("Still anxious and worried.", 2),
            reflection("Feeling calm after the walk.", 3),
            reflection("Calm again, peaceful evening.", 4),
            reflection("Anxious before bed though.", 5),
        ];
        let current = reflection("Calm this morning, anxious by noon.", 6);
        let patterns = EmotionDetector::new().detect(&current, &history);
        let tensions = emotional_tensions(&patterns);
        assert!(!tensions.is_empty());
    }
}
