//! L2 semantic layer: pattern and tension detection
//!
//! Deterministic: identical inputs produce identical output. Timestamps are
//! used for ordering only, never for content, and nothing here touches the
//! clock or the network.

pub mod patterns;
pub mod tensions;
pub mod vocabulary;

use mirror_core::{PatternType, Reflection, SemanticContext};

pub use patterns::{BehaviorDetector, EmotionDetector, PatternDetector, TopicDetector};
pub use tensions::{behavioral_tensions, contradiction_tensions, emotional_tensions};

/// The semantic layer: three pattern sub-detectors plus tension mappers
pub struct SemanticLayer {
    detectors: Vec<Box<dyn PatternDetector>>,
}

impl Default for SemanticLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticLayer {
    pub fn new() -> Self {
        Self {
            detectors: vec![
                Box::new(EmotionDetector::new()),
                Box::new(TopicDetector::new()),
                Box::new(BehaviorDetector::new()),
            ],
        }
    }

    /// Analyze the current reflection against history.
    pub fn analyze(&self, current: &Reflection, history: &[Reflection]) -> SemanticContext {
        let mut all_patterns = Vec::new();
        for detector in &self.detectors {
            all_patterns.extend(detector.detect(current, history));
        }
        all_patterns.sort_by(|a, b| {
            (a.pattern_type.as_str(), &a.name).cmp(&(b.pattern_type.as_str(), &b.name))
        });

        let behavior_patterns: Vec<_> = all_patterns
            .iter()
            .filter(|p| p.pattern_type == PatternType::Behavior)
            .cloned()
            .collect();

        let mut tensions = emotional_tensions(&all_patterns);
        tensions.extend(behavioral_tensions(current, history, &behavior_patterns));
        tensions.extend(contradiction_tensions(current));

        let emotional_baseline = all_patterns
            .iter()
            .filter(|p| p.pattern_type == PatternType::Emotion)
            .max_by(|a, b| {
                a.occurrences
                    .cmp(&b.occurrences)
                    .then_with(|| b.name.cmp(&a.name))
            })
            .map(|p| p.name.clone());

        let recurring_themes: Vec<String> = all_patterns
            .iter()
            .filter(|p| p.pattern_type == PatternType::Topic)
            .map(|p| p.name.clone())
            .collect();

        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert(
            "total_reflections".to_string(),
            serde_json::json!(history.len() + 1),
        );
        metadata.insert(
            "patterns_detected".to_string(),
            serde_json::json!(all_patterns.len()),
        );
        metadata.insert(
            "tensions_detected".to_string(),
            serde_json::json!(tensions.len()),
        );

        SemanticContext {
            patterns: all_patterns,
            tensions,
            recurring_themes,
            emotional_baseline,
            metadata,
        }
    }
}
