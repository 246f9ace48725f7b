//! Vocabulary catalogs for the semantic layer
//!
//! Canonical names map to the surface terms that count as an occurrence.
//! Matching is whole-word and case-insensitive everywhere these are used.

/// Emotion vocabulary: canonical name → surface terms
pub const EMOTION_VOCAB: &[(&str, &[&str])] = &[
    (
        "anxiety",
        &["anxious", "anxiety", "worried", "worry", "nervous", "uneasy", "on edge"],
    ),
    (
        "joy",
        &["happy", "happiness", "joy", "joyful", "glad", "delighted", "excited"],
    ),
    (
        "stress",
        &["stressed", "stress", "pressure", "overloaded", "burned out", "burnt out"],
    ),
    (
        "sadness",
        &["sad", "sadness", "down", "unhappy", "miserable", "heartbroken"],
    ),
    (
        "calm",
        &["calm", "peaceful", "relaxed", "at ease", "serene", "settled"],
    ),
    (
        "anger",
        &["angry", "anger", "mad", "furious", "irritated", "frustrated"],
    ),
    ("fear", &["afraid", "scared", "fear", "terrified", "dread"]),
];

/// Topic buckets: canonical name → lemma-level keywords
pub const TOPIC_BUCKETS: &[(&str, &[&str])] = &[
    (
        "work",
        &["work", "job", "boss", "meeting", "project", "deadline", "office", "career", "coworker"],
    ),
    (
        "health",
        &["health", "sleep", "doctor", "tired", "sick", "pain", "energy", "appetite"],
    ),
    (
        "relationships",
        &[
            "friend", "friends", "partner", "family", "relationship", "wife", "husband", "mom",
            "dad", "marriage", "breakup",
        ],
    ),
    ("money", &["money", "rent", "debt", "bills", "budget", "savings"]),
    (
        "school",
        &["school", "class", "exam", "study", "studying", "homework", "grades"],
    ),
];

/// Behavior verb stems: canonical name → inflected forms
pub const BEHAVIOR_STEMS: &[(&str, &[&str])] = &[
    ("run", &["run", "ran", "running", "jog", "jogged", "jogging"]),
    ("write", &["write", "wrote", "writing", "journal", "journaled", "journaling"]),
    (
        "exercise",
        &["exercise", "exercised", "exercising", "workout", "worked out", "gym"],
    ),
    (
        "meditate",
        &["meditate", "meditated", "meditating", "meditation"],
    ),
    ("walk", &["walk", "walked", "walking", "hike", "hiked", "hiking"]),
    ("read", &["read", "reading"]),
    ("sleep", &["sleep", "slept", "sleeping", "nap", "napped"]),
];

/// Emotion pairs considered opposed for tension detection
pub const OPPOSING_EMOTIONS: &[(&str, &str)] = &[
    ("anxiety", "calm"),
    ("joy", "sadness"),
    ("stress", "calm"),
    ("anger", "calm"),
];
