//! Reflections: user utterances entering the pipeline

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::identifiers::{ReflectionId, UserId};
use crate::time::Timestamp;

/// Invocation context that gates which checkers allow prescriptive language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvocationMode {
    /// Reflective mode after a user action; prescriptive advice is blocked
    PostAction,
    /// The user explicitly asked for guidance; directive language is allowed
    Guidance,
}

impl InvocationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostAction => "POST_ACTION",
            Self::Guidance => "GUIDANCE",
        }
    }
}

impl fmt::Display for InvocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input modality of a reflection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Text,
    Voice,
    Document,
    Image,
    Video,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
            Self::Document => "document",
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user utterance. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub id: ReflectionId,
    pub user_id: UserId,
    pub timestamp: Timestamp,
    pub content: String,
    pub mode: InvocationMode,
    pub modality: Modality,
    /// Opaque metadata from the ingest boundary
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Reflection {
    /// Create a text reflection stamped with the given wall-clock time.
    pub fn new_text(
        user_id: UserId,
        content: impl Into<String>,
        mode: InvocationMode,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: ReflectionId::new(),
            user_id,
            timestamp,
            content: content.into(),
            mode,
            modality: Modality::Text,
            metadata: BTreeMap::new(),
        }
    }
}
