//! Built-in response provider
//!
//! A deterministic reflective template so the engine runs without an
//! external model. Whatever generates the candidate, it is still only a
//! candidate: the constitutional and expression layers gate it like any
//! other.

use async_trait::async_trait;

use mirror_core::{ResponseGenerator, Result, SemanticContext};

/// Deterministic template generator
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResponseGenerator for TemplateGenerator {
    async fn generate(&self, _prompt: &str, context: &SemanticContext) -> Result<String> {
        let mut response = String::from("Thanks for putting this into words.");

        if let Some(emotion) = &context.emotional_baseline {
            response.push_str(&format!(
                " The word {emotion} has come up more than once lately."
            ));
        }
        if let Some(theme) = context.recurring_themes.first() {
            response.push_str(&format!(" {theme} keeps surfacing as a theme."));
        }
        if let Some(tension) = context.tensions.first() {
            response.push_str(&format!(
                " One thing worth noticing: {}.",
                tension.description
            ));
        }
        response.push_str(" What stands out to you about this right now?");

        Ok(response)
    }
}
