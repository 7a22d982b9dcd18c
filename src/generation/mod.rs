//! Text generation stages: concept ideas and narration scripts.

mod openai;

pub use openai::{OpenAIIdeaGenerator, OpenAIScriptWriter};

use crate::config::TopicConfig;
use crate::error::{PosterError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A short structured idea seeding one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// What the video is about (a car, a story title, ...).
    pub subject: String,
    /// One-line hook or premise.
    pub hook: String,
}

/// Narration text for one video.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub text: String,
}

impl Script {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Produces a concept from a topic configuration.
#[async_trait]
pub trait IdeaGenerator: Send + Sync {
    async fn generate_idea(&self, topic: &TopicConfig) -> Result<Concept>;
}

/// Expands a concept into a narration script.
#[async_trait]
pub trait ScriptWriter: Send + Sync {
    async fn write_script(&self, concept: &Concept, topic: &TopicConfig) -> Result<Script>;
}

/// Parse a model response into a concept.
///
/// The subject is read from `subject_key` and the hook from `concept_key`.
/// A missing hook falls back to the subject; a missing subject is an error.
pub fn parse_concept(raw: &str, subject_key: &str, concept_key: &str) -> Result<Concept> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fence(raw)).map_err(|e| {
        PosterError::Generation(format!("Idea response is not valid JSON: {}", e))
    })?;

    let object = value.as_object().ok_or_else(|| {
        PosterError::Generation("Idea response is not a JSON object".to_string())
    })?;

    let text_field = |key: &str| -> Option<String> {
        match object.get(key)? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };

    let subject = text_field(subject_key).ok_or_else(|| {
        PosterError::Generation(format!(
            "Idea response has no '{}' field: {}",
            subject_key, raw
        ))
    })?;

    let hook = text_field(concept_key).unwrap_or_else(|| subject.clone());

    Ok(Concept { subject, hook })
}

/// Models sometimes wrap JSON in a markdown fence even in JSON mode.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_concept_with_custom_subject_key() {
        let raw = r#"{"car_name": "1994-2001 Acura Integra Type R (DC2)", "concept": "Giant killer."}"#;
        let concept = parse_concept(raw, "car_name", "concept").unwrap();
        assert_eq!(concept.subject, "1994-2001 Acura Integra Type R (DC2)");
        assert_eq!(concept.hook, "Giant killer.");
    }

    #[test]
    fn test_parse_concept_missing_hook_uses_subject() {
        let concept = parse_concept(r#"{"subject": "Miata"}"#, "subject", "concept").unwrap();
        assert_eq!(concept.hook, "Miata");
    }

    #[test]
    fn test_parse_concept_rejects_bad_shapes() {
        for raw in ["not json", "[1, 2]", r#"{"other": "x"}"#, r#"{"subject": ""}"#] {
            let err = parse_concept(raw, "subject", "concept").unwrap_err();
            assert!(matches!(err, PosterError::Generation(_)), "{}", raw);
        }
    }

    #[test]
    fn test_parse_concept_fenced() {
        let raw = "```json\n{\"subject\": \"NSX\", \"concept\": \"Senna tuned it.\"}\n```";
        let concept = parse_concept(raw, "subject", "concept").unwrap();
        assert_eq!(concept.subject, "NSX");
    }

    #[test]
    fn test_script_word_count() {
        assert_eq!(Script::new("One two  three.\nFour").word_count(), 4);
    }
}
