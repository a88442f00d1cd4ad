//! Language-model collaborators: text generation, prompt construction, and
//! the interpret/resolve/reflect steps built on top of them.

mod generator;
mod interpreter;
mod pipeline;
mod prompts;
mod reflection;
mod resolver;

pub use generator::{ClaudeGenerator, GenerationError, GeneratorConfig, StructuredTask, TextGenerator};
pub use interpreter::ActionInterpreter;
pub use pipeline::{ActionPipeline, ActionReport};
pub use prompts::{ConversationPhase, PromptBuilder, TownPromptBuilder, REFLECTION_SYSTEM_PROMPT};
pub use reflection::{
    parse_reflection, reflect, Reflection, DEFAULT_REFLECTION_DELTA, DEFAULT_REFLECTION_SUMMARY,
};
pub use resolver::{OutcomeResolver, RESOLVER_SYSTEM_PROMPT};

use thiserror::Error;

/// Structured output that could not be read.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object in response")]
    NoJson,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pull the JSON object out of a model response.
///
/// Handles ```json fences, bare ``` fences, and prose around the object.
pub fn extract_json(text: &str) -> Option<&str> {
    let mut text = text.trim();

    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            text = text[content_start..content_start + end].trim();
        }
    } else if let Some(start) = text.find("```") {
        let content_start = start + 3;
        if let Some(end) = text[content_start..].find("```") {
            text = text[content_start..content_start + end].trim();
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse the JSON object in `text` into `T`.
pub fn parse_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let json = extract_json(text).ok_or(ParseError::NoJson)?;
    Ok(serde_json::from_str(json)?)
}
