//! The text-generation seam and its Claude-backed implementation.

use crate::conversation::{TranscriptEntry, TranscriptRole};
use async_trait::async_trait;
use claude::{Claude, Message, Request};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Claude API error: {0}")]
    Api(#[from] claude::Error),

    #[error("generator returned an empty response")]
    Empty,

    #[error("generator unavailable: {0}")]
    Unavailable(String),
}

/// Which structured step a call serves. Lets implementations pick token
/// budgets per step and lets test doubles route scripted replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructuredTask {
    Interpretation,
    Resolution,
    Reflection,
}

/// Produces text for dialogue and structured steps.
///
/// Implementations are shared across worker threads and must handle their
/// own rate limiting.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Next line of dialogue given a role-tagged transcript.
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[TranscriptEntry],
    ) -> Result<String, GenerationError>;

    /// A single-shot completion expected to contain a JSON object (or, for
    /// reflection, the line-based reflection format).
    async fn generate_structured(
        &self,
        task: StructuredTask,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, GenerationError>;
}

/// Token budgets and sampling for [`ClaudeGenerator`].
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub model: Option<String>,
    pub dialogue_max_tokens: usize,
    pub dialogue_temperature: f32,
    pub interpretation_max_tokens: usize,
    pub resolution_max_tokens: usize,
    pub reflection_max_tokens: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: None,
            dialogue_max_tokens: 300,
            dialogue_temperature: 0.9,
            interpretation_max_tokens: 300,
            resolution_max_tokens: 500,
            reflection_max_tokens: 200,
        }
    }
}

impl GeneratorConfig {
    fn max_tokens_for(&self, task: StructuredTask) -> usize {
        match task {
            StructuredTask::Interpretation => self.interpretation_max_tokens,
            StructuredTask::Resolution => self.resolution_max_tokens,
            StructuredTask::Reflection => self.reflection_max_tokens,
        }
    }
}

/// [`TextGenerator`] backed by the Claude Messages API.
#[derive(Clone)]
pub struct ClaudeGenerator {
    client: Claude,
    config: GeneratorConfig,
}

impl ClaudeGenerator {
    pub fn new(client: Claude) -> Self {
        Self {
            client,
            config: GeneratorConfig::default(),
        }
    }

    /// Build from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, claude::Error> {
        Ok(Self::new(Claude::from_env()?))
    }

    pub fn with_config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    fn request(&self, messages: Vec<Message>, system_prompt: &str, max_tokens: usize) -> Request {
        let request = Request::new(messages)
            .with_system(system_prompt)
            .with_max_tokens(max_tokens);
        match &self.config.model {
            Some(model) => request.with_model(model.clone()),
            None => request,
        }
    }
}

/// Map a participant-relative transcript onto API roles. The speaker's own
/// lines are the assistant's; everything else arrives as user turns, with
/// resolved events tagged so the model treats them as settled.
pub(crate) fn to_api_messages(history: &[TranscriptEntry]) -> Vec<Message> {
    history
        .iter()
        .map(|entry| match entry.role {
            TranscriptRole::Own => Message::assistant(entry.content.clone()),
            TranscriptRole::Other => Message::user(entry.content.clone()),
            TranscriptRole::Resolved => Message::user(format!("[Narrator: {}]", entry.content)),
        })
        .collect()
}

#[async_trait]
impl TextGenerator for ClaudeGenerator {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[TranscriptEntry],
    ) -> Result<String, GenerationError> {
        let request = self
            .request(
                to_api_messages(history),
                system_prompt,
                self.config.dialogue_max_tokens,
            )
            .with_temperature(self.config.dialogue_temperature);

        let response = self.client.complete(request).await?;
        let text = response.text().trim().to_string();
        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "dialogue generated"
        );
        if text.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(text)
    }

    async fn generate_structured(
        &self,
        task: StructuredTask,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, GenerationError> {
        let request = self
            .request(
                vec![Message::user(user_message)],
                system_prompt,
                self.config.max_tokens_for(task),
            )
            .with_temperature(0.0);

        let response = self.client.complete(request).await?;
        debug!(?task, raw = response.text(), "structured response");
        let text = response.text().trim().to_string();
        if text.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claude::Role;

    #[test]
    fn test_api_roles_follow_perspective() {
        let history = vec![
            TranscriptEntry::other("*Bram approaches you*"),
            TranscriptEntry::own("Morning, Bram."),
            TranscriptEntry::other("*hands over an apple*"),
            TranscriptEntry::resolved("Bram gives Ada an apple."),
        ];
        let messages = to_api_messages(&history);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[3].text, "[Narrator: Bram gives Ada an apple.]");
    }

    #[test]
    fn test_max_tokens_per_task() {
        let config = GeneratorConfig::default();
        assert_eq!(config.max_tokens_for(StructuredTask::Resolution), 500);
        assert_eq!(config.max_tokens_for(StructuredTask::Reflection), 200);
    }

    #[test]
    fn test_request_uses_model_override() {
        let generator = ClaudeGenerator::new(Claude::new("test-key")).with_config(GeneratorConfig {
            model: Some("claude-sonnet-4-5".into()),
            ..GeneratorConfig::default()
        });
        let request = generator.request(vec![Message::user("hi")], "system", 10);
        assert_eq!(request.model.as_deref(), Some("claude-sonnet-4-5"));
        assert_eq!(request.max_tokens, 10);
    }
}
