//! Interpret-then-resolve for a single completed line.

use super::generator::TextGenerator;
use super::interpreter::ActionInterpreter;
use super::resolver::OutcomeResolver;
use crate::conversation::{has_end_marker, TranscriptEntry};
use crate::effects::{ActionOutcome, InterpretedAction};
use crate::person::PersonSnapshot;
use crate::world::PersonId;
use std::sync::Arc;

/// Everything a worker learned about one line. Pure data; the orchestrator
/// applies it on the simulation thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReport {
    pub speaker: PersonId,
    pub listener: PersonId,
    pub action: Option<InterpretedAction>,
    pub outcome: Option<ActionOutcome>,
    pub ends_conversation: bool,
}

impl ActionReport {
    pub fn narrative(&self) -> Option<&str> {
        self.outcome
            .as_ref()
            .map(|o| o.narrative.as_str())
            .filter(|n| !n.is_empty())
    }
}

#[derive(Clone)]
pub struct ActionPipeline {
    interpreter: ActionInterpreter,
    resolver: OutcomeResolver,
}

impl ActionPipeline {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            interpreter: ActionInterpreter::new(generator.clone()),
            resolver: OutcomeResolver::new(generator),
        }
    }

    /// Run both stages for `line`. The end flag is set by either an explicit
    /// end marker in the line or an action that ends the conversation.
    pub async fn process(
        &self,
        line: &str,
        speaker: &PersonSnapshot,
        listener: &PersonSnapshot,
        transcript: &[TranscriptEntry],
    ) -> ActionReport {
        let action = self
            .interpreter
            .interpret(line, speaker, listener, transcript)
            .await;

        let outcome = match &action {
            Some(action) => Some(
                self.resolver
                    .resolve(action.clone(), speaker, listener, transcript)
                    .await,
            ),
            None => None,
        };

        let ends_conversation =
            has_end_marker(line) || action.as_ref().is_some_and(|a| a.ends_conversation);

        ActionReport {
            speaker: speaker.id,
            listener: listener.id,
            action,
            outcome,
            ends_conversation,
        }
    }
}
