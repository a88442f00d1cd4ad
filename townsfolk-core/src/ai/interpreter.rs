//! Detects attempted actions in a line of dialogue.

use super::generator::{StructuredTask, TextGenerator};
use super::{parse_json, ParseError};
use crate::conversation::{action_markers, TranscriptEntry, TranscriptRole};
use crate::effects::InterpretedAction;
use crate::person::PersonSnapshot;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Explicit `null`s read the same as missing keys.
#[derive(Debug, Deserialize)]
struct InterpretationResponse {
    #[serde(default)]
    action_detected: Option<bool>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    is_physical: Option<bool>,
    #[serde(default)]
    ends_conversation: Option<bool>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Classifies dialogue into an optional [`InterpretedAction`].
///
/// Only lines carrying a `*...*` marker reach the generator; everything else
/// is plain talk.
#[derive(Clone)]
pub struct ActionInterpreter {
    generator: Arc<dyn TextGenerator>,
}

impl ActionInterpreter {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Interpret `line`, spoken by `speaker` to `listener`.
    ///
    /// `context` is the transcript from the speaker's perspective. Transport
    /// and parse failures both come back as `None`.
    pub async fn interpret(
        &self,
        line: &str,
        speaker: &PersonSnapshot,
        listener: &PersonSnapshot,
        context: &[TranscriptEntry],
    ) -> Option<InterpretedAction> {
        let markers = action_markers(line);
        if markers.is_empty() {
            debug!(speaker = %speaker.name, "no action markers, skipping interpretation");
            return None;
        }

        let system_prompt = Self::system_prompt(speaker, listener);
        let user_message = Self::user_message(line, speaker, listener, context);

        let response = match self
            .generator
            .generate_structured(StructuredTask::Interpretation, &system_prompt, &user_message)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, speaker = %speaker.name, "interpretation call failed");
                return None;
            }
        };

        match Self::parse(&response, &markers, speaker, listener) {
            Ok(Some(action)) => {
                info!(
                    speaker = %speaker.name,
                    action = %action.description,
                    intent = %action.intent,
                    physical = action.is_physical,
                    "action detected"
                );
                Some(action)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, raw = %response, "could not parse interpretation");
                None
            }
        }
    }

    pub(crate) fn parse(
        response: &str,
        markers: &[String],
        speaker: &PersonSnapshot,
        listener: &PersonSnapshot,
    ) -> Result<Option<InterpretedAction>, ParseError> {
        let parsed: InterpretationResponse = parse_json(response)?;
        if !parsed.action_detected.unwrap_or(false) {
            return Ok(None);
        }
        Ok(Some(InterpretedAction {
            description: literal_description(parsed.description.as_deref().unwrap_or_default(), markers),
            intent: parsed.intent.as_deref().unwrap_or_default().trim().to_string(),
            actor_id: speaker.id,
            target_id: listener.id,
            is_physical: parsed.is_physical.unwrap_or(false),
            ends_conversation: parsed.ends_conversation.unwrap_or(false),
            confidence: parsed.confidence.unwrap_or(1.0).clamp(0.0, 1.0),
        }))
    }

    fn system_prompt(speaker: &PersonSnapshot, listener: &PersonSnapshot) -> String {
        format!(
            r#"You are an action interpreter for a social simulation. Detect actions that would meaningfully change a character's state.

## Characters

SPEAKER: {speaker_block}

LISTENER: {listener_block}

## What to Detect

Detect any action, happening right now in this message, that changes health, conditions, inventory, gold, or relationships:
- Violence (punches, shoves) -> health or condition changes
- Giving or taking items or gold -> inventory or money changes
- Theft attempts
- Actually leaving the conversation

Only actions marked with *asterisks* count:
- "*hands over 5 gold*" -> DETECT
- "Would you like to buy this?" -> NOT an action

Lines marked [RESOLVED ACTION: ...] have already been handled. Never detect them again.

## What to Ignore

Mundane gestures with no state change: looking, leaning, nodding, smiling, sighing, shrugging, waving, pointing.

## Output Format

Respond with ONLY a JSON object:
{{"action_detected": false}}

or, if a meaningful action is happening:
{{
  "action_detected": true,
  "description": "ONLY the literal text inside the asterisks",
  "intent": "the goal (harm, help, steal, give, leave, ...)",
  "is_physical": true,
  "ends_conversation": false
}}

## Rules
1. Default to no action. Most messages are just talk.
2. Offers and proposals are not actions.
3. The description is literal. For "*hands over 8 gold*" write "hands over 8 gold", not "pays for the apple"."#,
            speaker_block = character_block(speaker),
            listener_block = character_block(listener),
        )
    }

    fn user_message(
        line: &str,
        speaker: &PersonSnapshot,
        listener: &PersonSnapshot,
        context: &[TranscriptEntry],
    ) -> String {
        let history = if context.is_empty() {
            "(Conversation just started)".to_string()
        } else {
            context
                .iter()
                .map(|entry| match entry.role {
                    TranscriptRole::Own => format!("- {}: {}", speaker.name, entry.content),
                    TranscriptRole::Other => format!("- {}: {}", listener.name, entry.content),
                    TranscriptRole::Resolved => format!("[RESOLVED ACTION: {}]", entry.content),
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "## Recent Conversation\n{history}\n\n\
             ## Latest Message (from {name}):\n\"{line}\"\n\n\
             Is the speaker attempting any ACTION (not just talking)?",
            name = speaker.name
        )
    }
}

pub(crate) fn character_block(person: &PersonSnapshot) -> String {
    format!(
        "{}\n- Role: {}\n- Health: {:.0}/{:.0}\n- Conditions: {}\n- Inventory: {}\n- Gold: {:.0}",
        person.name,
        person.role,
        person.health,
        person.max_health,
        person.conditions,
        person.inventory,
        person.money
    )
}

/// Keep the model's description only if it restates marked text; otherwise
/// fall back to the markers themselves.
///
/// A restatement is a whole marker, or a piece of one covering more than
/// half of it. Fragments like "over" or "5" do not count.
fn literal_description(described: &str, markers: &[String]) -> String {
    let described = described.trim().trim_matches('*').trim();
    let lower = described.to_lowercase();
    if !lower.is_empty() && markers.iter().any(|m| restates(&lower, m)) {
        return described.to_string();
    }
    markers.join("; ")
}

fn restates(described: &str, marker: &str) -> bool {
    let marker = marker.trim().to_lowercase();
    described == marker
        || (marker.contains(described)
            && described.chars().count() * 2 > marker.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::person::{Person, RoleType};
    use crate::testing::ScriptedGenerator;
    use crate::world::GridPos;

    fn snapshots() -> (PersonSnapshot, PersonSnapshot) {
        (
            Person::new("Harold Baker", GridPos::new(0, 0), RoleType::Farmer).snapshot(),
            Person::new("Grace Mason", GridPos::new(1, 0), RoleType::Shopkeeper).snapshot(),
        )
    }

    #[tokio::test]
    async fn test_plain_dialogue_skips_generator() {
        let generator = Arc::new(ScriptedGenerator::new());
        let interpreter = ActionInterpreter::new(generator.clone());
        let (harold, grace) = snapshots();

        let result = interpreter
            .interpret("How much for the bread?", &harold, &grace, &[])
            .await;
        assert!(result.is_none());
        assert_eq!(generator.structured_call_count(StructuredTask::Interpretation), 0);
    }

    #[tokio::test]
    async fn test_detects_literal_action() {
        let generator = Arc::new(ScriptedGenerator::new().with_structured(
            StructuredTask::Interpretation,
            r#"{"action_detected": true, "description": "hands over 5 gold", "intent": "give", "is_physical": true}"#,
        ));
        let interpreter = ActionInterpreter::new(generator.clone());
        let (harold, grace) = snapshots();

        let action = interpreter
            .interpret("Here you are. *hands over 5 gold*", &harold, &grace, &[])
            .await
            .unwrap();
        assert_eq!(action.description, "hands over 5 gold");
        assert_eq!(action.actor_id, harold.id);
        assert_eq!(action.target_id, grace.id);
        assert_eq!(action.confidence, 1.0);
        assert!(!action.ends_conversation);
    }

    #[tokio::test]
    async fn test_inferred_description_replaced_with_marker() {
        let generator = Arc::new(ScriptedGenerator::new().with_structured(
            StructuredTask::Interpretation,
            r#"{"action_detected": true, "description": "Harold pays Grace for the bread", "intent": "give"}"#,
        ));
        let interpreter = ActionInterpreter::new(generator);
        let (harold, grace) = snapshots();

        let action = interpreter
            .interpret("*hands over 5 gold*", &harold, &grace, &[])
            .await
            .unwrap();
        assert_eq!(action.description, "hands over 5 gold");
    }

    #[tokio::test]
    async fn test_malformed_response_is_no_action() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .with_structured(StructuredTask::Interpretation, "I think they gave gold?"),
        );
        let interpreter = ActionInterpreter::new(generator);
        let (harold, grace) = snapshots();
        assert!(interpreter
            .interpret("*hands over 5 gold*", &harold, &grace, &[])
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_call_failure_is_no_action() {
        let generator =
            Arc::new(ScriptedGenerator::new().failing_structured(StructuredTask::Interpretation));
        let interpreter = ActionInterpreter::new(generator);
        let (harold, grace) = snapshots();
        assert!(interpreter
            .interpret("*shoves Grace*", &harold, &grace, &[])
            .await
            .is_none());
    }

    #[test]
    fn test_context_marks_resolved_actions() {
        let (harold, grace) = snapshots();
        let context = vec![
            TranscriptEntry::other("*hands over bread*"),
            TranscriptEntry::resolved("Grace gives Harold bread."),
            TranscriptEntry::own("*hands over 5 gold*"),
        ];
        let message = ActionInterpreter::user_message("*hands over 5 gold*", &harold, &grace, &context);
        assert!(message.contains("- Grace Mason: *hands over bread*"));
        assert!(message.contains("[RESOLVED ACTION: Grace gives Harold bread.]"));
        assert!(message.contains("- Harold Baker: *hands over 5 gold*"));
    }

    #[test]
    fn test_literal_description() {
        let markers = vec!["smiles".to_string(), "hands over 5 gold".to_string()];
        assert_eq!(literal_description("*hands over 5 gold*", &markers), "hands over 5 gold");
        assert_eq!(literal_description("", &markers), "smiles; hands over 5 gold");
        assert_eq!(
            literal_description("completes the purchase", &markers),
            "smiles; hands over 5 gold"
        );
    }

    #[test]
    fn test_marker_fragments_are_not_literal() {
        let markers = vec!["hands over 5 gold".to_string()];
        assert_eq!(literal_description("5", &markers), "hands over 5 gold");
        assert_eq!(literal_description("over", &markers), "hands over 5 gold");
        assert_eq!(literal_description("Hands Over 5 Gold", &markers), "Hands Over 5 Gold");
        assert_eq!(literal_description("hands over 5", &markers), "hands over 5");
    }

    #[test]
    fn test_null_fields_still_detect_action() {
        let (harold, grace) = snapshots();
        let markers = vec!["punches Grace".to_string()];
        let action = ActionInterpreter::parse(
            r#"{"action_detected": true, "description": "punches Grace", "intent": null,
                "is_physical": true, "ends_conversation": null, "confidence": null}"#,
            &markers,
            &harold,
            &grace,
        )
        .expect("null fields should parse")
        .expect("the action was detected");
        assert_eq!(action.description, "punches Grace");
        assert!(action.intent.is_empty());
        assert!(action.is_physical);
        assert!(!action.ends_conversation);
        assert_eq!(action.confidence, 1.0);

        let described_null = ActionInterpreter::parse(
            r#"{"action_detected": true, "description": null}"#,
            &markers,
            &harold,
            &grace,
        )
        .unwrap()
        .unwrap();
        assert_eq!(described_null.description, "punches Grace");

        let none = ActionInterpreter::parse(r#"{"action_detected": null}"#, &markers, &harold, &grace);
        assert!(matches!(none, Ok(None)));
    }

    #[test]
    fn test_parse_clamps_confidence() {
        let (harold, grace) = snapshots();
        let markers = vec!["punches".to_string()];
        let action = ActionInterpreter::parse(
            r#"{"action_detected": true, "description": "punches", "confidence": 3.5, "ends_conversation": true}"#,
            &markers,
            &harold,
            &grace,
        )
        .unwrap()
        .unwrap();
        assert_eq!(action.confidence, 1.0);
        assert!(action.ends_conversation);
    }
}
