//! Turns an interpreted action into concrete state deltas.

use super::generator::{StructuredTask, TextGenerator};
use super::interpreter::character_block;
use super::parse_json;
use crate::conversation::{TranscriptEntry, TranscriptRole};
use crate::effects::{ActionOutcome, EffectMap, InterpretedAction, RELATIONSHIP_DELTA_LIMIT};
use crate::person::PersonSnapshot;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

pub const RESOLVER_SYSTEM_PROMPT: &str = r#"You resolve actions in a social simulation of a small town. Given an action someone is attempting, decide what actually happens and which state changes follow.

## Guidelines
- Be realistic. Attacks can miss, thefts can be noticed, gifts are received.
- Effects must be concrete and small: a shove is a few points of health, not fifty.
- Only use items that appear in the current inventories when something changes hands.
- Gold cannot go below zero; do not take more gold than someone has.
- Anything already marked [Already resolved: ...] has happened. Do not apply it again.
- The relationship delta is how the TARGET now feels about the ACTOR, between -0.5 and 0.5.

## Effect keys
- "health": number (negative for damage)
- "gold": number (negative to lose gold)
- "add_condition" / "remove_condition": a condition name
- "add_items" / "remove_items": a list of item names

Leave out any key that does not change.

## Output Format
Respond with ONLY a JSON object:
{
  "success": true,
  "degree": 0.8,
  "narrative": "One or two short factual sentences.",
  "relationship_delta": -0.2,
  "actor_effects": {"gold": -5},
  "target_effects": {"gold": 5}
}"#;

/// Every field tolerates an explicit `null` as well as a missing key.
#[derive(Debug, Deserialize)]
struct ResolutionResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    degree: Option<f32>,
    #[serde(default)]
    narrative: Option<String>,
    #[serde(default)]
    relationship_delta: Option<f32>,
    #[serde(default)]
    actor_effects: Value,
    #[serde(default)]
    target_effects: Value,
}

const DEFAULT_DEGREE: f32 = 0.5;

/// Decides what an [`InterpretedAction`] actually does.
#[derive(Clone)]
pub struct OutcomeResolver {
    generator: Arc<dyn TextGenerator>,
}

impl OutcomeResolver {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Resolve `action`. Never fails: call and parse errors produce
    /// [`ActionOutcome::neutral`].
    pub async fn resolve(
        &self,
        action: InterpretedAction,
        actor: &PersonSnapshot,
        target: &PersonSnapshot,
        context: &[TranscriptEntry],
    ) -> ActionOutcome {
        let user_message = Self::user_message(&action, actor, target, context);

        let response = match self
            .generator
            .generate_structured(StructuredTask::Resolution, RESOLVER_SYSTEM_PROMPT, &user_message)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, action = %action.description, "resolution call failed");
                return ActionOutcome::neutral(action);
            }
        };

        match Self::parse(&response, action.clone(), actor, target) {
            Some(outcome) => {
                info!(
                    action = %outcome.action.description,
                    success = outcome.success,
                    degree = outcome.degree,
                    narrative = %outcome.narrative,
                    "action resolved"
                );
                outcome
            }
            None => {
                warn!(raw = %response, "could not parse resolution");
                ActionOutcome::neutral(action)
            }
        }
    }

    pub(crate) fn parse(
        response: &str,
        action: InterpretedAction,
        actor: &PersonSnapshot,
        target: &PersonSnapshot,
    ) -> Option<ActionOutcome> {
        let parsed: ResolutionResponse = parse_json(response).ok()?;

        let mut outcome = ActionOutcome {
            action,
            success: parsed.success.unwrap_or(false),
            degree: parsed.degree.unwrap_or(DEFAULT_DEGREE).clamp(0.0, 1.0),
            actor_effects: EffectMap::from_json(&parsed.actor_effects),
            target_effects: EffectMap::from_json(&parsed.target_effects),
            narrative: parsed.narrative.as_deref().unwrap_or_default().trim().to_string(),
            relationship_delta: parsed
                .relationship_delta
                .unwrap_or(0.0)
                .clamp(-RELATIONSHIP_DELTA_LIMIT, RELATIONSHIP_DELTA_LIMIT),
        };
        if outcome.narrative.is_empty() && outcome.has_effects() {
            outcome.narrative = mechanical_narrative(&outcome, &actor.name, &target.name);
        }
        Some(outcome)
    }

    fn user_message(
        action: &InterpretedAction,
        actor: &PersonSnapshot,
        target: &PersonSnapshot,
        context: &[TranscriptEntry],
    ) -> String {
        let mut message = String::new();

        if !context.is_empty() {
            message.push_str("## CONVERSATION SO FAR\n");
            for entry in context {
                let line = match entry.role {
                    TranscriptRole::Own => format!("{}: {}", actor.name, entry.content),
                    TranscriptRole::Other => format!("{}: {}", target.name, entry.content),
                    TranscriptRole::Resolved => format!("[Already resolved: {}]", entry.content),
                };
                message.push_str(&line);
                message.push('\n');
            }
            message.push('\n');
        }

        message.push_str(&format!(
            "## ACTION TO RESOLVE\n{} is attempting: {}\nIntent: {}\n\n",
            actor.name,
            action.description,
            if action.intent.is_empty() { "unclear" } else { &action.intent }
        ));
        message.push_str(&format!(
            "## CURRENT STATE\nACTOR: {}\n\nTARGET: {}\n\nWhat happens?",
            character_block(actor),
            character_block(target)
        ));
        message
    }
}

/// Plain clauses for every effect, target first, ending in a period.
fn mechanical_narrative(outcome: &ActionOutcome, actor: &str, target: &str) -> String {
    let mut clauses = outcome.target_effects.describe(target);
    clauses.extend(outcome.actor_effects.describe(actor));
    if clauses.is_empty() {
        return String::new();
    }
    format!("{}.", clauses.join(". "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::person::{Person, RoleType};
    use crate::testing::ScriptedGenerator;
    use crate::world::GridPos;

    fn setup() -> (PersonSnapshot, PersonSnapshot, InterpretedAction) {
        let actor = Person::new("Harold Baker", GridPos::new(0, 0), RoleType::Farmer).snapshot();
        let target = Person::new("Grace Mason", GridPos::new(1, 0), RoleType::Shopkeeper).snapshot();
        let action = InterpretedAction {
            description: "hands over 5 gold".into(),
            intent: "give".into(),
            actor_id: actor.id,
            target_id: target.id,
            is_physical: true,
            ends_conversation: false,
            confidence: 1.0,
        };
        (actor, target, action)
    }

    #[tokio::test]
    async fn test_resolves_gift() {
        let generator = Arc::new(ScriptedGenerator::new().with_structured(
            StructuredTask::Resolution,
            r#"```json
{"success": true, "degree": 1.0, "narrative": "Harold gives Grace 5 gold.",
 "relationship_delta": 0.1, "actor_effects": {"gold": -5, "health": 0},
 "target_effects": {"gold": 5, "add_condition": null}}
```"#,
        ));
        let resolver = OutcomeResolver::new(generator);
        let (actor, target, action) = setup();

        let outcome = resolver.resolve(action, &actor, &target, &[]).await;
        assert!(outcome.success);
        assert_eq!(outcome.actor_effects.len(), 1);
        assert_eq!(outcome.actor_effects.gold(), -5.0);
        assert_eq!(outcome.target_effects.len(), 1);
        assert_eq!(outcome.target_effects.gold(), 5.0);
        assert_eq!(outcome.narrative, "Harold gives Grace 5 gold.");
    }

    #[tokio::test]
    async fn test_call_failure_is_neutral() {
        let generator =
            Arc::new(ScriptedGenerator::new().failing_structured(StructuredTask::Resolution));
        let resolver = OutcomeResolver::new(generator);
        let (actor, target, action) = setup();

        let outcome = resolver.resolve(action, &actor, &target, &[]).await;
        assert!(!outcome.success);
        assert!(!outcome.has_effects());
        assert!(outcome.narrative.is_empty());
        assert_eq!(outcome.relationship_delta, 0.0);
    }

    #[tokio::test]
    async fn test_unparseable_response_is_neutral() {
        let generator = Arc::new(
            ScriptedGenerator::new().with_structured(StructuredTask::Resolution, "It works out."),
        );
        let resolver = OutcomeResolver::new(generator);
        let (actor, target, action) = setup();

        let outcome = resolver.resolve(action.clone(), &actor, &target, &[]).await;
        assert_eq!(outcome, ActionOutcome::neutral(action));
    }

    #[test]
    fn test_mechanical_narrative_order() {
        let (actor, target, action) = setup();
        let outcome = OutcomeResolver::parse(
            r#"{"success": true,
                "actor_effects": {"add_items": ["bread"], "gold": -3},
                "target_effects": {"remove_items": ["bread"], "gold": 3, "health": -2, "add_condition": "flustered"}}"#,
            action,
            &actor,
            &target,
        )
        .unwrap();
        assert_eq!(
            outcome.narrative,
            "Grace Mason loses 2 health. Grace Mason suffers flustered. Grace Mason receives 3 gold. \
             Grace Mason loses bread. Harold Baker loses 3 gold. Harold Baker receives bread."
        );
    }

    #[test]
    fn test_null_fields_fall_back_to_defaults() {
        let (actor, target, action) = setup();
        let outcome = OutcomeResolver::parse(
            r#"{"success": true, "degree": null, "narrative": null, "relationship_delta": null,
                "actor_effects": {"gold": -5}, "target_effects": {"gold": 5}}"#,
            action,
            &actor,
            &target,
        )
        .expect("null fields should not discard the outcome");
        assert!(outcome.success);
        assert_eq!(outcome.degree, DEFAULT_DEGREE);
        assert_eq!(outcome.relationship_delta, 0.0);
        assert_eq!(outcome.actor_effects.gold(), -5.0);
        assert_eq!(outcome.target_effects.gold(), 5.0);
        assert_eq!(outcome.narrative, "Grace Mason receives 5 gold. Harold Baker loses 5 gold.");
    }

    #[test]
    fn test_delta_and_degree_clamped() {
        let (actor, target, action) = setup();
        let outcome = OutcomeResolver::parse(
            r#"{"success": false, "degree": 4, "relationship_delta": -2.0}"#,
            action,
            &actor,
            &target,
        )
        .unwrap();
        assert_eq!(outcome.degree, 1.0);
        assert_eq!(outcome.relationship_delta, -RELATIONSHIP_DELTA_LIMIT);
        assert!(outcome.narrative.is_empty());
    }

    #[test]
    fn test_prompt_marks_resolved_events() {
        let (actor, target, action) = setup();
        let context = vec![
            TranscriptEntry::own("*hands over 5 gold*"),
            TranscriptEntry::resolved("Harold gives Grace 5 gold."),
        ];
        let message = OutcomeResolver::user_message(&action, &actor, &target, &context);
        assert!(message.contains("[Already resolved: Harold gives Grace 5 gold.]"));
        assert!(message.contains("Harold Baker is attempting: hands over 5 gold"));
        assert!(message.contains("## CURRENT STATE"));
    }
}
