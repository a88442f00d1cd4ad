//! Prompt construction for dialogue turns and post-conversation reflection.

use crate::conversation::{TranscriptEntry, TranscriptRole, END_CONVERSATION_MARKER};
use crate::person::Person;
use crate::world::GameClock;

/// System prompt for reflection calls.
pub const REFLECTION_SYSTEM_PROMPT: &str =
    "You are reflecting on a conversation you just had. Follow the format exactly.";

/// Where a speaker is within their allotted turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationPhase {
    /// Nothing has been said yet.
    Opening,
    Ongoing,
    /// Second-to-last own turn.
    WindingDown,
    /// Last own turn; the speaker should say goodbye.
    Closing,
}

impl ConversationPhase {
    /// Phase for a speaker on their `speaker_turn`-th turn (from 0).
    pub fn for_turn(speaker_turn: u32, max_turns: u32, is_first_line: bool) -> Self {
        if speaker_turn + 1 >= max_turns {
            ConversationPhase::Closing
        } else if speaker_turn + 2 >= max_turns {
            ConversationPhase::WindingDown
        } else if is_first_line {
            ConversationPhase::Opening
        } else {
            ConversationPhase::Ongoing
        }
    }

    fn hint(&self) -> Option<String> {
        match self {
            ConversationPhase::Closing => Some(format!(
                "**This conversation has been going on a while. Wrap up and say goodbye now. \
                 Put {END_CONVERSATION_MARKER} after your farewell.**"
            )),
            ConversationPhase::WindingDown => Some(
                "*The conversation is winding down. Consider wrapping up naturally.*".to_string(),
            ),
            ConversationPhase::Opening | ConversationPhase::Ongoing => None,
        }
    }
}

/// Builds the text handed to the generator. Implementations must be pure.
pub trait PromptBuilder: Send + Sync {
    /// System prompt for `speaker`'s next line to `listener`.
    fn conversation_prompt(
        &self,
        speaker: &Person,
        listener: &Person,
        phase: ConversationPhase,
        clock: &GameClock,
    ) -> String;

    /// User message asking `owner` to reflect on a finished conversation with `other`.
    fn reflection_prompt(&self, owner: &Person, other: &Person, transcript: &[TranscriptEntry]) -> String;
}

/// Default prompts for the town.
#[derive(Debug, Clone, Copy, Default)]
pub struct TownPromptBuilder;

impl TownPromptBuilder {
    fn personality_description(person: &Person) -> String {
        let p = &person.personality;

        let traits: Vec<String> = p
            .traits
            .iter()
            .filter_map(|(name, value)| match *value {
                v if v > 0.7 => Some(format!("very {name}")),
                v if v > 0.5 => Some(format!("somewhat {name}")),
                v if v < 0.3 => Some(format!("not very {name}")),
                _ => None,
            })
            .take(4)
            .collect();
        let traits = if traits.is_empty() {
            "average in most regards".to_string()
        } else {
            traits.join(", ")
        };

        let quirks = if p.quirks.is_empty() {
            "no particular quirks".to_string()
        } else {
            p.quirks.join("; ")
        };
        let goals = if p.goals.is_empty() {
            "live a peaceful life".to_string()
        } else {
            p.goals.join("; ")
        };

        let mut out = String::new();
        if !p.background.is_empty() {
            out.push_str(&p.background);
            out.push_str("\n\n");
        }
        out.push_str(&format!("Personality traits: You are {traits}.\n"));
        out.push_str(&format!("Speech style: You speak in a {} manner.\n", p.speech_style));
        out.push_str(&format!("Quirks: {quirks}\n"));
        out.push_str(&format!("Current goals: {goals}"));
        out
    }

    fn relationship_description(speaker: &Person, listener: &Person) -> String {
        let Some(rel) = speaker.relationship(listener.id) else {
            return format!(
                "You don't know {} yet. This is your first meeting.",
                listener.name
            );
        };

        let name = &listener.name;
        let feeling = match rel.feeling {
            f if f > 0.7 => format!("You consider {name} a close friend and trust them"),
            f if f > 0.4 => format!("You like {name} and enjoy their company"),
            f if f > 0.1 => format!("You have a positive impression of {name}"),
            f if f > -0.1 => format!("You feel neutral about {name}"),
            f if f > -0.4 => format!("You're wary of {name}"),
            f if f > -0.7 => format!("You dislike {name}"),
            _ => format!("You strongly distrust {name}"),
        };

        let mut out = format!(
            "{feeling}. You've spoken {} times before.\n",
            rel.interaction_count
        );
        if rel.history.is_empty() {
            out.push_str("No significant past interactions.");
        } else {
            out.push_str("Recent interactions:");
            for summary in rel.history.iter().rev().take(3).rev() {
                out.push_str(&format!("\n- {summary}"));
            }
        }
        if !rel.notes.is_empty() {
            out.push_str("\nYour observations about them:");
            for note in &rel.notes {
                out.push_str(&format!("\n- {note}"));
            }
        }
        out
    }
}

impl PromptBuilder for TownPromptBuilder {
    fn conversation_prompt(
        &self,
        speaker: &Person,
        listener: &Person,
        phase: ConversationPhase,
        clock: &GameClock,
    ) -> String {
        let mut prompt = format!(
            "You are {}, a {} in a small town.\n\n",
            speaker.name, speaker.role.role_type
        );

        prompt.push_str("## Your Personality\n");
        prompt.push_str(&Self::personality_description(speaker));

        prompt.push_str("\n\n## Current Situation\n");
        prompt.push_str(&format!(
            "- Time: {} ({}) on Day {}\n",
            clock.time_string(),
            clock.time_of_day(),
            clock.day()
        ));
        prompt.push_str(&format!(
            "- Your health: {:.0}/{:.0}\n",
            speaker.health, speaker.max_health
        ));
        prompt.push_str(&format!("- Your conditions: {}\n", speaker.conditions_string()));
        prompt.push_str(&format!("- Your money: {:.0} gold\n", speaker.money));
        prompt.push_str(&format!("- Your inventory: {}\n", speaker.inventory_string()));
        prompt.push_str(&format!(
            "- {} looks {}\n",
            listener.name,
            describe_health(listener)
        ));

        prompt.push_str(&format!("\n## Your Relationship with {}\n", listener.name));
        prompt.push_str(&Self::relationship_description(speaker, listener));

        prompt.push_str(&format!(
            "\n\n## Conversation Instructions\n\
             - Stay completely in character as {name}\n\
             - Your responses should reflect your personality traits\n\
             - Keep responses to 1-2 sentences (this is casual town conversation)\n\
             - Consider your relationship history when responding\n\
             - Lines marked [Narrator: ...] have already happened; do not repeat them\n\n\
             ## Actions\n\
             - Put anything you physically do between asterisks, e.g. *hands over 5 gold*\n\
             - Only describe what you do, never what the other person does\n\
             - To end the conversation, say goodbye and add {END_CONVERSATION_MARKER}",
            name = speaker.name
        ));

        if let Some(hint) = phase.hint() {
            prompt.push_str("\n\n");
            prompt.push_str(&hint);
        }
        prompt
    }

    fn reflection_prompt(&self, owner: &Person, other: &Person, transcript: &[TranscriptEntry]) -> String {
        let conversation = transcript
            .iter()
            .map(|entry| match entry.role {
                TranscriptRole::Own => format!("{}: {}", owner.name, entry.content),
                TranscriptRole::Other => format!("{}: {}", other.name, entry.content),
                TranscriptRole::Resolved => format!("[{}]", entry.content),
            })
            .collect::<Vec<_>>()
            .join("\n");

        let previous = owner
            .relationship(other.id)
            .filter(|rel| !rel.notes.is_empty())
            .map(|rel| {
                let recent: Vec<&str> = rel.notes.iter().rev().take(3).rev().map(String::as_str).collect();
                format!("Your previous observations:\n- {}\n\n", recent.join("\n- "))
            })
            .unwrap_or_default();

        format!(
            "You are {owner_name}, a {role}. You just finished a conversation with {other_name}.\n\n\
             {previous}\
             ## The Conversation\n\
             {conversation}\n\n\
             ## Your Task\n\
             Reflect on this conversation from {owner_name}'s perspective. Provide:\n\n\
             1. SUMMARY: A brief 1-sentence summary of what happened\n\
             2. FEELING: A number from -0.3 to +0.3 for how this changed your feelings toward {other_name}\n\
             3. OBSERVATION: One specific thing you noticed or learned about {other_name} worth remembering\n\n\
             Format your response EXACTLY like this:\n\
             SUMMARY: [your summary]\n\
             FEELING: [number between -0.3 and 0.3]\n\
             OBSERVATION: [specific observation to remember, or \"nothing notable\"]",
            owner_name = owner.name,
            role = owner.role.role_type,
            other_name = other.name,
        )
    }
}

/// Outward appearance of someone's health, as seen by their partner.
fn describe_health(person: &Person) -> &'static str {
    let ratio = if person.max_health > 0.0 {
        person.health / person.max_health
    } else {
        0.0
    };
    match ratio {
        r if r >= 0.9 => "healthy",
        r if r >= 0.5 => "a little worse for wear",
        r if r > 0.2 => "badly hurt",
        _ => "close to collapse",
    }
}
