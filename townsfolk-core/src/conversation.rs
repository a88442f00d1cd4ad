//! Conversation state machine: the message log and turn-taking state for one
//! paired interaction.
//!
//! A conversation moves strictly forward through
//! `Starting -> Active -> Ending -> Ended`. The participants' conversation flags
//! live on their [`Person`](crate::person::Person) records and are only ever
//! set by [`Conversation::start`] and cleared by [`Conversation::end`].

use crate::world::{Direction, EntityStore, PersonId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Explicit end-of-conversation signal a speaker may append to their line.
pub const END_CONVERSATION_MARKER: &str = "[END_CONVERSATION]";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("a person cannot talk to themselves")]
    SameParticipant,

    #[error("unknown person: {0}")]
    UnknownParticipant(PersonId),

    #[error("{0} is already in a conversation")]
    AlreadyInConversation(PersonId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state. Ordering follows the only allowed direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConversationState {
    Starting,
    Active,
    Ending,
    Ended,
}

/// One entry in the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Dialogue {
        speaker_id: PersonId,
        speaker_name: String,
        text: String,
        /// Literal `*...*` action markers found in `text`.
        actions: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    /// Outcome narrative injected by the orchestrator. Not a turn.
    Narration {
        text: String,
        timestamp: DateTime<Utc>,
    },
}

impl Message {
    pub fn text(&self) -> &str {
        match self {
            Message::Dialogue { text, .. } | Message::Narration { text, .. } => text,
        }
    }

    pub fn is_narration(&self) -> bool {
        matches!(self, Message::Narration { .. })
    }
}

/// Who a transcript line belongs to, from one participant's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranscriptRole {
    /// The participant whose perspective this is.
    Own,
    /// Their conversation partner.
    Other,
    /// An already-resolved event, attributed to neither side.
    Resolved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub content: String,
}

impl TranscriptEntry {
    pub fn own(content: impl Into<String>) -> Self {
        Self {
            role: TranscriptRole::Own,
            content: content.into(),
        }
    }

    pub fn other(content: impl Into<String>) -> Self {
        Self {
            role: TranscriptRole::Other,
            content: content.into(),
        }
    }

    pub fn resolved(content: impl Into<String>) -> Self {
        Self {
            role: TranscriptRole::Resolved,
            content: content.into(),
        }
    }
}

/// A log entry prepared for a dialogue panel.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayMessage {
    /// `None` for narration.
    pub speaker: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    id: ConversationId,
    participants: [PersonId; 2],
    names: [String; 2],
    state: ConversationState,
    messages: Vec<Message>,
    /// Index into `participants`.
    current_speaker: usize,
    turn_count: u32,
    max_turns: u32,
    created_at: DateTime<Utc>,
}

impl Conversation {
    /// Pair two people up and mark both as in conversation.
    ///
    /// `initiator` speaks first. `max_turns` is per participant.
    pub fn start(
        store: &mut EntityStore,
        initiator: PersonId,
        partner: PersonId,
        max_turns: u32,
    ) -> Result<Self, ConversationError> {
        if initiator == partner {
            return Err(ConversationError::SameParticipant);
        }
        let mut names = [String::new(), String::new()];
        for (slot, id) in [initiator, partner].into_iter().enumerate() {
            let person = store
                .get(id)
                .ok_or(ConversationError::UnknownParticipant(id))?;
            if person.in_conversation {
                return Err(ConversationError::AlreadyInConversation(id));
            }
            names[slot] = person.name.clone();
        }

        let positions = [initiator, partner].map(|id| store.get(id).map(|p| p.position));
        for (me, other, mine, theirs) in [
            (initiator, partner, positions[0], positions[1]),
            (partner, initiator, positions[1], positions[0]),
        ] {
            if let Some(person) = store.get_mut(me) {
                person.in_conversation = true;
                person.conversation_partner = Some(other);
                if let Some(facing) = mine.zip(theirs).and_then(|(a, b)| Direction::between(a, b)) {
                    person.facing = facing;
                }
            }
        }

        Ok(Self {
            id: ConversationId::new(),
            participants: [initiator, partner],
            names,
            state: ConversationState::Starting,
            messages: Vec::new(),
            current_speaker: 0,
            turn_count: 0,
            max_turns: max_turns.max(1),
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> ConversationId {
        self.id
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn participants(&self) -> [PersonId; 2] {
        self.participants
    }

    pub fn involves(&self, person: PersonId) -> bool {
        self.participants.contains(&person)
    }

    pub fn name_of(&self, person: PersonId) -> Option<&str> {
        self.slot_of(person).map(|slot| self.names[slot].as_str())
    }

    pub fn other_participant(&self, person: PersonId) -> Option<PersonId> {
        self.slot_of(person).map(|slot| self.participants[1 - slot])
    }

    pub fn current_speaker(&self) -> PersonId {
        self.participants[self.current_speaker]
    }

    pub fn current_listener(&self) -> PersonId {
        self.participants[1 - self.current_speaker]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    /// Total dialogue lines allowed: both participants get `max_turns` each.
    pub fn turn_ceiling(&self) -> u32 {
        self.max_turns * 2
    }

    /// The current speaker's own turn number, starting at 0.
    pub fn speaker_turn(&self) -> u32 {
        self.turn_count / 2
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// True while `Starting` or `Active`.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            ConversationState::Starting | ConversationState::Active
        )
    }

    pub fn is_ended(&self) -> bool {
        self.state == ConversationState::Ended
    }

    fn slot_of(&self, person: PersonId) -> Option<usize> {
        self.participants.iter().position(|p| *p == person)
    }

    fn advance_to(&mut self, next: ConversationState) {
        if next > self.state {
            self.state = next;
        }
    }

    /// Append a spoken line. Returns false if the line was not recorded
    /// (ended conversation or a speaker who is not a participant).
    pub fn add_message(&mut self, speaker: PersonId, text: &str) -> bool {
        if self.is_ended() {
            return false;
        }
        let Some(slot) = self.slot_of(speaker) else {
            return false;
        };

        self.messages.push(Message::Dialogue {
            speaker_id: speaker,
            speaker_name: self.names[slot].clone(),
            text: text.to_string(),
            actions: action_markers(text),
            timestamp: Utc::now(),
        });
        self.turn_count += 1;

        self.advance_to(ConversationState::Active);
        if self.turn_count >= self.turn_ceiling() {
            self.advance_to(ConversationState::Ending);
        }
        true
    }

    /// Append an outcome narrative. Empty text is ignored.
    pub fn add_narrator_message(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() || self.is_ended() {
            return;
        }
        self.messages.push(Message::Narration {
            text: text.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Hand the floor to the other participant. Returns the new speaker.
    pub fn switch_speaker(&mut self) -> PersonId {
        self.current_speaker = 1 - self.current_speaker;
        self.current_speaker()
    }

    /// Move to `Ending` if not already there or beyond.
    pub fn begin_ending(&mut self) {
        self.advance_to(ConversationState::Ending);
    }

    /// Finalize: mark `Ended` and release both participants.
    ///
    /// A second call does nothing. Flags are only cleared on people still
    /// paired with each other, so a participant who has since joined another
    /// conversation is left alone.
    pub fn end(&mut self, store: &mut EntityStore) {
        if self.is_ended() {
            return;
        }
        self.state = ConversationState::Ended;
        let [a, b] = self.participants;
        for (me, other) in [(a, b), (b, a)] {
            if let Some(person) = store.get_mut(me) {
                if person.conversation_partner == Some(other) {
                    person.in_conversation = false;
                    person.conversation_partner = None;
                }
            }
        }
    }

    /// The log from `perspective`'s point of view.
    pub fn get_messages_for_api(&self, perspective: PersonId) -> Vec<TranscriptEntry> {
        self.messages
            .iter()
            .map(|message| match message {
                Message::Dialogue {
                    speaker_id, text, ..
                } if *speaker_id == perspective => TranscriptEntry::own(text.clone()),
                Message::Dialogue { text, .. } => TranscriptEntry::other(text.clone()),
                Message::Narration { text, .. } => TranscriptEntry::resolved(text.clone()),
            })
            .collect()
    }

    /// The log with action markers stripped from dialogue. Lines that are
    /// nothing but markers are left out.
    pub fn get_display_messages(&self) -> Vec<DisplayMessage> {
        self.messages
            .iter()
            .filter_map(|message| match message {
                Message::Dialogue {
                    speaker_name, text, ..
                } => {
                    let stripped = strip_markers(text);
                    (!stripped.is_empty()).then(|| DisplayMessage {
                        speaker: Some(speaker_name.clone()),
                        text: stripped,
                    })
                }
                Message::Narration { text, .. } => Some(DisplayMessage {
                    speaker: None,
                    text: text.clone(),
                }),
            })
            .collect()
    }

    /// Plain `Name: line` rendering, used in reflection prompts and logs.
    pub fn transcript_text(&self) -> String {
        self.messages
            .iter()
            .map(|message| match message {
                Message::Dialogue {
                    speaker_name, text, ..
                } => format!("{speaker_name}: {text}"),
                Message::Narration { text, .. } => format!("[{text}]"),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// Markers
// ============================================================================

/// Literal `*...*` segments in a line, without the asterisks.
pub fn action_markers(text: &str) -> Vec<String> {
    let mut markers = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('*') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('*') else {
            break;
        };
        let inner = &after[..close];
        if inner.is_empty() {
            // "**" is not a marker; the second star may open one.
            rest = after;
            continue;
        }
        markers.push(inner.trim().to_string());
        rest = &after[close + 1..];
    }
    markers
}

/// True when the line has at least one non-empty `*...*` marker.
pub fn has_action_marker(text: &str) -> bool {
    !action_markers(text).is_empty()
}

pub fn has_end_marker(text: &str) -> bool {
    text.contains(END_CONVERSATION_MARKER)
}

/// Remove `*...*` and `[...]` segments and collapse whitespace.
pub fn strip_markers(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let closing = match c {
            '*' => Some('*'),
            '[' => Some(']'),
            _ => None,
        };
        if let Some(closing) = closing {
            let rest = &text[i + c.len_utf8()..];
            if let Some(end) = rest.find(closing) {
                if end > 0 {
                    let skip_to = i + c.len_utf8() + end + closing.len_utf8();
                    while chars.peek().is_some_and(|(j, _)| *j < skip_to) {
                        chars.next();
                    }
                    out.push(' ');
                    continue;
                }
            }
        }
        out.push(c);
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::person::{Person, RoleType};
    use crate::world::GridPos;

    fn pair() -> (EntityStore, PersonId, PersonId) {
        let mut store = EntityStore::new();
        let a = store.insert(Person::new("Ada", GridPos::new(1, 1), RoleType::Farmer));
        let b = store.insert(Person::new("Bram", GridPos::new(2, 1), RoleType::Blacksmith));
        (store, a, b)
    }

    #[test]
    fn test_start_sets_symmetric_flags() {
        let (mut store, a, b) = pair();
        let convo = Conversation::start(&mut store, a, b, 3).unwrap();
        assert_eq!(convo.state(), ConversationState::Starting);
        assert_eq!(convo.current_speaker(), a);

        let ada = store.get(a).unwrap();
        let bram = store.get(b).unwrap();
        assert!(ada.in_conversation && bram.in_conversation);
        assert_eq!(ada.conversation_partner, Some(b));
        assert_eq!(bram.conversation_partner, Some(a));
        assert_eq!(ada.facing, Direction::East);
        assert_eq!(bram.facing, Direction::West);
    }

    #[test]
    fn test_start_rejects_busy_or_unknown() {
        let (mut store, a, b) = pair();
        let c = store.insert(Person::new("Cora", GridPos::new(5, 5), RoleType::Guard));
        assert_eq!(
            Conversation::start(&mut store, a, a, 3).unwrap_err(),
            ConversationError::SameParticipant
        );
        let ghost = PersonId::new();
        assert_eq!(
            Conversation::start(&mut store, a, ghost, 3).unwrap_err(),
            ConversationError::UnknownParticipant(ghost)
        );
        Conversation::start(&mut store, a, b, 3).unwrap();
        assert_eq!(
            Conversation::start(&mut store, c, b, 3).unwrap_err(),
            ConversationError::AlreadyInConversation(b)
        );
    }

    #[test]
    fn test_ceiling_reached_exactly() {
        let (mut store, a, b) = pair();
        let max_turns = 3;
        let mut convo = Conversation::start(&mut store, a, b, max_turns).unwrap();
        for i in 0..(2 * max_turns) {
            assert!(convo.is_active(), "ended early at turn {i}");
            let speaker = convo.current_speaker();
            convo.add_message(speaker, "Hello there.");
            convo.switch_speaker();
        }
        assert_eq!(convo.state(), ConversationState::Ending);
        assert_eq!(convo.turn_count(), 6);
    }

    #[test]
    fn test_first_message_activates() {
        let (mut store, a, b) = pair();
        let mut convo = Conversation::start(&mut store, a, b, 3).unwrap();
        convo.add_message(a, "Morning!");
        assert_eq!(convo.state(), ConversationState::Active);
        assert_eq!(convo.messages().len(), 1);
    }

    #[test]
    fn test_narration_does_not_count() {
        let (mut store, a, b) = pair();
        let mut convo = Conversation::start(&mut store, a, b, 3).unwrap();
        convo.add_message(a, "*hands over bread*");
        convo.add_narrator_message("Ada gives Bram bread.");
        convo.add_narrator_message("   ");
        assert_eq!(convo.turn_count(), 1);
        assert_eq!(convo.messages().len(), 2);
    }

    #[test]
    fn test_states_only_move_forward() {
        let (mut store, a, b) = pair();
        let mut convo = Conversation::start(&mut store, a, b, 1).unwrap();
        convo.begin_ending();
        assert_eq!(convo.state(), ConversationState::Ending);
        // A line spoken while ending does not reactivate.
        convo.add_message(a, "Goodbye!");
        assert_eq!(convo.state(), ConversationState::Ending);
        convo.end(&mut store);
        assert_eq!(convo.state(), ConversationState::Ended);
        assert!(!convo.add_message(b, "Wait!"));
        convo.begin_ending();
        assert_eq!(convo.state(), ConversationState::Ended);
    }

    #[test]
    fn test_end_clears_flags_and_is_idempotent() {
        let (mut store, a, b) = pair();
        let mut convo = Conversation::start(&mut store, a, b, 2).unwrap();
        convo.end(&mut store);
        convo.end(&mut store);
        for id in [a, b] {
            let person = store.get(id).unwrap();
            assert!(!person.in_conversation);
            assert_eq!(person.conversation_partner, None);
        }

        // Ada moves on to a new partner; the stale conversation must not touch her.
        let c = store.insert(Person::new("Cora", GridPos::new(1, 2), RoleType::Guard));
        let _next = Conversation::start(&mut store, a, c, 2).unwrap();
        convo.end(&mut store);
        assert!(store.get(a).unwrap().in_conversation);
    }

    #[test]
    fn test_end_tolerates_missing_participant() {
        let (mut store, a, b) = pair();
        let mut convo = Conversation::start(&mut store, a, b, 2).unwrap();
        store.remove(b);
        convo.end(&mut store);
        assert!(!store.get(a).unwrap().in_conversation);
    }

    #[test]
    fn test_messages_for_api_perspective() {
        let (mut store, a, b) = pair();
        let mut convo = Conversation::start(&mut store, a, b, 3).unwrap();
        convo.add_message(a, "Fine day.");
        convo.add_message(b, "*hands over an apple*");
        convo.add_narrator_message("Bram gives Ada an apple.");

        let from_a = convo.get_messages_for_api(a);
        assert_eq!(from_a[0], TranscriptEntry::own("Fine day."));
        assert_eq!(from_a[1], TranscriptEntry::other("*hands over an apple*"));
        assert_eq!(from_a[2].role, TranscriptRole::Resolved);

        let from_b = convo.get_messages_for_api(b);
        assert_eq!(from_b[0].role, TranscriptRole::Other);
        assert_eq!(from_b[1].role, TranscriptRole::Own);
    }

    #[test]
    fn test_display_strips_markers_and_omits_empty() {
        let (mut store, a, b) = pair();
        let mut convo = Conversation::start(&mut store, a, b, 5).unwrap();
        convo.add_message(a, "*waves*");
        convo.add_message(b, "Hello! *tips hat* Good to see you. [END_CONVERSATION]");
        convo.add_message(a, "[TRADE: bread]");
        convo.add_narrator_message("Bram tips his hat.");

        let display = convo.get_display_messages();
        assert_eq!(display.len(), 2);
        assert_eq!(display[0].speaker.as_deref(), Some("Bram"));
        assert_eq!(display[0].text, "Hello! Good to see you.");
        assert_eq!(display[1].speaker, None);
        assert!(display.iter().all(|m| !m.text.is_empty()));
    }

    #[test]
    fn test_action_markers() {
        assert_eq!(
            action_markers("Here. *hands over 5 gold* *smiles*"),
            vec!["hands over 5 gold", "smiles"]
        );
        assert!(action_markers("Just talking.").is_empty());
        assert!(action_markers("A lone * star").is_empty());
        assert!(!has_action_marker("**"));
        assert!(has_action_marker("**bows**"));
    }

    #[test]
    fn test_strip_markers_keeps_unclosed() {
        assert_eq!(strip_markers("5 * 3 is fifteen"), "5 * 3 is fifteen");
        assert_eq!(strip_markers("  *nods*  "), "");
        assert_eq!(strip_markers("Yes [GIFT: apple] of course"), "Yes of course");
    }
}
