//! Testing utilities for the town.
//!
//! This module provides tools for integration testing:
//! - `ScriptedGenerator` for deterministic conversations without API calls
//! - `TownHarness` for driving the orchestrator tick by tick
//! - Assertion helpers for verifying people and relationships

use crate::ai::{GenerationError, StructuredTask, TextGenerator};
use crate::conversation::{Conversation, ConversationId, ConversationState, TranscriptEntry};
use crate::orchestrator::{DialogueEvent, DialogueOrchestrator, OrchestratorConfig, OrchestratorError};
use crate::person::{Person, RoleType};
use crate::world::{EntityStore, GameClock, GridPos, PersonId};
use async_trait::async_trait;
use rand::Rng;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Which generator entry point a call went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Dialogue,
    Structured(StructuredTask),
}

/// A call the generator received.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub system_prompt: String,
    /// The user message, or the last transcript entry for dialogue.
    pub input: String,
}

#[derive(Debug, Clone)]
enum Scripted {
    Text(String),
    Failure,
}

/// A [`TextGenerator`] that replays queued responses.
///
/// Each call kind has its own queue. When a queue runs dry the generator
/// falls back to a harmless default: a stock line of dialogue, no action,
/// a neutral resolution, or a mildly positive reflection.
pub struct ScriptedGenerator {
    dialogue: Mutex<VecDeque<Scripted>>,
    structured: Mutex<HashMap<StructuredTask, VecDeque<Scripted>>>,
    failing: HashSet<CallKind>,
    default_dialogue: String,
    latency: Option<(Duration, Duration)>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            dialogue: Mutex::new(VecDeque::new()),
            structured: Mutex::new(HashMap::new()),
            failing: HashSet::new(),
            default_dialogue: "Good to see you. Fine weather today.".to_string(),
            latency: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a line of dialogue.
    pub fn with_dialogue(self, line: impl Into<String>) -> Self {
        lock(&self.dialogue).push_back(Scripted::Text(line.into()));
        self
    }

    pub fn with_dialogue_lines<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lines
            .into_iter()
            .fold(self, |generator, line| generator.with_dialogue(line))
    }

    /// Queue a single dialogue failure.
    pub fn with_dialogue_failure(self) -> Self {
        lock(&self.dialogue).push_back(Scripted::Failure);
        self
    }

    /// Line used once the dialogue queue is empty.
    pub fn with_default_dialogue(mut self, line: impl Into<String>) -> Self {
        self.default_dialogue = line.into();
        self
    }

    /// Queue a structured response for `task`.
    pub fn with_structured(self, task: StructuredTask, text: impl Into<String>) -> Self {
        lock(&self.structured)
            .entry(task)
            .or_default()
            .push_back(Scripted::Text(text.into()));
        self
    }

    /// Queue a single failure for `task`.
    pub fn with_structured_failure(self, task: StructuredTask) -> Self {
        lock(&self.structured)
            .entry(task)
            .or_default()
            .push_back(Scripted::Failure);
        self
    }

    /// Every dialogue call fails.
    pub fn failing_dialogue(mut self) -> Self {
        self.failing.insert(CallKind::Dialogue);
        self
    }

    /// Every call for `task` fails.
    pub fn failing_structured(mut self, task: StructuredTask) -> Self {
        self.failing.insert(CallKind::Structured(task));
        self
    }

    /// Sleep a random duration in `[min, max]` before answering.
    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.latency = Some((min, max.max(min)));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, kind: CallKind) -> usize {
        lock(&self.calls).iter().filter(|c| c.kind == kind).count()
    }

    pub fn dialogue_call_count(&self) -> usize {
        self.call_count(CallKind::Dialogue)
    }

    pub fn structured_call_count(&self, task: StructuredTask) -> usize {
        self.call_count(CallKind::Structured(task))
    }

    fn record(&self, kind: CallKind, system_prompt: &str, input: &str) {
        lock(&self.calls).push(RecordedCall {
            kind,
            system_prompt: system_prompt.to_string(),
            input: input.to_string(),
        });
    }

    async fn delay(&self) {
        let Some((min, max)) = self.latency else {
            return;
        };
        let wait = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        tokio::time::sleep(wait).await;
    }

    fn answer(&self, kind: CallKind, scripted: Option<Scripted>) -> Result<String, GenerationError> {
        if self.failing.contains(&kind) {
            return Err(GenerationError::Unavailable("scripted failure".to_string()));
        }
        match scripted {
            Some(Scripted::Text(text)) => Ok(text),
            Some(Scripted::Failure) => {
                Err(GenerationError::Unavailable("scripted failure".to_string()))
            }
            None => Ok(match kind {
                CallKind::Dialogue => self.default_dialogue.clone(),
                CallKind::Structured(StructuredTask::Interpretation) => {
                    r#"{"action_detected": false}"#.to_string()
                }
                CallKind::Structured(StructuredTask::Resolution) => {
                    r#"{"success": false}"#.to_string()
                }
                CallKind::Structured(StructuredTask::Reflection) => {
                    "SUMMARY: Chatted about the weather\nFEELING: 0.1\nOBSERVATION: nothing notable"
                        .to_string()
                }
            }),
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[TranscriptEntry],
    ) -> Result<String, GenerationError> {
        let last = history.last().map(|e| e.content.as_str()).unwrap_or_default();
        self.record(CallKind::Dialogue, system_prompt, last);
        self.delay().await;
        let scripted = lock(&self.dialogue).pop_front();
        self.answer(CallKind::Dialogue, scripted)
    }

    async fn generate_structured(
        &self,
        task: StructuredTask,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, GenerationError> {
        let kind = CallKind::Structured(task);
        self.record(kind, system_prompt, user_message);
        self.delay().await;
        let scripted = lock(&self.structured)
            .get_mut(&task)
            .and_then(VecDeque::pop_front);
        self.answer(kind, scripted)
    }
}

/// A store, a clock and an orchestrator wired to a [`ScriptedGenerator`].
pub struct TownHarness {
    pub store: EntityStore,
    pub clock: GameClock,
    pub orchestrator: DialogueOrchestrator,
    pub generator: Arc<ScriptedGenerator>,
    /// Every event seen so far, in order.
    pub events: Vec<DialogueEvent>,
    next_x: i32,
}

impl TownHarness {
    /// Harness with no pacing delay, so turns run back to back.
    pub fn new(generator: ScriptedGenerator) -> Result<Self, OrchestratorError> {
        Self::with_config(
            generator,
            OrchestratorConfig::default()
                .with_turn_delay(Duration::ZERO)
                .with_workers(2),
        )
    }

    pub fn with_config(
        generator: ScriptedGenerator,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        let generator = Arc::new(generator);
        let orchestrator = DialogueOrchestrator::new(generator.clone(), config)?;
        Ok(Self {
            store: EntityStore::new(),
            clock: GameClock::default(),
            orchestrator,
            generator,
            events: Vec::new(),
            next_x: 0,
        })
    }

    /// Add someone standing next to the previously added person.
    pub fn add_person(&mut self, name: &str, role: RoleType) -> PersonId {
        let position = GridPos::new(self.next_x, 0);
        self.next_x += 1;
        self.store.insert(Person::new(name, position, role))
    }

    pub fn add(&mut self, person: Person) -> PersonId {
        self.store.insert(person)
    }

    pub fn start(&mut self, initiator: PersonId, partner: PersonId) -> Result<ConversationId, OrchestratorError> {
        self.orchestrator
            .initiate(&mut self.store, &self.clock, initiator, partner)
    }

    /// One orchestrator update. Returns how many events it produced.
    pub fn tick(&mut self) -> usize {
        self.tick_with(false)
    }

    pub fn tick_with(&mut self, paused: bool) -> usize {
        let events = self
            .orchestrator
            .update(&mut self.store, &self.clock, paused);
        let count = events.len();
        self.events.extend(events);
        count
    }

    /// Tick until `done` holds or `timeout` passes. Returns whether it held.
    pub fn run_until(&mut self, timeout: Duration, mut done: impl FnMut(&Self) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.tick();
            if done(self) {
                return true;
            }
            if Instant::now() > deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    /// Tick until no conversation is live and every reflection has landed.
    pub fn run_to_completion(&mut self, timeout: Duration) -> bool {
        self.run_until(timeout, |h| {
            !h.orchestrator.has_active_conversations() && !h.orchestrator.has_pending_reflections()
        })
    }

    pub fn person(&self, id: PersonId) -> Option<&Person> {
        self.store.get(id)
    }

    /// Spoken lines for `conversation`, as `(speaker name, text)`.
    pub fn lines(&self, conversation: ConversationId) -> Vec<(String, String)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                DialogueEvent::Line {
                    conversation: id,
                    speaker_name,
                    text,
                    ..
                } if *id == conversation => Some((speaker_name.clone(), text.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn narrations(&self, conversation: ConversationId) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                DialogueEvent::Narration {
                    conversation: id,
                    text,
                } if *id == conversation => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// The final state of a conversation that has been removed.
    pub fn ended(&self, conversation: ConversationId) -> Option<&Conversation> {
        self.events.iter().find_map(|event| match event {
            DialogueEvent::Ended(c) if c.id() == conversation => Some(c),
            _ => None,
        })
    }

    pub fn state_of(&self, conversation: ConversationId) -> Option<ConversationState> {
        self.orchestrator
            .conversation(conversation)
            .or_else(|| self.ended(conversation))
            .map(|c| c.state())
    }
}

// ============================================================================
// Assertions
// ============================================================================

#[track_caller]
pub fn assert_money(harness: &TownHarness, person: PersonId, expected: f32) {
    let actual = harness.person(person).map(|p| p.money);
    assert_eq!(actual, Some(expected), "unexpected money");
}

#[track_caller]
pub fn assert_health(harness: &TownHarness, person: PersonId, expected: f32) {
    let actual = harness.person(person).map(|p| p.health);
    assert_eq!(actual, Some(expected), "unexpected health");
}

#[track_caller]
pub fn assert_not_talking(harness: &TownHarness, person: PersonId) {
    let Some(p) = harness.person(person) else {
        panic!("person {person} not found");
    };
    assert!(!p.in_conversation, "{} is still flagged in conversation", p.name);
    assert!(p.conversation_partner.is_none(), "{} still has a partner", p.name);
}

#[track_caller]
pub fn assert_knows(harness: &TownHarness, person: PersonId, other: PersonId) {
    let Some(p) = harness.person(person) else {
        panic!("person {person} not found");
    };
    assert!(
        p.relationship(other).is_some(),
        "{} has no relationship toward {other}",
        p.name
    );
}

#[track_caller]
pub fn assert_feeling(harness: &TownHarness, person: PersonId, other: PersonId, expected: f32) {
    let feeling = harness
        .person(person)
        .and_then(|p| p.relationship(other))
        .map(|r| r.feeling);
    let Some(feeling) = feeling else {
        panic!("no relationship from {person} toward {other}");
    };
    assert!(
        (feeling - expected).abs() < 1e-4,
        "expected feeling {expected}, got {feeling}"
    );
}
