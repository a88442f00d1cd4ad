//! The dialogue scheduler.
//!
//! [`DialogueOrchestrator`] owns every live [`Conversation`] and drives each
//! one through generate, interpret, resolve and apply without ever blocking
//! the simulation thread. Every conversation has a single job slot: a turn's
//! line is generated, appended, then handed to the action pipeline, and only
//! once that result has been applied may the next turn be submitted.
//!
//! ```ignore
//! let mut orchestrator = DialogueOrchestrator::new(generator, OrchestratorConfig::from_env())?;
//! orchestrator.initiate(&mut store, &clock, ada, bram)?;
//! loop {
//!     for event in orchestrator.update(&mut store, &clock, paused) {
//!         // log or display
//!     }
//! }
//! ```

use crate::ai::{
    reflect, ActionPipeline, ActionReport, ConversationPhase, GenerationError, GeneratorConfig,
    PromptBuilder, Reflection, TextGenerator, TownPromptBuilder,
};
use crate::conversation::{Conversation, ConversationError, ConversationId, TranscriptEntry};
use crate::items::{ItemCatalog, StandardCatalog};
use crate::state::StateApplier;
use crate::systems::RelationshipSystem;
use crate::worker::{JobHandle, JobPoll, WorkerPool};
use crate::world::{EntityStore, GameClock, PersonId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Recorded in place of a line the generator could not produce.
pub const FILLER_LINE: &str = "*trails off awkwardly*";

/// Spoken by the orchestrator when a conversation hits its turn ceiling.
pub const FAREWELL_LINE: &str = "Well, I should get going. Take care!";

pub const DEFAULT_MAX_TURNS: u32 = 6;
pub const DEFAULT_TURN_DELAY: Duration = Duration::from_millis(1500);
pub const DEFAULT_WORKERS: usize = 3;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Conversation(#[from] ConversationError),

    #[error("failed to start worker pool: {0}")]
    Workers(#[from] std::io::Error),
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Lines each participant may speak before the conversation is closed.
    pub max_turns: u32,
    /// Minimum wait between a turn being applied and the next submission.
    pub turn_delay: Duration,
    pub workers: usize,
    pub generator: GeneratorConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            turn_delay: DEFAULT_TURN_DELAY,
            workers: DEFAULT_WORKERS,
            generator: GeneratorConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `TOWNSFOLK_MODEL`, `TOWNSFOLK_MAX_TURNS`,
    /// `TOWNSFOLK_WORKERS` and `TOWNSFOLK_TURN_DELAY_MS`. Unparseable values
    /// are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(model) = lookup("TOWNSFOLK_MODEL").filter(|m| !m.trim().is_empty()) {
            config.generator.model = Some(model.trim().to_string());
        }
        if let Some(turns) = lookup("TOWNSFOLK_MAX_TURNS").and_then(|v| v.trim().parse().ok()) {
            config.max_turns = turns;
        }
        if let Some(workers) = lookup("TOWNSFOLK_WORKERS").and_then(|v| v.trim().parse().ok()) {
            config.workers = workers;
        }
        if let Some(ms) = lookup("TOWNSFOLK_TURN_DELAY_MS").and_then(|v| v.trim().parse().ok()) {
            config.turn_delay = Duration::from_millis(ms);
        }
        config
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn with_turn_delay(mut self, delay: Duration) -> Self {
        self.turn_delay = delay;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.generator.model = Some(model.into());
        self
    }

    pub fn with_generator_config(mut self, generator: GeneratorConfig) -> Self {
        self.generator = generator;
        self
    }
}

// ============================================================================
// Events
// ============================================================================

/// Something observable that happened during one [`DialogueOrchestrator::update`].
#[derive(Debug)]
pub enum DialogueEvent {
    Line {
        conversation: ConversationId,
        speaker: PersonId,
        speaker_name: String,
        text: String,
    },
    Narration {
        conversation: ConversationId,
        text: String,
    },
    Reflected {
        owner: PersonId,
        other: PersonId,
        reflection: Reflection,
    },
    /// Removed from the registry, handed over in its final state.
    Ended(Conversation),
    /// A chat the simulation settled without a generator.
    Simulated {
        a: PersonId,
        b: PersonId,
        feeling_delta: f32,
        summary: String,
    },
}

// ============================================================================
// Orchestrator
// ============================================================================

enum PendingJob {
    Line {
        speaker: PersonId,
        handle: JobHandle<Result<String, GenerationError>>,
    },
    Actions {
        handle: JobHandle<ActionReport>,
    },
}

struct Slot {
    conversation: Conversation,
    job: Option<PendingJob>,
    /// When the last turn finished applying. `None` means submit immediately.
    last_turn_at: Option<Instant>,
}

struct PendingReflection {
    owner: PersonId,
    other: PersonId,
    other_name: String,
    handle: JobHandle<Reflection>,
}

pub struct DialogueOrchestrator {
    generator: Arc<dyn TextGenerator>,
    pipeline: ActionPipeline,
    prompts: Arc<dyn PromptBuilder>,
    catalog: Arc<dyn ItemCatalog>,
    pool: WorkerPool,
    config: OrchestratorConfig,
    slots: Vec<Slot>,
    reflections: Vec<PendingReflection>,
    viewed: Option<ConversationId>,
}

impl DialogueOrchestrator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        let pool = WorkerPool::new(config.workers)?;
        Ok(Self {
            pipeline: ActionPipeline::new(generator.clone()),
            generator,
            prompts: Arc::new(TownPromptBuilder),
            catalog: Arc::new(StandardCatalog),
            pool,
            config,
            slots: Vec::new(),
            reflections: Vec::new(),
            viewed: None,
        })
    }

    pub fn with_prompt_builder(mut self, prompts: Arc<dyn PromptBuilder>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ItemCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Start a conversation and submit its first turn.
    ///
    /// The first conversation started while nothing is viewed becomes the
    /// viewed one.
    pub fn initiate(
        &mut self,
        store: &mut EntityStore,
        clock: &GameClock,
        initiator: PersonId,
        partner: PersonId,
    ) -> Result<ConversationId, OrchestratorError> {
        let conversation = Conversation::start(store, initiator, partner, self.config.max_turns)?;
        let id = conversation.id();
        info!(
            conversation = %id,
            initiator = conversation.name_of(initiator).unwrap_or_default(),
            partner = conversation.name_of(partner).unwrap_or_default(),
            "conversation started"
        );

        let mut slot = Slot {
            conversation,
            job: None,
            last_turn_at: None,
        };
        self.submit_turn(&mut slot, store, clock);
        self.slots.push(slot);

        if self.viewed.is_none() {
            self.viewed = Some(id);
        }
        Ok(id)
    }

    /// Poll every conversation once. Never blocks.
    ///
    /// Finished jobs are applied here, on the caller's thread. New turns are
    /// only submitted when `paused` is false and the pacing delay has passed.
    /// Ended conversations are removed and returned as [`DialogueEvent::Ended`].
    pub fn update(
        &mut self,
        store: &mut EntityStore,
        clock: &GameClock,
        paused: bool,
    ) -> Vec<DialogueEvent> {
        let mut events = Vec::new();

        let mut slots = std::mem::take(&mut self.slots);
        for slot in &mut slots {
            self.step(slot, store, clock, paused, &mut events);
        }

        let (ended, live): (Vec<Slot>, Vec<Slot>) =
            slots.into_iter().partition(|slot| slot.conversation.is_ended());
        self.slots = live;
        for slot in ended {
            if self.viewed == Some(slot.conversation.id()) {
                self.viewed = None;
            }
            events.push(DialogueEvent::Ended(slot.conversation));
        }

        self.poll_reflections(store, clock, &mut events);
        events
    }

    fn step(
        &mut self,
        slot: &mut Slot,
        store: &mut EntityStore,
        clock: &GameClock,
        paused: bool,
        events: &mut Vec<DialogueEvent>,
    ) {
        if slot.conversation.is_ended() {
            return;
        }

        if let Some(job) = slot.job.as_mut() {
            match job {
                PendingJob::Line { speaker, handle } => {
                    let speaker = *speaker;
                    match handle.poll() {
                        JobPoll::Pending => return,
                        JobPoll::Ready(Ok(text)) => {
                            slot.job = None;
                            self.on_line(slot, speaker, text, store, clock, events);
                        }
                        JobPoll::Ready(Err(e)) => {
                            slot.job = None;
                            warn!(conversation = %slot.conversation.id(), error = %e, "dialogue generation failed");
                            self.on_line_failed(slot, speaker, store, events);
                        }
                        JobPoll::Failed(message) => {
                            slot.job = None;
                            warn!(conversation = %slot.conversation.id(), error = %message, "dialogue job failed");
                            self.on_line_failed(slot, speaker, store, events);
                        }
                    }
                }
                PendingJob::Actions { handle } => match handle.poll() {
                    JobPoll::Pending => return,
                    JobPoll::Ready(report) => {
                        slot.job = None;
                        self.apply_report(slot, report, store, clock, events);
                    }
                    JobPoll::Failed(message) => {
                        slot.job = None;
                        warn!(conversation = %slot.conversation.id(), error = %message, "action job failed, treating as no action");
                        self.finish_turn(slot, store, events);
                    }
                },
            }
        }

        if slot.job.is_some() || paused || !slot.conversation.is_active() {
            return;
        }
        let ready = slot
            .last_turn_at
            .map_or(true, |at| at.elapsed() >= self.config.turn_delay);
        if ready {
            self.submit_turn(slot, store, clock);
        }
    }

    fn submit_turn(&self, slot: &mut Slot, store: &mut EntityStore, clock: &GameClock) {
        let speaker_id = slot.conversation.current_speaker();
        let listener_id = slot.conversation.current_listener();
        if !store.contains(speaker_id) || !store.contains(listener_id) {
            warn!(conversation = %slot.conversation.id(), "participant missing, ending conversation");
            slot.conversation.end(store);
            return;
        }
        let (Some(speaker), Some(listener)) = (store.get(speaker_id), store.get(listener_id)) else {
            return;
        };
        let conversation = &slot.conversation;

        let mut history = conversation.get_messages_for_api(speaker_id);
        let is_first_line = history.is_empty();
        if is_first_line {
            history.push(TranscriptEntry::other(format!("*{} approaches you*", listener.name)));
        }
        let phase = ConversationPhase::for_turn(
            conversation.speaker_turn(),
            conversation.max_turns(),
            is_first_line,
        );
        let prompt = self.prompts.conversation_prompt(speaker, listener, phase, clock);
        debug!(conversation = %conversation.id(), speaker = %speaker.name, ?phase, "submitting turn");

        let generator = self.generator.clone();
        let handle = self
            .pool
            .submit(async move { generator.generate(&prompt, &history).await });
        slot.job = Some(PendingJob::Line {
            speaker: speaker_id,
            handle,
        });
    }

    fn on_line(
        &mut self,
        slot: &mut Slot,
        speaker: PersonId,
        text: String,
        store: &mut EntityStore,
        clock: &GameClock,
        events: &mut Vec<DialogueEvent>,
    ) {
        let text = text.trim().to_string();
        if text.is_empty() {
            self.on_line_failed(slot, speaker, store, events);
            return;
        }

        // Prompts already quote the line itself, so the context stops short of it.
        let context = slot.conversation.get_messages_for_api(speaker);

        // The line is visible before anything is done about it.
        self.record_line(slot, speaker, &text, events);

        let listener = slot.conversation.current_listener();
        let (Some(speaker_snapshot), Some(listener_snapshot)) =
            (store.snapshot(speaker), store.snapshot(listener))
        else {
            warn!(conversation = %slot.conversation.id(), "participant missing, skipping action processing");
            self.finish_turn(slot, store, events);
            return;
        };

        let pipeline = self.pipeline.clone();
        let handle = self.pool.submit(async move {
            pipeline
                .process(&text, &speaker_snapshot, &listener_snapshot, &context)
                .await
        });
        slot.job = Some(PendingJob::Actions { handle });
    }

    fn on_line_failed(
        &mut self,
        slot: &mut Slot,
        speaker: PersonId,
        store: &mut EntityStore,
        events: &mut Vec<DialogueEvent>,
    ) {
        self.record_line(slot, speaker, FILLER_LINE, events);
        self.finish_turn(slot, store, events);
    }

    fn record_line(
        &self,
        slot: &mut Slot,
        speaker: PersonId,
        text: &str,
        events: &mut Vec<DialogueEvent>,
    ) {
        let conversation = &mut slot.conversation;
        if !conversation.add_message(speaker, text) {
            return;
        }
        let speaker_name = conversation.name_of(speaker).unwrap_or_default().to_string();
        info!(conversation = %conversation.id(), speaker = %speaker_name, line = %text, "dialogue");
        events.push(DialogueEvent::Line {
            conversation: conversation.id(),
            speaker,
            speaker_name,
            text: text.to_string(),
        });
    }

    fn apply_report(
        &mut self,
        slot: &mut Slot,
        report: ActionReport,
        store: &mut EntityStore,
        clock: &GameClock,
        events: &mut Vec<DialogueEvent>,
    ) {
        let id = slot.conversation.id();

        if let Some(outcome) = &report.outcome {
            let applier = StateApplier::new(self.catalog.as_ref());
            match applier.apply_outcome(outcome, store, clock.total_minutes()) {
                Ok(_) => {
                    if !outcome.narrative.is_empty() {
                        slot.conversation.add_narrator_message(&outcome.narrative);
                        events.push(DialogueEvent::Narration {
                            conversation: id,
                            text: outcome.narrative.clone(),
                        });
                    }
                }
                Err(e) => {
                    warn!(conversation = %id, error = %e, "could not apply outcome");
                    self.finish_turn(slot, store, events);
                    return;
                }
            }
        }

        if report.ends_conversation {
            info!(conversation = %id, "conversation ended by participant");
            self.close(slot, store);
            return;
        }
        self.finish_turn(slot, store, events);
    }

    /// Hand the floor over, or close the conversation at its ceiling.
    fn finish_turn(&mut self, slot: &mut Slot, store: &mut EntityStore, events: &mut Vec<DialogueEvent>) {
        let conversation = &mut slot.conversation;
        let next = conversation.switch_speaker();
        slot.last_turn_at = Some(Instant::now());

        if conversation.turn_count() >= conversation.turn_ceiling() {
            info!(conversation = %conversation.id(), turns = conversation.turn_count(), "turn limit reached");
            self.record_line(slot, next, FAREWELL_LINE, events);
            self.close(slot, store);
        }
    }

    /// `Ending`, queue reflections, then `Ended`.
    fn close(&mut self, slot: &mut Slot, store: &mut EntityStore) {
        let conversation = &mut slot.conversation;
        conversation.begin_ending();
        let reflections = self.submit_reflections(conversation, store);
        conversation.end(store);
        info!(
            conversation = %conversation.id(),
            lines = conversation.turn_count(),
            "conversation ended"
        );
        // Collected on later updates.
        self.reflections.extend(reflections);
    }

    fn submit_reflections(&self, conversation: &Conversation, store: &EntityStore) -> Vec<PendingReflection> {
        let [a, b] = conversation.participants();
        [(a, b), (b, a)]
            .into_iter()
            .filter_map(|(owner_id, other_id)| {
                let owner = store.get(owner_id)?;
                let other = store.get(other_id)?;
                let transcript = conversation.get_messages_for_api(owner_id);
                let prompt = self.prompts.reflection_prompt(owner, other, &transcript);
                let generator = self.generator.clone();
                let handle = self
                    .pool
                    .submit(async move { reflect(generator.as_ref(), &prompt).await });
                Some(PendingReflection {
                    owner: owner_id,
                    other: other_id,
                    other_name: other.name.clone(),
                    handle,
                })
            })
            .collect()
    }

    fn poll_reflections(&mut self, store: &mut EntityStore, clock: &GameClock, events: &mut Vec<DialogueEvent>) {
        let mut still_pending = Vec::with_capacity(self.reflections.len());
        for mut pending in std::mem::take(&mut self.reflections) {
            let reflection = match pending.handle.poll() {
                JobPoll::Pending => {
                    still_pending.push(pending);
                    continue;
                }
                JobPoll::Ready(reflection) => reflection,
                JobPoll::Failed(message) => {
                    warn!(error = %message, "reflection job failed, using fallback");
                    Reflection::fallback()
                }
            };

            if let Some(owner) = store.get_mut(pending.owner) {
                RelationshipSystem::apply_reflection(
                    owner,
                    pending.other,
                    &pending.other_name,
                    &reflection,
                    clock.total_minutes(),
                );
                info!(
                    owner = %owner.name,
                    other = %pending.other_name,
                    delta = reflection.feeling_delta,
                    summary = %reflection.summary,
                    "reflection applied"
                );
                events.push(DialogueEvent::Reflected {
                    owner: pending.owner,
                    other: pending.other,
                    reflection,
                });
            }
        }
        self.reflections = still_pending;
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn conversation(&self, id: ConversationId) -> Option<&Conversation> {
        self.slots
            .iter()
            .map(|slot| &slot.conversation)
            .find(|c| c.id() == id)
    }

    /// The live conversation `person` is part of, if any.
    pub fn conversation_for(&self, person: PersonId) -> Option<&Conversation> {
        self.slots
            .iter()
            .map(|slot| &slot.conversation)
            .find(|c| c.involves(person))
    }

    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.slots.iter().map(|slot| &slot.conversation)
    }

    /// Point the viewer at a live conversation. Unknown ids are ignored.
    pub fn view(&mut self, id: ConversationId) -> bool {
        if self.conversation(id).is_some() {
            self.viewed = Some(id);
            true
        } else {
            false
        }
    }

    pub fn viewed(&self) -> Option<&Conversation> {
        self.viewed.and_then(|id| self.conversation(id))
    }

    pub fn viewed_id(&self) -> Option<ConversationId> {
        self.viewed
    }

    pub fn has_active_conversations(&self) -> bool {
        !self.slots.is_empty()
    }

    pub fn has_pending_reflections(&self) -> bool {
        !self.reflections.is_empty()
    }

    pub fn has_outstanding_job(&self, id: ConversationId) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.conversation.id() == id && slot.job.is_some())
    }

    /// Stop the worker pool. In-flight calls are abandoned and live
    /// conversations are ended so nobody is left flagged as talking.
    pub fn shutdown(&mut self, store: &mut EntityStore) {
        for slot in &mut self.slots {
            slot.job = None;
            slot.conversation.end(store);
        }
        self.slots.clear();
        self.reflections.clear();
        self.viewed = None;
        self.pool.shutdown();
        info!("dialogue orchestrator shut down");
    }
}
