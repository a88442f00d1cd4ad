//! A small town of AI-driven people who wander, meet and talk.
//!
//! This crate provides:
//! - The town model: people, items, relationships and a game clock
//! - Per-tick systems for movement, proximity, healing and relationship drift
//! - A non-blocking dialogue orchestrator backed by Claude
//! - An interpret/resolve/apply pipeline that turns `*actions*` in dialogue
//!   into state changes
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use townsfolk_core::{
//!     ClaudeGenerator, DialogueOrchestrator, OpenField, OrchestratorConfig, SimConfig, Simulation,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OrchestratorConfig::from_env();
//!     let generator = ClaudeGenerator::from_env()?.with_config(config.generator.clone());
//!     let orchestrator = DialogueOrchestrator::new(Arc::new(generator), config)?;
//!
//!     let grid = OpenField::new(30, 30);
//!     let mut sim = Simulation::new(SimConfig::default(), 42).with_orchestrator(orchestrator);
//!     sim.populate(&grid);
//!
//!     loop {
//!         for event in sim.tick(0.05, &grid) {
//!             println!("{event:?}");
//!         }
//!         std::thread::sleep(std::time::Duration::from_millis(50));
//!     }
//! }
//! ```

pub mod ai;
pub mod conversation;
pub mod effects;
pub mod items;
pub mod orchestrator;
pub mod person;
pub mod simulation;
pub mod state;
pub mod systems;
pub mod testing;
pub mod worker;
pub mod world;

// Primary public API
pub use ai::{ClaudeGenerator, GenerationError, GeneratorConfig, StructuredTask, TextGenerator};
pub use conversation::{Conversation, ConversationError, ConversationId, ConversationState};
pub use effects::{ActionOutcome, InterpretedAction};
pub use items::{Item, ItemCatalog, StandardCatalog};
pub use orchestrator::{DialogueEvent, DialogueOrchestrator, OrchestratorConfig, OrchestratorError};
pub use person::{Person, PersonSnapshot, Relationship, RoleType};
pub use simulation::{SimConfig, Simulation};
pub use state::{ApplyError, StateApplier};
pub use systems::{OpenField, TileGrid};
pub use testing::{ScriptedGenerator, TownHarness};
pub use world::{EntityStore, GameClock, GridPos, PersonId};
