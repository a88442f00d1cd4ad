//! Headless runner for the town.
//!
//! Runs the simulation at a fixed tick rate with no rendering, logging
//! dialogue as it happens and printing everyone's relationships at the end.

use std::sync::Arc;
use std::time::{Duration, Instant};
use townsfolk_core::orchestrator::DialogueEvent;
use townsfolk_core::{
    ClaudeGenerator, DialogueOrchestrator, OpenField, OrchestratorConfig, OrchestratorError,
    SimConfig, Simulation,
};
use tracing::{info, warn};

pub const TICKS_PER_SECOND: u32 = 20;
pub const GRID_SIZE: i32 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessConfig {
    pub people: usize,
    /// Ticks to run before stopping.
    pub ticks: u64,
    pub seed: Option<u64>,
    pub max_turns: Option<u32>,
    /// Simulate chats instead of calling Claude.
    pub offline: bool,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            people: 10,
            ticks: u64::from(TICKS_PER_SECOND) * 120,
            seed: None,
            max_turns: None,
            offline: false,
        }
    }
}

/// Parse runner configuration from command line arguments.
///
/// Unknown flags are ignored; values that fail to parse keep the default.
pub fn parse_config_from_args(args: &[String]) -> HeadlessConfig {
    let mut config = HeadlessConfig::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--people" => {
                if let Some(n) = args.get(i + 1).and_then(|v| v.parse().ok()) {
                    config.people = n;
                    i += 1;
                }
            }
            "--ticks" => {
                if let Some(n) = args.get(i + 1).and_then(|v| v.parse().ok()) {
                    config.ticks = n;
                    i += 1;
                }
            }
            "--seed" => {
                if let Some(n) = args.get(i + 1).and_then(|v| v.parse().ok()) {
                    config.seed = Some(n);
                    i += 1;
                }
            }
            "--max-turns" => {
                if let Some(n) = args.get(i + 1).and_then(|v| v.parse().ok()) {
                    config.max_turns = Some(n);
                    i += 1;
                }
            }
            "--offline" => config.offline = true,
            _ => {}
        }
        i += 1;
    }

    config
}

fn build_orchestrator(config: &HeadlessConfig) -> Result<Option<DialogueOrchestrator>, OrchestratorError> {
    if config.offline {
        info!("offline mode, conversations will be simulated");
        return Ok(None);
    }
    let generator = match ClaudeGenerator::from_env() {
        Ok(generator) => generator,
        Err(e) => {
            warn!(error = %e, "no Claude client, conversations will be simulated");
            return Ok(None);
        }
    };

    let mut orchestrator_config = OrchestratorConfig::from_env();
    if let Some(max_turns) = config.max_turns {
        orchestrator_config = orchestrator_config.with_max_turns(max_turns);
    }
    let generator = generator.with_config(orchestrator_config.generator.clone());
    DialogueOrchestrator::new(Arc::new(generator), orchestrator_config).map(Some)
}

/// Run the town until the tick budget is spent.
pub fn run_headless(config: HeadlessConfig) -> Result<(), OrchestratorError> {
    let seed = config.seed.unwrap_or_else(rand::random);
    let grid = OpenField::new(GRID_SIZE, GRID_SIZE);

    let mut sim = Simulation::new(SimConfig::default().with_population(config.people), seed);
    if let Some(orchestrator) = build_orchestrator(&config)? {
        sim = sim.with_orchestrator(orchestrator);
    }
    let placed = sim.populate(&grid);
    info!(seed, people = placed, ticks = config.ticks, "starting town");

    let tick = Duration::from_secs(1) / TICKS_PER_SECOND;
    let dt = tick.as_secs_f32();
    for _ in 0..config.ticks {
        let started = Instant::now();
        for event in sim.tick(dt, &grid) {
            log_event(&sim, &event);
        }
        if let Some(rest) = tick.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    sim.shutdown();
    info!(day = sim.clock.day(), time = %sim.clock.time_string(), "town stopped");
    print_relationships(&sim);
    Ok(())
}

fn log_event(sim: &Simulation, event: &DialogueEvent) {
    match event {
        DialogueEvent::Line { speaker_name, text, .. } => println!("{speaker_name}: {text}"),
        DialogueEvent::Narration { text, .. } => println!("  [{text}]"),
        DialogueEvent::Reflected { owner, reflection, .. } => {
            let name = sim.store.name_of(*owner).unwrap_or("someone");
            println!("  ({name} reflects: {} {:+.2})", reflection.summary, reflection.feeling_delta);
        }
        DialogueEvent::Ended(conversation) => {
            let [a, b] = conversation.participants();
            println!(
                "-- {} and {} part ways after {} lines --",
                conversation.name_of(a).unwrap_or_default(),
                conversation.name_of(b).unwrap_or_default(),
                conversation.turn_count()
            );
        }
        DialogueEvent::Simulated { a, b, feeling_delta, .. } => {
            println!(
                "{} and {} have a brief chat ({feeling_delta:+.2})",
                sim.store.name_of(*a).unwrap_or_default(),
                sim.store.name_of(*b).unwrap_or_default(),
            );
        }
    }
}

fn print_relationships(sim: &Simulation) {
    println!();
    println!("=== Relationships ===");
    for person in sim.store.iter() {
        println!("{} ({})", person.name, person.role.role_type);
        if person.relationships.is_empty() {
            println!("  knows nobody yet");
            continue;
        }
        let mut relationships: Vec<_> = person.relationships.values().collect();
        relationships.sort_by(|a, b| b.feeling.total_cmp(&a.feeling));
        for rel in relationships {
            println!(
                "  {:<20} {:+.2}  {} ({} talks)",
                rel.other_name,
                rel.feeling,
                rel.display_summary(),
                rel.interaction_count
            );
        }
    }
}
