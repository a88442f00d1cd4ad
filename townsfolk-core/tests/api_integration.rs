//! Integration tests that call the real Claude API.
//!
//! These tests require ANTHROPIC_API_KEY to be set (via .env file or environment).
//! Run with: `cargo test -p townsfolk-core --test api_integration -- --ignored --nocapture`
//!
//! These are marked #[ignore] by default to avoid:
//! - API costs in CI
//! - Test failures when no API key is available
//! - Slow test runs (API calls take seconds)

use std::sync::Arc;
use std::time::{Duration, Instant};
use townsfolk_core::ai::{ActionInterpreter, ClaudeGenerator, OutcomeResolver};
use townsfolk_core::orchestrator::DialogueEvent;
use townsfolk_core::{
    DialogueOrchestrator, EntityStore, GameClock, GridPos, OrchestratorConfig, Person, RoleType,
};

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

/// Check if API key is available
fn has_api_key() -> bool {
    std::env::var("ANTHROPIC_API_KEY").is_ok()
}

fn generator() -> Arc<ClaudeGenerator> {
    let config = OrchestratorConfig::from_env();
    Arc::new(
        ClaudeGenerator::from_env()
            .expect("Failed to create generator")
            .with_config(config.generator),
    )
}

#[tokio::test]
#[ignore] // Run with: cargo test -p townsfolk-core --test api_integration -- --ignored
async fn test_gift_is_interpreted_and_resolved() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let generator = generator();
    let harold = Person::new("Harold Baker", GridPos::new(0, 0), RoleType::Farmer).snapshot();
    let grace = Person::new("Grace Mason", GridPos::new(1, 0), RoleType::Shopkeeper).snapshot();

    let action = ActionInterpreter::new(generator.clone())
        .interpret("Thanks for the help, Grace. *hands over 5 gold*", &harold, &grace, &[])
        .await
        .expect("a gift should be detected");
    println!("Interpreted: {action:?}");
    assert_eq!(action.description, "hands over 5 gold");

    let outcome = OutcomeResolver::new(generator)
        .resolve(action, &harold, &grace, &[])
        .await;
    println!("Outcome: {outcome:?}");
    assert!(outcome.success, "a simple gift should succeed");
    assert!(outcome.actor_effects.gold() < 0.0);
    assert!(outcome.target_effects.gold() > 0.0);
}

#[tokio::test]
#[ignore]
async fn test_plain_talk_is_not_an_action() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let harold = Person::new("Harold Baker", GridPos::new(0, 0), RoleType::Farmer).snapshot();
    let grace = Person::new("Grace Mason", GridPos::new(1, 0), RoleType::Shopkeeper).snapshot();
    let action = ActionInterpreter::new(generator())
        .interpret("*smiles* Lovely weather we're having.", &harold, &grace, &[])
        .await;
    println!("Interpreted: {action:?}");
    assert!(action.is_none(), "a smile changes no state");
}

#[test]
#[ignore]
fn test_full_conversation_with_claude() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let config = OrchestratorConfig::from_env()
        .with_max_turns(2)
        .with_turn_delay(Duration::ZERO);
    let mut orchestrator = DialogueOrchestrator::new(generator(), config).expect("orchestrator");

    let mut store = EntityStore::new();
    let clock = GameClock::default();
    let ada = store.insert(Person::new("Ada Miller", GridPos::new(0, 0), RoleType::Villager));
    let bram = store.insert(Person::new("Bram Cooper", GridPos::new(1, 0), RoleType::Guard));
    orchestrator.initiate(&mut store, &clock, ada, bram).expect("start");

    let deadline = Instant::now() + Duration::from_secs(120);
    while orchestrator.has_active_conversations() || orchestrator.has_pending_reflections() {
        for event in orchestrator.update(&mut store, &clock, false) {
            match event {
                DialogueEvent::Line { speaker_name, text, .. } => println!("{speaker_name}: {text}"),
                DialogueEvent::Narration { text, .. } => println!("  [{text}]"),
                DialogueEvent::Reflected { reflection, .. } => println!("  reflection: {reflection:?}"),
                _ => {}
            }
        }
        assert!(Instant::now() < deadline, "conversation did not finish in time");
        std::thread::sleep(Duration::from_millis(20));
    }

    for id in [ada, bram] {
        let person = store.get(id).unwrap();
        assert!(!person.in_conversation);
        assert_eq!(person.relationships.len(), 1, "{} should know one person", person.name);
    }
}
