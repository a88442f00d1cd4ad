//! The town simulation loop.
//!
//! [`Simulation::tick`] runs once per frame on the simulation thread. The
//! dialogue orchestrator is polled every tick, even while paused, so
//! finished work is never left waiting; everything else only runs when
//! the simulation is unpaused.

use crate::conversation::ConversationId;
use crate::orchestrator::{DialogueEvent, DialogueOrchestrator, OrchestratorError};
use crate::person::{
    random_name, Person, RoleType, DEFAULT_HEALTH, DEFAULT_MONEY, INVENTORY_CAPACITY,
};
use crate::systems::{
    HealthSystem, MovementSystem, ProximitySystem, RelationshipSystem, TileGrid,
};
use crate::systems::health::DEFAULT_REGEN_PER_MINUTE;
use crate::systems::movement::DEFAULT_MOVEMENT_SPEED;
use crate::systems::proximity::{DEFAULT_CONVERSATION_CHANCE, DEFAULT_INTERACTION_COOLDOWN};
use crate::systems::relationship::DEFAULT_DECAY_PER_HOUR;
use crate::world::{EntityStore, GameClock, GridPos, PersonId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use tracing::{debug, info};

/// Feeling change range for a chat simulated without a generator.
const SIMULATED_DELTA_MIN: f32 = -0.1;
const SIMULATED_DELTA_MAX: f32 = 0.2;

/// Tries per person to find a free tile when populating.
const SPAWN_ATTEMPTS: usize = 50;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub population: usize,
    pub regen_per_minute: f32,
    pub decay_per_hour: f32,
    /// Tiles per real second.
    pub movement_speed: f32,
    /// Game minutes before the same pair may interact again.
    pub interaction_cooldown: f64,
    pub conversation_chance: f64,
    /// Game minutes per real second.
    pub time_scale: f64,
    pub inventory_capacity: usize,
    pub starting_health: f32,
    pub starting_money: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            population: 10,
            regen_per_minute: DEFAULT_REGEN_PER_MINUTE,
            decay_per_hour: DEFAULT_DECAY_PER_HOUR,
            movement_speed: DEFAULT_MOVEMENT_SPEED,
            interaction_cooldown: DEFAULT_INTERACTION_COOLDOWN,
            conversation_chance: DEFAULT_CONVERSATION_CHANCE,
            time_scale: 1.0,
            inventory_capacity: INVENTORY_CAPACITY,
            starting_health: DEFAULT_HEALTH,
            starting_money: DEFAULT_MONEY,
        }
    }
}

impl SimConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_population(mut self, population: usize) -> Self {
        self.population = population;
        self
    }

    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale.max(0.0);
        self
    }

    pub fn with_movement_speed(mut self, speed: f32) -> Self {
        self.movement_speed = speed;
        self
    }

    pub fn with_interaction_cooldown(mut self, minutes: f64) -> Self {
        self.interaction_cooldown = minutes;
        self
    }

    pub fn with_conversation_chance(mut self, chance: f64) -> Self {
        self.conversation_chance = chance.clamp(0.0, 1.0);
        self
    }

    pub fn with_regen(mut self, per_minute: f32) -> Self {
        self.regen_per_minute = per_minute;
        self
    }

    pub fn with_decay(mut self, per_hour: f32) -> Self {
        self.decay_per_hour = per_hour;
        self
    }

    pub fn with_starting_vitals(mut self, health: f32, money: f32) -> Self {
        self.starting_health = health;
        self.starting_money = money;
        self
    }
}

// ============================================================================
// Simulation
// ============================================================================

pub struct Simulation {
    pub store: EntityStore,
    pub clock: GameClock,
    config: SimConfig,
    movement: MovementSystem,
    health: HealthSystem,
    relationships: RelationshipSystem,
    proximity: ProximitySystem,
    orchestrator: Option<DialogueOrchestrator>,
    paused: bool,
    rng: StdRng,
}

impl Simulation {
    pub fn new(config: SimConfig, seed: u64) -> Self {
        Self {
            store: EntityStore::new(),
            clock: GameClock::new(config.time_scale),
            movement: MovementSystem::new(config.movement_speed),
            health: HealthSystem::new(config.regen_per_minute),
            relationships: RelationshipSystem::new(config.decay_per_hour),
            proximity: ProximitySystem::new(config.interaction_cooldown, config.conversation_chance),
            config,
            orchestrator: None,
            paused: false,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Route interactions through `orchestrator`. Without one, chats are
    /// simulated with a small random feeling change.
    pub fn with_orchestrator(mut self, orchestrator: DialogueOrchestrator) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> Option<&DialogueOrchestrator> {
        self.orchestrator.as_ref()
    }

    pub fn orchestrator_mut(&mut self) -> Option<&mut DialogueOrchestrator> {
        self.orchestrator.as_mut()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        self.paused
    }

    pub fn add_person(&mut self, person: Person) -> PersonId {
        self.store.insert(person)
    }

    /// Spawn `config.population` people on free tiles, cycling through roles.
    /// Returns how many were placed.
    pub fn populate(&mut self, grid: &dyn TileGrid) -> usize {
        let mut taken: HashSet<GridPos> = self.store.iter().map(|p| p.position).collect();
        let mut names: HashSet<String> = self.store.iter().map(|p| p.name.clone()).collect();
        let mut placed = 0;

        for i in 0..self.config.population {
            let role = RoleType::ALL[i % RoleType::ALL.len()];
            let Some(position) = (0..SPAWN_ATTEMPTS)
                .filter_map(|_| grid.random_walkable(&mut self.rng))
                .find(|pos| !taken.contains(pos))
            else {
                debug!(placed, "no free tile left, stopping population");
                break;
            };

            let mut name = random_name(&mut self.rng);
            for _ in 0..SPAWN_ATTEMPTS {
                if !names.contains(&name) {
                    break;
                }
                name = random_name(&mut self.rng);
            }

            let person = self.spawn(name.clone(), position, role);
            taken.insert(position);
            names.insert(name);
            self.store.insert(person);
            placed += 1;
        }
        info!(placed, "town populated");
        placed
    }

    fn spawn(&mut self, name: String, position: GridPos, role: RoleType) -> Person {
        let mut person = Person::generate(name, position, role, &mut self.rng);
        let money_offset = person.money - DEFAULT_MONEY;
        person.money = (self.config.starting_money + money_offset).max(0.0);
        person.max_health = self.config.starting_health;
        person.health = self.config.starting_health;
        person.inventory_capacity = self.config.inventory_capacity;
        person
    }

    /// Advance the town by `dt` real seconds.
    pub fn tick(&mut self, dt: f32, grid: &dyn TileGrid) -> Vec<DialogueEvent> {
        let mut events = match self.orchestrator.as_mut() {
            Some(orchestrator) => orchestrator.update(&mut self.store, &self.clock, self.paused),
            None => Vec::new(),
        };
        if self.paused {
            return events;
        }

        let game_minutes = self.clock.advance(f64::from(dt));
        let now = self.clock.total_minutes();

        self.movement.update(&mut self.store, grid, dt, &mut self.rng);
        self.health.update(&mut self.store, game_minutes);
        self.relationships.decay(&mut self.store, game_minutes);

        let pairs = self.proximity.update(&self.store, now, &mut self.rng);
        for (a, b) in pairs {
            if let Some(event) = self.initiate_interaction(a, b) {
                events.push(event);
            }
        }
        events
    }

    /// Both sides roll against their willingness. If both agree the pair
    /// stops walking and either starts a conversation or has a simulated one.
    ///
    /// Returns an event only for a simulated chat; orchestrated conversations
    /// report through later ticks.
    pub fn initiate_interaction(&mut self, a: PersonId, b: PersonId) -> Option<DialogueEvent> {
        let (Some(person_a), Some(person_b)) = (self.store.get(a), self.store.get(b)) else {
            return None;
        };
        if person_a.in_conversation || person_b.in_conversation {
            return None;
        }
        let willing_a = RelationshipSystem::willingness(person_a, b);
        let willing_b = RelationshipSystem::willingness(person_b, a);
        if self.rng.gen::<f32>() > willing_a || self.rng.gen::<f32>() > willing_b {
            return None;
        }

        let now = self.clock.total_minutes();
        self.proximity.record_interaction(a, b, now);
        for id in [a, b] {
            if let Some(person) = self.store.get_mut(id) {
                MovementSystem::stop(person);
            }
        }

        match self.orchestrator.as_mut() {
            Some(orchestrator) => {
                if let Err(e) = orchestrator.initiate(&mut self.store, &self.clock, a, b) {
                    debug!(error = %e, "could not start conversation");
                }
                None
            }
            None => Some(self.simulate_chat(a, b)),
        }
    }

    fn simulate_chat(&mut self, a: PersonId, b: PersonId) -> DialogueEvent {
        let delta = self.rng.gen_range(SIMULATED_DELTA_MIN..SIMULATED_DELTA_MAX);
        let summary = format!("Had a brief chat on Day {}", self.clock.day());
        RelationshipSystem::update_from_conversation(
            &mut self.store,
            a,
            b,
            delta,
            delta,
            &summary,
            self.clock.total_minutes(),
        );
        info!(
            a = self.store.name_of(a).unwrap_or_default(),
            b = self.store.name_of(b).unwrap_or_default(),
            delta,
            "simulated chat"
        );
        DialogueEvent::Simulated {
            a,
            b,
            feeling_delta: delta,
            summary,
        }
    }

    /// Start a conversation directly, bypassing proximity and willingness.
    pub fn start_conversation(
        &mut self,
        a: PersonId,
        b: PersonId,
    ) -> Option<Result<ConversationId, OrchestratorError>> {
        let orchestrator = self.orchestrator.as_mut()?;
        for id in [a, b] {
            if let Some(person) = self.store.get_mut(id) {
                MovementSystem::stop(person);
            }
        }
        Some(orchestrator.initiate(&mut self.store, &self.clock, a, b))
    }

    /// Stop the orchestrator, if any, releasing everyone still talking.
    pub fn shutdown(&mut self) {
        if let Some(orchestrator) = self.orchestrator.as_mut() {
            orchestrator.shutdown(&mut self.store);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::OpenField;

    fn quiet_config() -> SimConfig {
        SimConfig::default()
            .with_population(0)
            .with_conversation_chance(1.0)
    }

    #[test]
    fn test_populate_places_everyone_on_distinct_tiles() {
        let field = OpenField::new(30, 30);
        let mut sim = Simulation::new(SimConfig::default().with_population(12), 7);
        assert_eq!(sim.populate(&field), 12);

        let positions: HashSet<_> = sim.store.iter().map(|p| p.position).collect();
        assert_eq!(positions.len(), 12);
        assert!(sim.store.iter().all(|p| field.is_walkable(p.position)));
        assert!(sim.store.iter().any(|p| p.role.role_type == RoleType::Guard));
    }

    #[test]
    fn test_populate_uses_configured_vitals() {
        let field = OpenField::new(10, 10);
        let mut sim = Simulation::new(
            SimConfig::default()
                .with_population(3)
                .with_starting_vitals(80.0, 200.0),
            3,
        );
        sim.populate(&field);
        for person in sim.store.iter() {
            assert_eq!(person.health, 80.0);
            assert_eq!(person.max_health, 80.0);
            assert!(person.money >= 180.0 && person.money < 230.0);
        }
    }

    #[test]
    fn test_populate_stops_when_full() {
        let field = OpenField::new(2, 2);
        let mut sim = Simulation::new(SimConfig::default().with_population(10), 1);
        assert_eq!(sim.populate(&field), 4);
    }

    #[test]
    fn test_paused_tick_freezes_clock() {
        let field = OpenField::new(10, 10);
        let mut sim = Simulation::new(quiet_config(), 1);
        let before = sim.clock.total_minutes();
        sim.pause();
        sim.tick(1.0, &field);
        assert_eq!(sim.clock.total_minutes(), before);

        sim.resume();
        sim.tick(1.0, &field);
        assert_eq!(sim.clock.total_minutes(), before + 1.0);
    }

    #[test]
    fn test_simulated_chat_between_neighbours() {
        let field = OpenField::new(10, 10);
        let mut sim = Simulation::new(quiet_config().with_movement_speed(0.0), 11);
        let a = sim.add_person(Person::new("Ada Miller", GridPos::new(2, 2), RoleType::Villager));
        let b = sim.add_person(Person::new("Bram Cooper", GridPos::new(3, 2), RoleType::Guard));
        for id in [a, b] {
            let person = sim.store.get_mut(id).unwrap();
            person.personality.traits.insert("friendliness".into(), 1.0);
        }

        let events = sim.tick(0.05, &field);
        let chat = events.iter().find_map(|e| match e {
            DialogueEvent::Simulated { summary, feeling_delta, .. } => Some((summary.clone(), *feeling_delta)),
            _ => None,
        });
        let (summary, delta) = chat.expect("neighbours should chat");
        assert_eq!(summary, "Had a brief chat on Day 1");
        assert!((SIMULATED_DELTA_MIN..SIMULATED_DELTA_MAX).contains(&delta));

        let rel = sim.store.get(a).unwrap().relationship(b).unwrap();
        assert_eq!(rel.history, vec![summary]);
        assert!(!sim.store.get(a).unwrap().in_conversation);

        // Cooldown keeps them from chatting again straight away.
        let events = sim.tick(0.05, &field);
        assert!(!events.iter().any(|e| matches!(e, DialogueEvent::Simulated { .. })));
    }

    #[test]
    fn test_interaction_skips_people_already_talking() {
        let mut sim = Simulation::new(quiet_config(), 5);
        let a = sim.add_person(Person::new("Ada Miller", GridPos::new(0, 0), RoleType::Villager));
        let b = sim.add_person(Person::new("Bram Cooper", GridPos::new(1, 0), RoleType::Guard));
        sim.store.get_mut(a).unwrap().in_conversation = true;
        assert!(sim.initiate_interaction(a, b).is_none());
        assert!(sim.store.get(b).unwrap().relationship(a).is_none());
    }
}
