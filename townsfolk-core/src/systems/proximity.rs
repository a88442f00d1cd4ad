//! Finds adjacent idle pairs who might strike up a conversation.

use crate::world::{EntityStore, PersonId};
use rand::Rng;
use std::collections::{HashMap, HashSet};

/// Game minutes before the same pair may interact again.
pub const DEFAULT_INTERACTION_COOLDOWN: f64 = 30.0;
pub const DEFAULT_CONVERSATION_CHANCE: f64 = 0.7;

#[derive(Debug, Clone)]
pub struct ProximitySystem {
    cooldowns: HashMap<(PersonId, PersonId), f64>,
    cooldown: f64,
    chance: f64,
}

impl Default for ProximitySystem {
    fn default() -> Self {
        Self::new(DEFAULT_INTERACTION_COOLDOWN, DEFAULT_CONVERSATION_CHANCE)
    }
}

fn pair_key(a: PersonId, b: PersonId) -> (PersonId, PersonId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl ProximitySystem {
    pub fn new(cooldown_minutes: f64, conversation_chance: f64) -> Self {
        Self {
            cooldowns: HashMap::new(),
            cooldown: cooldown_minutes,
            chance: conversation_chance.clamp(0.0, 1.0),
        }
    }

    /// Adjacent pairs, neither already talking nor on cooldown, that pass
    /// the conversation roll. Each pair appears at most once.
    pub fn update<R: Rng>(&self, store: &EntityStore, game_time: f64, rng: &mut R) -> Vec<(PersonId, PersonId)> {
        let mut checked = HashSet::new();
        let mut pairs = Vec::new();

        for person in store.iter() {
            if person.in_conversation || !person.is_alive() {
                continue;
            }
            for other_id in store.adjacent_to(person.id) {
                let Some(other) = store.get(other_id) else {
                    continue;
                };
                if other.in_conversation || !other.is_alive() {
                    continue;
                }
                if !checked.insert(pair_key(person.id, other_id)) {
                    continue;
                }
                if !self.can_interact(person.id, other_id, game_time) {
                    continue;
                }
                if rng.gen_bool(self.chance) {
                    pairs.push((person.id, other_id));
                }
            }
        }
        pairs
    }

    pub fn can_interact(&self, a: PersonId, b: PersonId, game_time: f64) -> bool {
        self.cooldown_remaining(a, b, game_time) <= 0.0
    }

    pub fn record_interaction(&mut self, a: PersonId, b: PersonId, game_time: f64) {
        self.cooldowns.insert(pair_key(a, b), game_time);
    }

    pub fn cooldown_remaining(&self, a: PersonId, b: PersonId, game_time: f64) -> f64 {
        match self.cooldowns.get(&pair_key(a, b)) {
            Some(last) => (self.cooldown - (game_time - last)).max(0.0),
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::person::{Person, RoleType};
    use crate::world::GridPos;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn town(positions: &[(i32, i32)]) -> (EntityStore, Vec<PersonId>) {
        let mut store = EntityStore::new();
        let ids = positions
            .iter()
            .enumerate()
            .map(|(i, (x, y))| {
                store.insert(Person::new(
                    format!("Person {i}"),
                    GridPos::new(*x, *y),
                    RoleType::Villager,
                ))
            })
            .collect();
        (store, ids)
    }

    #[test]
    fn test_adjacent_pair_found_once() {
        let (store, ids) = town(&[(0, 0), (1, 1), (5, 5)]);
        let system = ProximitySystem::new(30.0, 1.0);
        let pairs = system.update(&store, 0.0, &mut StdRng::seed_from_u64(0));
        assert_eq!(pairs.len(), 1);
        assert_eq!(pair_key(pairs[0].0, pairs[0].1), pair_key(ids[0], ids[1]));
    }

    #[test]
    fn test_cooldown_blocks_pair() {
        let (store, ids) = town(&[(0, 0), (1, 0)]);
        let mut system = ProximitySystem::new(30.0, 1.0);
        system.record_interaction(ids[1], ids[0], 100.0);

        assert!(!system.can_interact(ids[0], ids[1], 120.0));
        assert_eq!(system.cooldown_remaining(ids[0], ids[1], 120.0), 10.0);
        assert!(system.update(&store, 120.0, &mut StdRng::seed_from_u64(0)).is_empty());
        assert!(system.can_interact(ids[0], ids[1], 130.0));
    }

    #[test]
    fn test_busy_people_skipped() {
        let (mut store, ids) = town(&[(0, 0), (1, 0)]);
        store.get_mut(ids[0]).unwrap().in_conversation = true;
        let system = ProximitySystem::new(30.0, 1.0);
        assert!(system.update(&store, 0.0, &mut StdRng::seed_from_u64(0)).is_empty());
    }

    #[test]
    fn test_zero_chance_never_pairs() {
        let (store, _) = town(&[(0, 0), (1, 0)]);
        let system = ProximitySystem::new(30.0, 0.0);
        assert!(system.update(&store, 0.0, &mut StdRng::seed_from_u64(0)).is_empty());
    }
}
