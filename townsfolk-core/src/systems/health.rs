//! Slow natural healing.

use crate::world::EntityStore;

/// Health regained per game minute.
pub const DEFAULT_REGEN_PER_MINUTE: f32 = 0.1;

#[derive(Debug, Clone, Copy)]
pub struct HealthSystem {
    regen_per_minute: f32,
}

impl Default for HealthSystem {
    fn default() -> Self {
        Self::new(DEFAULT_REGEN_PER_MINUTE)
    }
}

impl HealthSystem {
    pub fn new(regen_per_minute: f32) -> Self {
        Self { regen_per_minute }
    }

    /// Heal every living, injured person for `game_minutes`. The dead stay dead.
    pub fn update(&self, store: &mut EntityStore, game_minutes: f64) {
        let amount = self.regen_per_minute * game_minutes as f32;
        if amount <= 0.0 {
            return;
        }
        for person in store.iter_mut() {
            if person.is_alive() && person.health < person.max_health {
                person.change_health(amount);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::person::{Person, RoleType};
    use crate::world::GridPos;

    #[test]
    fn test_regenerates_up_to_max() {
        let mut store = EntityStore::new();
        let hurt = store.insert(
            Person::new("Ada Miller", GridPos::new(0, 0), RoleType::Villager).with_health(90.0, 100.0),
        );
        let dead = store.insert(
            Person::new("Bram Cooper", GridPos::new(1, 0), RoleType::Guard).with_health(0.0, 100.0),
        );

        let system = HealthSystem::new(0.5);
        system.update(&mut store, 10.0);
        assert_eq!(store.get(hurt).unwrap().health, 95.0);
        system.update(&mut store, 60.0);
        assert_eq!(store.get(hurt).unwrap().health, 100.0);
        assert_eq!(store.get(dead).unwrap().health, 0.0);
    }
}
