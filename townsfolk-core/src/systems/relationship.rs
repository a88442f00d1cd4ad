//! Relationship drift, willingness to talk, and post-conversation updates.

use crate::ai::Reflection;
use crate::person::Person;
use crate::world::{EntityStore, PersonId};

/// Feeling lost (or regained, if negative) per game hour without contact.
pub const DEFAULT_DECAY_PER_HOUR: f32 = 0.001;

const MIN_WILLINGNESS: f32 = 0.1;
const FEELING_WEIGHT: f32 = 0.3;

#[derive(Debug, Clone, Copy)]
pub struct RelationshipSystem {
    decay_per_hour: f32,
}

impl Default for RelationshipSystem {
    fn default() -> Self {
        Self::new(DEFAULT_DECAY_PER_HOUR)
    }
}

impl RelationshipSystem {
    pub fn new(decay_per_hour: f32) -> Self {
        Self { decay_per_hour }
    }

    /// Pull every feeling toward neutral without crossing zero.
    pub fn decay(&self, store: &mut EntityStore, game_minutes: f64) {
        let amount = self.decay_per_hour * (game_minutes / 60.0) as f32;
        if amount <= 0.0 {
            return;
        }
        for person in store.iter_mut() {
            for rel in person.relationships.values_mut() {
                if rel.feeling > 0.0 {
                    rel.feeling = (rel.feeling - amount).max(0.0);
                } else if rel.feeling < 0.0 {
                    rel.feeling = (rel.feeling + amount).min(0.0);
                }
            }
        }
    }

    /// How keen `person` is to talk to `other`, in [0.1, 1].
    pub fn willingness(person: &Person, other: PersonId) -> f32 {
        let base = person.personality.trait_value("friendliness").unwrap_or(0.5);
        let feeling = person.relationship(other).map_or(0.0, |rel| rel.feeling);
        (base + feeling * FEELING_WEIGHT).clamp(MIN_WILLINGNESS, 1.0)
    }

    /// Record a finished conversation on both sides with a shared summary.
    pub fn update_from_conversation(
        store: &mut EntityStore,
        a: PersonId,
        b: PersonId,
        delta_a: f32,
        delta_b: f32,
        summary: &str,
        game_time: f64,
    ) {
        let (Some(name_a), Some(name_b)) = (
            store.name_of(a).map(str::to_string),
            store.name_of(b).map(str::to_string),
        ) else {
            return;
        };
        if let Some(person) = store.get_mut(a) {
            person.update_relationship(b, &name_b, delta_a, None, Some(summary), game_time);
        }
        if let Some(person) = store.get_mut(b) {
            person.update_relationship(a, &name_a, delta_b, None, Some(summary), game_time);
        }
    }

    /// Fold one participant's reflection into their view of the other.
    pub fn apply_reflection(
        person: &mut Person,
        other: PersonId,
        other_name: &str,
        reflection: &Reflection,
        game_time: f64,
    ) {
        person.update_relationship(
            other,
            other_name,
            reflection.feeling_delta,
            reflection.observation.as_deref(),
            Some(&reflection.summary),
            game_time,
        );
    }
}
