//! Applies resolved outcomes to the entity store.

use crate::effects::{ActionOutcome, Effect, EffectMap, RELATIONSHIP_DELTA_LIMIT};
use crate::items::ItemCatalog;
use crate::person::Person;
use crate::world::{EntityStore, PersonId};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApplyError {
    #[error("participant {0} is no longer present")]
    MissingParticipant(PersonId),
}

/// What actually changed when an outcome was applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    pub applied: usize,
    /// Item names the catalog did not recognize.
    pub skipped_items: Vec<String>,
    /// Items that could not be added or removed (full inventory, not held).
    pub failed_items: Vec<String>,
}

/// Mutates people according to an [`ActionOutcome`]. Runs on the simulation
/// thread only.
pub struct StateApplier<'a> {
    catalog: &'a dyn ItemCatalog,
}

impl<'a> StateApplier<'a> {
    pub fn new(catalog: &'a dyn ItemCatalog) -> Self {
        Self { catalog }
    }

    /// Apply both effect maps and the relationship delta.
    ///
    /// Both participants are checked before anything is touched, so a missing
    /// participant leaves the store unchanged.
    pub fn apply_outcome(
        &self,
        outcome: &ActionOutcome,
        store: &mut EntityStore,
        game_time: f64,
    ) -> Result<ApplyReport, ApplyError> {
        let actor_id = outcome.action.actor_id;
        let target_id = outcome.action.target_id;
        let actor_name = store
            .name_of(actor_id)
            .ok_or(ApplyError::MissingParticipant(actor_id))?
            .to_string();
        if !store.contains(target_id) {
            return Err(ApplyError::MissingParticipant(target_id));
        }

        let mut report = ApplyReport::default();
        if let Some(actor) = store.get_mut(actor_id) {
            self.apply_effects(actor, &outcome.actor_effects, &mut report);
        }
        if let Some(target) = store.get_mut(target_id) {
            self.apply_effects(target, &outcome.target_effects, &mut report);

            let delta = outcome
                .relationship_delta
                .clamp(-RELATIONSHIP_DELTA_LIMIT, RELATIONSHIP_DELTA_LIMIT);
            if delta != 0.0 {
                target.update_relationship(
                    actor_id,
                    &actor_name,
                    delta,
                    Some(outcome.action.description.as_str()),
                    None,
                    game_time,
                );
                report.applied += 1;
            }
        }

        if report.applied > 0 {
            info!(
                action = %outcome.action.description,
                actor = %outcome.actor_effects,
                target = %outcome.target_effects,
                "applied action outcome"
            );
        }
        Ok(report)
    }

    /// Apply one side's effects to a single person.
    pub fn apply_effects(&self, person: &mut Person, effects: &EffectMap, report: &mut ApplyReport) {
        for effect in effects.iter() {
            match effect {
                Effect::Health(delta) => {
                    person.change_health(*delta);
                    report.applied += 1;
                }
                Effect::Gold(delta) => {
                    person.change_money(*delta);
                    report.applied += 1;
                }
                Effect::AddCondition(condition) => {
                    if person.add_condition(condition) {
                        report.applied += 1;
                    }
                }
                Effect::RemoveCondition(condition) => {
                    if person.remove_condition(condition) {
                        report.applied += 1;
                    }
                }
                Effect::AddItems(items) => {
                    for entry in items {
                        let Some(item) = self.catalog.get_item(&entry.item) else {
                            debug!(item = %entry.item, "skipping unknown item");
                            report.skipped_items.push(entry.item.clone());
                            continue;
                        };
                        if person.add_item(item, entry.quantity) {
                            report.applied += 1;
                        } else {
                            report.failed_items.push(entry.item.clone());
                        }
                    }
                }
                Effect::RemoveItems(items) => {
                    for entry in items {
                        let Some(item) = self.catalog.get_item(&entry.item) else {
                            debug!(item = %entry.item, "skipping unknown item");
                            report.skipped_items.push(entry.item.clone());
                            continue;
                        };
                        // Take what is held if the resolver asked for more.
                        let quantity = entry.quantity.min(person.item_count(&item.id));
                        if quantity > 0 && person.remove_item(&item.id, quantity) {
                            report.applied += 1;
                        } else {
                            report.failed_items.push(entry.item.clone());
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::InterpretedAction;
    use crate::items::{self, StandardCatalog};
    use crate::person::RoleType;
    use crate::world::GridPos;
    use serde_json::{json, Value};

    fn setup() -> (EntityStore, PersonId, PersonId) {
        let mut store = EntityStore::new();
        let actor = store.insert(
            Person::new("Harold Baker", GridPos::new(0, 0), RoleType::Farmer).with_money(20.0),
        );
        let target = store.insert(
            Person::new("Grace Mason", GridPos::new(1, 0), RoleType::Shopkeeper)
                .with_money(10.0)
                .with_health(50.0, 100.0),
        );
        (store, actor, target)
    }

    fn outcome(actor: PersonId, target: PersonId, actor_fx: Value, target_fx: Value) -> ActionOutcome {
        ActionOutcome {
            action: InterpretedAction {
                description: "hands over 5 gold".into(),
                intent: "give".into(),
                actor_id: actor,
                target_id: target,
                is_physical: true,
                ends_conversation: false,
                confidence: 1.0,
            },
            success: true,
            degree: 1.0,
            actor_effects: EffectMap::from_json(&actor_fx),
            target_effects: EffectMap::from_json(&target_fx),
            narrative: String::new(),
            relationship_delta: 0.0,
        }
    }

    #[test]
    fn test_health_clamps_at_zero() {
        let (mut store, actor, target) = setup();
        let outcome = outcome(actor, target, json!({}), json!({"health": -1000}));
        StateApplier::new(&StandardCatalog)
            .apply_outcome(&outcome, &mut store, 0.0)
            .unwrap();
        assert_eq!(store.get(target).unwrap().health, 0.0);
    }

    #[test]
    fn test_health_clamps_at_max() {
        let (mut store, actor, target) = setup();
        let outcome = outcome(actor, target, json!({}), json!({"health": 500}));
        StateApplier::new(&StandardCatalog)
            .apply_outcome(&outcome, &mut store, 0.0)
            .unwrap();
        assert_eq!(store.get(target).unwrap().health, 100.0);
    }

    #[test]
    fn test_gold_never_negative() {
        let (mut store, actor, target) = setup();
        let outcome = outcome(actor, target, json!({"gold": -50}), json!({"gold": 50}));
        StateApplier::new(&StandardCatalog)
            .apply_outcome(&outcome, &mut store, 0.0)
            .unwrap();
        assert_eq!(store.get(actor).unwrap().money, 0.0);
        assert_eq!(store.get(target).unwrap().money, 60.0);
    }

    #[test]
    fn test_items_resolved_through_catalog() {
        let (mut store, actor, target) = setup();
        store
            .get_mut(actor)
            .unwrap()
            .add_item(items::get_item("bread").unwrap(), 2);

        let outcome = outcome(
            actor,
            target,
            json!({"remove_items": ["Bread"]}),
            json!({"add_items": ["bread", "dragon egg"]}),
        );
        let report = StateApplier::new(&StandardCatalog)
            .apply_outcome(&outcome, &mut store, 0.0)
            .unwrap();

        assert_eq!(store.get(actor).unwrap().item_count("bread"), 1);
        assert_eq!(store.get(target).unwrap().item_count("bread"), 1);
        assert_eq!(report.skipped_items, vec!["dragon egg".to_string()]);
    }

    #[test]
    fn test_remove_unheld_item_is_harmless() {
        let (mut store, actor, target) = setup();
        let outcome = outcome(
            actor,
            target,
            json!({"remove_items": [{"item": "rope", "quantity": 2}]}),
            json!({}),
        );
        let report = StateApplier::new(&StandardCatalog)
            .apply_outcome(&outcome, &mut store, 0.0)
            .unwrap();
        assert_eq!(report.failed_items, vec!["rope".to_string()]);
        assert!(store.get(actor).unwrap().inventory.is_empty());
    }

    #[test]
    fn test_conditions_added_and_removed() {
        let (mut store, actor, target) = setup();
        let first = outcome(actor, target, json!({}), json!({"add_condition": "bruised"}));
        let applier = StateApplier::new(&StandardCatalog);
        applier.apply_outcome(&first, &mut store, 0.0).unwrap();
        assert!(store.get(target).unwrap().has_condition("bruised"));

        let second = outcome(actor, target, json!({}), json!({"remove_condition": "Bruised"}));
        applier.apply_outcome(&second, &mut store, 0.0).unwrap();
        assert!(!store.get(target).unwrap().has_condition("bruised"));
    }

    #[test]
    fn test_relationship_delta_goes_to_target() {
        let (mut store, actor, target) = setup();
        let mut outcome = outcome(actor, target, json!({}), json!({}));
        outcome.relationship_delta = 0.9;
        StateApplier::new(&StandardCatalog)
            .apply_outcome(&outcome, &mut store, 42.0)
            .unwrap();

        let rel = store.get(target).unwrap().relationship(actor).unwrap();
        assert_eq!(rel.feeling, RELATIONSHIP_DELTA_LIMIT);
        assert_eq!(rel.notes, vec!["hands over 5 gold".to_string()]);
        assert_eq!(rel.last_interaction, 42.0);
        assert!(store.get(actor).unwrap().relationship(target).is_none());
    }

    #[test]
    fn test_missing_participant_changes_nothing() {
        let (mut store, actor, target) = setup();
        let outcome = outcome(actor, target, json!({"gold": -5}), json!({"gold": 5}));
        store.remove(target);
        let err = StateApplier::new(&StandardCatalog)
            .apply_outcome(&outcome, &mut store, 0.0)
            .unwrap_err();
        assert_eq!(err, ApplyError::MissingParticipant(target));
        assert_eq!(store.get(actor).unwrap().money, 20.0);
    }

    #[test]
    fn test_neutral_outcome_changes_nothing() {
        let (mut store, actor, target) = setup();
        let before: Vec<(f32, f32, usize)> = [actor, target]
            .iter()
            .map(|id| {
                let p = store.get(*id).unwrap();
                (p.health, p.money, p.inventory.len())
            })
            .collect();
        let neutral = ActionOutcome::neutral(outcome(actor, target, json!({}), json!({})).action);
        let report = StateApplier::new(&StandardCatalog)
            .apply_outcome(&neutral, &mut store, 0.0)
            .unwrap();
        assert_eq!(report.applied, 0);
        let after: Vec<(f32, f32, usize)> = [actor, target]
            .iter()
            .map(|id| {
                let p = store.get(*id).unwrap();
                (p.health, p.money, p.inventory.len())
            })
            .collect();
        assert_eq!(before, after);
    }
}
