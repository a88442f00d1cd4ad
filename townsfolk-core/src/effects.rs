//! Interpreted actions, resolved outcomes, and the effect vocabulary the
//! state applier understands.
//!
//! Resolver output is loosely typed JSON. It is first normalized (null and
//! zero entries dropped) and then read into [`Effect`] values. Keys outside
//! the vocabulary are ignored so novel model output never breaks application.

use crate::world::PersonId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// Bound on the relationship change a single action may cause.
pub const RELATIONSHIP_DELTA_LIMIT: f32 = 0.5;

/// A candidate action pulled out of a dialogue line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretedAction {
    /// Literal restatement of the marked text.
    pub description: String,
    /// Free-form goal label ("give", "harm", "leave", ...).
    pub intent: String,
    pub actor_id: PersonId,
    pub target_id: PersonId,
    pub is_physical: bool,
    pub ends_conversation: bool,
    pub confidence: f32,
}

/// Result of resolving an [`InterpretedAction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: InterpretedAction,
    pub success: bool,
    /// In [0, 1].
    pub degree: f32,
    pub actor_effects: EffectMap,
    pub target_effects: EffectMap,
    pub narrative: String,
    /// Applied to the target's feeling toward the actor.
    pub relationship_delta: f32,
}

impl ActionOutcome {
    /// Failed, effect-free outcome used whenever resolution breaks down.
    pub fn neutral(action: InterpretedAction) -> Self {
        Self {
            action,
            success: false,
            degree: 0.0,
            actor_effects: EffectMap::default(),
            target_effects: EffectMap::default(),
            narrative: String::new(),
            relationship_delta: 0.0,
        }
    }

    pub fn has_effects(&self) -> bool {
        !self.actor_effects.is_empty() || !self.target_effects.is_empty()
    }
}

// ============================================================================
// Effects
// ============================================================================

/// An item reference as named by the resolver, not yet checked against the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuantity {
    pub item: String,
    pub quantity: u32,
}

impl ItemQuantity {
    pub fn one(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            quantity: 1,
        }
    }
}

impl fmt::Display for ItemQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quantity > 1 {
            write!(f, "{} {}", self.quantity, self.item)
        } else {
            f.write_str(&self.item)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Effect {
    Health(f32),
    Gold(f32),
    AddCondition(String),
    RemoveCondition(String),
    AddItems(Vec<ItemQuantity>),
    RemoveItems(Vec<ItemQuantity>),
}

/// The effects for one side of an outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectMap {
    effects: Vec<Effect>,
}

impl From<Vec<Effect>> for EffectMap {
    fn from(effects: Vec<Effect>) -> Self {
        Self { effects }
    }
}

impl EffectMap {
    /// Read a raw JSON effect object. Anything other than an object is empty.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(raw) => Self::from_normalized(&normalize_effects(raw)),
            _ => Self::default(),
        }
    }

    /// Read an already-normalized map, skipping unknown keys and bad values.
    pub fn from_normalized(map: &Map<String, Value>) -> Self {
        let mut effects = Vec::new();
        for (key, value) in map {
            match key.as_str() {
                "health" | "health_delta" => effects.extend(number(value).map(Effect::Health)),
                "gold" | "gold_delta" | "money" => effects.extend(number(value).map(Effect::Gold)),
                "add_condition" | "add_conditions" => effects.extend(
                    strings(value)
                        .into_iter()
                        .map(Effect::AddCondition),
                ),
                "remove_condition" | "remove_conditions" => effects.extend(
                    strings(value)
                        .into_iter()
                        .map(Effect::RemoveCondition),
                ),
                "add_item" | "add_items" | "receive_item" => {
                    let items = item_list(value);
                    if !items.is_empty() {
                        effects.push(Effect::AddItems(items));
                    }
                }
                "remove_item" | "remove_items" | "give_item" => {
                    let items = item_list(value);
                    if !items.is_empty() {
                        effects.push(Effect::RemoveItems(items));
                    }
                }
                other => debug!(key = other, "ignoring unknown effect key"),
            }
        }
        Self { effects }
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.effects.iter()
    }

    pub fn health(&self) -> f32 {
        self.sum(|e| match e {
            Effect::Health(v) => Some(*v),
            _ => None,
        })
    }

    pub fn gold(&self) -> f32 {
        self.sum(|e| match e {
            Effect::Gold(v) => Some(*v),
            _ => None,
        })
    }

    fn sum(&self, pick: impl Fn(&Effect) -> Option<f32>) -> f32 {
        self.effects.iter().filter_map(pick).sum()
    }

    /// Short factual clauses about `name`, ordered health, conditions, gold, items.
    pub fn describe(&self, name: &str) -> Vec<String> {
        let mut clauses = Vec::new();

        let health = self.health();
        if health < 0.0 {
            clauses.push(format!("{name} loses {:.0} health", health.abs()));
        } else if health > 0.0 {
            clauses.push(format!("{name} recovers {health:.0} health"));
        }

        for effect in &self.effects {
            match effect {
                Effect::AddCondition(c) => clauses.push(format!("{name} suffers {c}")),
                Effect::RemoveCondition(c) => clauses.push(format!("{name} is no longer {c}")),
                _ => {}
            }
        }

        let gold = self.gold();
        if gold > 0.0 {
            clauses.push(format!("{name} receives {gold:.0} gold"));
        } else if gold < 0.0 {
            clauses.push(format!("{name} loses {:.0} gold", gold.abs()));
        }

        for effect in &self.effects {
            match effect {
                Effect::AddItems(items) => {
                    clauses.extend(items.iter().map(|i| format!("{name} receives {i}")))
                }
                Effect::RemoveItems(items) => {
                    clauses.extend(items.iter().map(|i| format!("{name} loses {i}")))
                }
                _ => {}
            }
        }
        clauses
    }
}

impl fmt::Display for EffectMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .effects
            .iter()
            .map(|effect| match effect {
                Effect::Health(v) => format!("health {v:+.0}"),
                Effect::Gold(v) => format!("gold {v:+.0}"),
                Effect::AddCondition(c) => format!("+{c}"),
                Effect::RemoveCondition(c) => format!("-{c}"),
                Effect::AddItems(items) => format!(
                    "+[{}]",
                    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
                ),
                Effect::RemoveItems(items) => format!(
                    "-[{}]",
                    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
                ),
            })
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Drop entries whose value is null, zero, an empty string, or an empty list.
pub fn normalize_effects(raw: &Map<String, Value>) -> Map<String, Value> {
    raw.iter()
        .filter(|(_, value)| !is_no_op(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn is_no_op(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Number(n) => n.as_f64().map_or(true, |v| v == 0.0),
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.iter().all(is_no_op),
        Value::Bool(b) => !b,
        Value::Object(map) => map.is_empty(),
    }
}

fn number(value: &Value) -> Option<f32> {
    let v = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_start_matches('+').parse::<f64>().ok()?,
        _ => return None,
    };
    (v.is_finite() && v != 0.0).then_some(v as f32)
}

fn strings(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Value::Array(items) => items.iter().flat_map(strings).collect(),
        _ => Vec::new(),
    }
}

fn item_list(value: &Value) -> Vec<ItemQuantity> {
    match value {
        Value::String(s) if !s.trim().is_empty() => vec![ItemQuantity::one(s.trim())],
        Value::Array(items) => items.iter().flat_map(item_list).collect(),
        Value::Object(obj) => {
            let name = ["item", "id", "name"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
                .map(str::trim)
                .filter(|s| !s.is_empty());
            let quantity = obj
                .get("quantity")
                .and_then(Value::as_u64)
                .unwrap_or(1)
                .clamp(1, u64::from(u32::MAX)) as u32;
            name.map(|item| vec![ItemQuantity {
                item: item.to_string(),
                quantity,
            }])
            .unwrap_or_default()
        }
        _ => Vec::new(),
    }
}
