//! Person records: vitals, inventory, personality, role and relationships.

use crate::items::{self, Item};
use crate::world::{Direction, GridPos, PersonId};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub const DEFAULT_HEALTH: f32 = 100.0;
pub const DEFAULT_MONEY: f32 = 50.0;
pub const INVENTORY_CAPACITY: usize = 20;

/// Summaries of past conversations kept per relationship.
pub const MAX_HISTORY: usize = 10;

/// Memorable notes kept per relationship.
pub const MAX_NOTES: usize = 5;

pub const PERSONALITY_TRAITS: [&str; 6] = [
    "friendliness",
    "greed",
    "honesty",
    "bravery",
    "curiosity",
    "patience",
];

pub const SPEECH_STYLES: [&str; 6] = ["formal", "casual", "gruff", "flowery", "terse", "cheerful"];

const QUIRKS: [&str; 8] = [
    "Always mentions the weather",
    "Uses food metaphors constantly",
    "Sighs dramatically when thinking",
    "Speaks in short, clipped sentences",
    "Tends to repeat the last thing they heard",
    "Often looks around nervously",
    "Laughs at their own observations",
    "Frequently mentions their family",
];

const FIRST_NAMES: [&str; 24] = [
    "Ada", "Marcus", "Elena", "Thomas", "Maria", "John", "Sarah", "William", "Emma", "James",
    "Olivia", "Henry", "Sophia", "George", "Isabella", "Edward", "Mia", "Arthur", "Charlotte",
    "Frederick", "Amelia", "Albert", "Grace", "Harold",
];

const LAST_NAMES: [&str; 15] = [
    "Smith", "Cooper", "Fletcher", "Miller", "Baker", "Thatcher", "Mason", "Wright", "Taylor",
    "Ward", "Cook", "Stone", "Rivers", "Woods", "Hill",
];

/// Random "First Last" name.
pub fn random_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let first = FIRST_NAMES.choose(rng).copied().unwrap_or("Ada");
    let last = LAST_NAMES.choose(rng).copied().unwrap_or("Smith");
    format!("{first} {last}")
}

// ============================================================================
// Role
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    Shopkeeper,
    Farmer,
    Guard,
    Villager,
    Blacksmith,
    Innkeeper,
}

impl RoleType {
    pub const ALL: [RoleType; 6] = [
        RoleType::Shopkeeper,
        RoleType::Farmer,
        RoleType::Guard,
        RoleType::Villager,
        RoleType::Blacksmith,
        RoleType::Innkeeper,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RoleType::Shopkeeper => "shopkeeper",
            RoleType::Farmer => "farmer",
            RoleType::Guard => "guard",
            RoleType::Villager => "villager",
            RoleType::Blacksmith => "blacksmith",
            RoleType::Innkeeper => "innkeeper",
        }
    }

    pub fn goals(&self) -> Vec<String> {
        let goals: &[&str] = match self {
            RoleType::Shopkeeper => &["Make profitable trades", "Build a loyal customer base"],
            RoleType::Farmer => &["Have a good harvest", "Sell crops at fair prices"],
            RoleType::Guard => &["Keep the peace", "Protect the townspeople"],
            RoleType::Villager => &["Live a peaceful life", "Help neighbors when needed"],
            RoleType::Blacksmith => &["Craft quality goods", "Find rare materials"],
            RoleType::Innkeeper => &["Keep guests happy", "Hear interesting stories"],
        };
        goals.iter().map(|g| g.to_string()).collect()
    }

    /// Item ids a new person of this role carries.
    pub fn starting_items(&self) -> &'static [&'static str] {
        match self {
            RoleType::Shopkeeper => &["bread", "cloth", "rope"],
            RoleType::Farmer => &["wheat", "apple", "bread"],
            RoleType::Guard => &["sword", "bread"],
            RoleType::Villager => &["bread", "apple"],
            RoleType::Blacksmith => &["hammer", "iron_ore"],
            RoleType::Innkeeper => &["ale", "bread", "bread"],
        }
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A person's job plus where they tend to be during each part of the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub role_type: RoleType,
    pub workplace: Option<String>,
    /// Time-of-day name to a location hint ("workplace", "home", "patrol", ...).
    pub schedule: BTreeMap<String, String>,
}

impl Role {
    pub fn new(role_type: RoleType) -> Self {
        let entries: &[(&str, &str)] = match role_type {
            RoleType::Shopkeeper => &[
                ("morning", "workplace"),
                ("afternoon", "workplace"),
                ("evening", "home"),
                ("night", "home"),
            ],
            RoleType::Farmer => &[
                ("morning", "workplace"),
                ("afternoon", "workplace"),
                ("evening", "tavern"),
                ("night", "home"),
            ],
            RoleType::Guard => &[
                ("morning", "patrol"),
                ("afternoon", "patrol"),
                ("evening", "patrol"),
                ("night", "home"),
            ],
            _ => &[],
        };
        Self {
            role_type,
            workplace: None,
            schedule: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

// ============================================================================
// Personality
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    /// Trait name to score in [0, 1].
    pub traits: BTreeMap<String, f32>,
    pub background: String,
    pub speech_style: String,
    pub quirks: Vec<String>,
    pub goals: Vec<String>,
}

impl Personality {
    /// Every trait at 0.5, casual speech, no quirks.
    pub fn balanced(role_type: RoleType) -> Self {
        Self {
            traits: PERSONALITY_TRAITS
                .iter()
                .map(|t| (t.to_string(), 0.5))
                .collect(),
            background: String::new(),
            speech_style: "casual".to_string(),
            quirks: Vec::new(),
            goals: role_type.goals(),
        }
    }

    pub fn generate_random<R: Rng + ?Sized>(name: &str, role_type: RoleType, rng: &mut R) -> Self {
        let traits = PERSONALITY_TRAITS
            .iter()
            .map(|t| (t.to_string(), rng.gen::<f32>()))
            .collect();

        let backgrounds = [
            format!("{name} grew up in this town and knows everyone."),
            format!("{name} arrived from a distant land seeking opportunity."),
            format!("{name} inherited their trade from their parents."),
            format!("{name} was once a traveler who decided to settle down."),
            format!("{name} has lived here all their life and loves the simple ways."),
        ];
        let background = backgrounds.choose(rng).cloned().unwrap_or_default();

        let quirk_count = rng.gen_range(1..=2);
        let quirks = QUIRKS
            .choose_multiple(rng, quirk_count)
            .map(|q| q.to_string())
            .collect();

        Self {
            traits,
            background,
            speech_style: SPEECH_STYLES.choose(rng).copied().unwrap_or("casual").to_string(),
            quirks,
            goals: role_type.goals(),
        }
    }

    pub fn trait_value(&self, name: &str) -> Option<f32> {
        self.traits.get(name).copied()
    }
}

// ============================================================================
// Relationship
// ============================================================================

/// One person's view of another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub other_id: PersonId,
    pub other_name: String,
    /// Clamped to [-1, 1].
    pub feeling: f32,
    pub interaction_count: u32,
    /// Game minutes (see `GameClock::total_minutes`).
    pub last_interaction: f64,
    pub history: Vec<String>,
    pub notes: Vec<String>,
}

impl Relationship {
    pub fn new(other_id: PersonId, other_name: impl Into<String>) -> Self {
        Self {
            other_id,
            other_name: other_name.into(),
            feeling: 0.0,
            interaction_count: 0,
            last_interaction: 0.0,
            history: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Move the feeling score, staying within [-1, 1].
    pub fn adjust_feeling(&mut self, delta: f32) {
        self.feeling = (self.feeling + delta).clamp(-1.0, 1.0);
    }

    pub fn push_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
        if self.notes.len() > MAX_NOTES {
            let excess = self.notes.len() - MAX_NOTES;
            self.notes.drain(..excess);
        }
    }

    pub fn push_history(&mut self, summary: impl Into<String>) {
        self.history.push(summary.into());
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }

    pub fn feeling_label(&self) -> &'static str {
        match self.feeling {
            f if f > 0.5 => "close friend",
            f if f > 0.2 => "friendly",
            f if f > -0.2 => "neutral",
            f if f > -0.5 => "wary",
            _ => "hostile",
        }
    }

    /// Feeling label plus the latest note, truncated for narrow displays.
    pub fn display_summary(&self) -> String {
        let label = self.feeling_label();
        match self.notes.last() {
            Some(note) if note.chars().count() > 40 => {
                let short: String = note.chars().take(37).collect();
                format!("{label} - {short}...")
            }
            Some(note) => format!("{label} - {note}"),
            None => label.to_string(),
        }
    }
}

// ============================================================================
// Inventory
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySlot {
    pub item: Item,
    pub quantity: u32,
}

// ============================================================================
// Person
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,

    // Position and movement
    pub position: GridPos,
    pub target: Option<GridPos>,
    pub path: Vec<GridPos>,
    pub path_index: usize,
    /// Fraction of the way to the next path tile, in [0, 1).
    pub move_progress: f32,
    pub facing: Direction,

    // Vitals
    pub health: f32,
    pub max_health: f32,
    pub money: f32,
    pub age: u32,
    pub conditions: Vec<String>,

    pub inventory: Vec<InventorySlot>,
    pub inventory_capacity: usize,

    pub personality: Personality,
    pub role: Role,
    pub relationships: HashMap<PersonId, Relationship>,

    // Conversation flags, maintained by `Conversation`.
    pub in_conversation: bool,
    pub conversation_partner: Option<PersonId>,
}

impl Person {
    /// A person with default vitals and a balanced personality.
    pub fn new(name: impl Into<String>, position: GridPos, role_type: RoleType) -> Self {
        Self {
            id: PersonId::new(),
            name: name.into(),
            position,
            target: None,
            path: Vec::new(),
            path_index: 0,
            move_progress: 0.0,
            facing: Direction::default(),
            health: DEFAULT_HEALTH,
            max_health: DEFAULT_HEALTH,
            money: DEFAULT_MONEY,
            age: 30,
            conditions: Vec::new(),
            inventory: Vec::new(),
            inventory_capacity: INVENTORY_CAPACITY,
            personality: Personality::balanced(role_type),
            role: Role::new(role_type),
            relationships: HashMap::new(),
            in_conversation: false,
            conversation_partner: None,
        }
    }

    /// A randomized townsperson with role-based starting goods.
    pub fn generate<R: Rng + ?Sized>(
        name: impl Into<String>,
        position: GridPos,
        role_type: RoleType,
        rng: &mut R,
    ) -> Self {
        let name = name.into();
        let mut person = Self::new(name.clone(), position, role_type);
        person.money = DEFAULT_MONEY + rng.gen_range(-20.0..30.0);
        person.age = rng.gen_range(18..=65);
        person.personality = Personality::generate_random(&name, role_type, rng);
        for id in role_type.starting_items() {
            if let Some(item) = items::get_item(id) {
                person.add_item(item, 1);
            }
        }
        person
    }

    pub fn with_money(mut self, money: f32) -> Self {
        self.money = money;
        self
    }

    pub fn with_health(mut self, health: f32, max_health: f32) -> Self {
        self.max_health = max_health;
        self.health = health.clamp(0.0, max_health);
        self
    }

    pub fn with_personality(mut self, personality: Personality) -> Self {
        self.personality = personality;
        self
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    /// Position interpolated toward the next path tile.
    pub fn render_position(&self) -> (f32, f32) {
        match self.path.get(self.path_index) {
            Some(next) => (
                self.position.x as f32 + (next.x - self.position.x) as f32 * self.move_progress,
                self.position.y as f32 + (next.y - self.position.y) as f32 * self.move_progress,
            ),
            None => (self.position.x as f32, self.position.y as f32),
        }
    }

    pub fn is_moving(&self) -> bool {
        self.path_index < self.path.len()
    }

    // ------------------------------------------------------------------
    // Vitals
    // ------------------------------------------------------------------

    /// Apply a health delta, clamped to [0, max_health].
    pub fn change_health(&mut self, delta: f32) {
        self.health = (self.health + delta).clamp(0.0, self.max_health);
    }

    /// Apply a gold delta, never going below zero.
    pub fn change_money(&mut self, delta: f32) {
        self.money = (self.money + delta).max(0.0);
    }

    /// Add a condition label. Labels are compared case-insensitively.
    pub fn add_condition(&mut self, condition: &str) -> bool {
        let condition = condition.trim();
        if condition.is_empty() || self.has_condition(condition) {
            return false;
        }
        self.conditions.push(condition.to_string());
        true
    }

    pub fn remove_condition(&mut self, condition: &str) -> bool {
        let lower = condition.trim().to_lowercase();
        let before = self.conditions.len();
        self.conditions.retain(|c| c.to_lowercase() != lower);
        self.conditions.len() != before
    }

    pub fn has_condition(&self, condition: &str) -> bool {
        let lower = condition.trim().to_lowercase();
        self.conditions.iter().any(|c| c.to_lowercase() == lower)
    }

    pub fn conditions_string(&self) -> String {
        if self.conditions.is_empty() {
            "none".to_string()
        } else {
            self.conditions.join(", ")
        }
    }

    // ------------------------------------------------------------------
    // Inventory
    // ------------------------------------------------------------------

    /// Add items, stacking where allowed. Returns false when there is no room.
    pub fn add_item(&mut self, item: Item, quantity: u32) -> bool {
        if quantity == 0 {
            return true;
        }
        if item.stackable {
            if let Some(slot) = self
                .inventory
                .iter_mut()
                .find(|s| s.item.id == item.id && s.quantity + quantity <= item.max_stack)
            {
                slot.quantity += quantity;
                return true;
            }
        }
        if self.inventory.len() >= self.inventory_capacity {
            return false;
        }
        self.inventory.push(InventorySlot { item, quantity });
        true
    }

    /// Remove items by id. Returns false if not enough are held.
    pub fn remove_item(&mut self, item_id: &str, quantity: u32) -> bool {
        let Some(index) = self
            .inventory
            .iter()
            .position(|s| s.item.id == item_id && s.quantity >= quantity)
        else {
            return false;
        };
        let slot = &mut self.inventory[index];
        slot.quantity -= quantity;
        if slot.quantity == 0 {
            self.inventory.remove(index);
        }
        true
    }

    pub fn has_item(&self, item_id: &str, quantity: u32) -> bool {
        self.item_count(item_id) >= quantity
    }

    pub fn item_count(&self, item_id: &str) -> u32 {
        self.inventory
            .iter()
            .filter(|s| s.item.id == item_id)
            .map(|s| s.quantity)
            .sum()
    }

    /// "Bread x2, Rope" or "Empty".
    pub fn inventory_string(&self) -> String {
        if self.inventory.is_empty() {
            return "Empty".to_string();
        }
        self.inventory
            .iter()
            .map(|s| {
                if s.quantity > 1 {
                    format!("{} x{}", s.item.name, s.quantity)
                } else {
                    s.item.name.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    // ------------------------------------------------------------------
    // Relationships
    // ------------------------------------------------------------------

    pub fn relationship(&self, other: PersonId) -> Option<&Relationship> {
        self.relationships.get(&other)
    }

    /// The relationship toward `other`, created on first reference.
    pub fn relationship_mut(&mut self, other: PersonId, other_name: &str) -> &mut Relationship {
        let rel = self
            .relationships
            .entry(other)
            .or_insert_with(|| Relationship::new(other, other_name));
        if rel.other_name.is_empty() {
            rel.other_name = other_name.to_string();
        }
        rel
    }

    /// Record an interaction with `other`.
    pub fn update_relationship(
        &mut self,
        other: PersonId,
        other_name: &str,
        feeling_delta: f32,
        note: Option<&str>,
        summary: Option<&str>,
        game_time: f64,
    ) {
        let rel = self.relationship_mut(other, other_name);
        rel.adjust_feeling(feeling_delta);
        rel.interaction_count += 1;
        rel.last_interaction = game_time;
        if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
            rel.push_note(note);
        }
        if let Some(summary) = summary.filter(|s| !s.trim().is_empty()) {
            rel.push_history(summary);
        }
    }

    /// Read-only copy of the fields background jobs need.
    pub fn snapshot(&self) -> PersonSnapshot {
        PersonSnapshot {
            id: self.id,
            name: self.name.clone(),
            role: self.role.role_type,
            health: self.health,
            max_health: self.max_health,
            money: self.money,
            conditions: self.conditions_string(),
            inventory: self.inventory_string(),
        }
    }
}

/// Owned view of a person handed to worker jobs, which never touch the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonSnapshot {
    pub id: PersonId,
    pub name: String,
    pub role: RoleType,
    pub health: f32,
    pub max_health: f32,
    pub money: f32,
    pub conditions: String,
    pub inventory: String,
}
