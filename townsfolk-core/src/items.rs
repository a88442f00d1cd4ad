//! Standard town goods and the catalog used to resolve item names.
//!
//! Language-model output names items freely ("Bread", "a loaf", "iron_ore"),
//! so lookups accept either the id or the display name, case-insensitively.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Food,
    Tool,
    Material,
    Luxury,
    Weapon,
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemCategory::Food => "food",
            ItemCategory::Tool => "tool",
            ItemCategory::Material => "material",
            ItemCategory::Luxury => "luxury",
            ItemCategory::Weapon => "weapon",
        };
        f.write_str(name)
    }
}

/// An item that can sit in an inventory slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: ItemCategory,
    pub base_value: f32,
    pub weight: f32,
    pub stackable: bool,
    pub max_stack: u32,
    /// Health restored when eaten, for food.
    pub health_restore: Option<f32>,
}

impl Item {
    pub fn new(id: &str, name: &str, category: ItemCategory, base_value: f32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            category,
            base_value,
            weight: 1.0,
            stackable: true,
            max_stack: 99,
            health_restore: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_health_restore(mut self, amount: f32) -> Self {
        self.health_restore = Some(amount);
        self
    }

    pub fn unstackable(mut self) -> Self {
        self.stackable = false;
        self.max_stack = 1;
        self
    }
}

/// Resolves free-text item identifiers to catalog entries.
pub trait ItemCatalog: Send + Sync {
    /// Look up by id or display name, case-insensitively.
    fn get_item(&self, id_or_name: &str) -> Option<Item>;
}

/// The built-in goods list.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCatalog;

impl ItemCatalog for StandardCatalog {
    fn get_item(&self, id_or_name: &str) -> Option<Item> {
        get_item(id_or_name)
    }
}

/// Find a standard item by id or name.
///
/// Also accepts names with spaces in place of underscores ("iron ore").
pub fn get_item(id_or_name: &str) -> Option<Item> {
    let key = id_or_name.trim().to_lowercase();
    if key.is_empty() {
        return None;
    }
    let as_id = key.replace(' ', "_");
    STANDARD_ITEMS
        .iter()
        .find(|item| item.id == key || item.id == as_id || item.name.to_lowercase() == key)
        .cloned()
}

/// All standard items in a category.
pub fn items_in_category(category: ItemCategory) -> Vec<Item> {
    STANDARD_ITEMS
        .iter()
        .filter(|item| item.category == category)
        .cloned()
        .collect()
}

lazy_static::lazy_static! {
    /// Goods traded around town.
    pub static ref STANDARD_ITEMS: Vec<Item> = vec![
        Item::new("bread", "Bread", ItemCategory::Food, 5.0)
            .with_description("A fresh loaf of bread")
            .with_health_restore(10.0),
        Item::new("apple", "Apple", ItemCategory::Food, 2.0)
            .with_description("A crisp red apple")
            .with_health_restore(5.0),
        Item::new("ale", "Ale", ItemCategory::Food, 8.0)
            .with_description("A mug of frothy ale")
            .with_health_restore(3.0),
        Item::new("iron_ore", "Iron Ore", ItemCategory::Material, 15.0)
            .with_description("Raw iron ore from the mines"),
        Item::new("cloth", "Cloth", ItemCategory::Material, 10.0)
            .with_description("A bolt of woven cloth"),
        Item::new("sword", "Sword", ItemCategory::Weapon, 50.0)
            .with_description("A simple iron sword")
            .unstackable(),
        Item::new("hammer", "Hammer", ItemCategory::Tool, 25.0)
            .with_description("A blacksmith's hammer")
            .unstackable(),
        Item::new("gold_ring", "Gold Ring", ItemCategory::Luxury, 100.0)
            .with_description("A shiny gold ring")
            .unstackable(),
        Item::new("wheat", "Wheat", ItemCategory::Material, 3.0)
            .with_description("A bundle of wheat"),
        Item::new("rope", "Rope", ItemCategory::Tool, 8.0)
            .with_description("A sturdy length of rope"),
    ];
}
