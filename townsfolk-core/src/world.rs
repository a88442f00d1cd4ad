//! Town world state: identifiers, grid coordinates, the game clock and the
//! entity store that owns every person.

use crate::person::{Person, PersonSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a person in the town.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersonId(pub Uuid);

impl PersonId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PersonId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Grid
// ============================================================================

/// Integer tile coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// True when `other` is one of the eight surrounding tiles.
    pub fn is_adjacent(&self, other: &GridPos) -> bool {
        let dx = (self.x - other.x).abs();
        let dy = (self.y - other.y).abs();
        dx <= 1 && dy <= 1 && (dx, dy) != (0, 0)
    }

    /// Chebyshev distance in tiles.
    pub fn distance(&self, other: &GridPos) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Facing direction used for sprites and for turning toward a partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    #[default]
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    /// Direction of travel from `from` toward `to`. Returns `None` for the same tile.
    pub fn between(from: GridPos, to: GridPos) -> Option<Self> {
        let dx = (to.x - from.x).signum();
        let dy = (to.y - from.y).signum();
        match (dx, dy) {
            (0, -1) => Some(Direction::North),
            (1, -1) => Some(Direction::NorthEast),
            (1, 0) => Some(Direction::East),
            (1, 1) => Some(Direction::SouthEast),
            (0, 1) => Some(Direction::South),
            (-1, 1) => Some(Direction::SouthWest),
            (-1, 0) => Some(Direction::West),
            (-1, -1) => Some(Direction::NorthWest),
            _ => None,
        }
    }
}

// ============================================================================
// Game Clock
// ============================================================================

pub const MINUTES_PER_DAY: f64 = 1440.0;

/// Clock starts at 08:00 on day 1.
const START_MINUTES: f64 = 480.0;

/// Coarse period of the day used in prompts and schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn name(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Simulation clock, independent of wall-clock time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameClock {
    minutes: f64,
    day: u32,
    /// Game minutes that pass per real second.
    time_scale: f64,
}

impl Default for GameClock {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl GameClock {
    pub fn new(time_scale: f64) -> Self {
        Self {
            minutes: START_MINUTES,
            day: 1,
            time_scale,
        }
    }

    /// Advance by `real_seconds` of wall time. Returns the game minutes elapsed.
    pub fn advance(&mut self, real_seconds: f64) -> f64 {
        let elapsed = real_seconds.max(0.0) * self.time_scale;
        self.advance_minutes(elapsed);
        elapsed
    }

    /// Advance by a number of game minutes directly.
    pub fn advance_minutes(&mut self, minutes: f64) {
        self.minutes += minutes.max(0.0);
        while self.minutes >= MINUTES_PER_DAY {
            self.minutes -= MINUTES_PER_DAY;
            self.day += 1;
        }
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    pub fn hour(&self) -> u32 {
        (self.minutes / 60.0) as u32
    }

    pub fn minute(&self) -> u32 {
        (self.minutes % 60.0) as u32
    }

    /// Minutes since midnight of the current day.
    pub fn minutes_of_day(&self) -> f64 {
        self.minutes
    }

    /// Monotonic game minutes since the start of day 1. Used for cooldowns
    /// and relationship timestamps so midnight does not wrap them.
    pub fn total_minutes(&self) -> f64 {
        f64::from(self.day - 1) * MINUTES_PER_DAY + self.minutes
    }

    /// `HH:MM`.
    pub fn time_string(&self) -> String {
        format!("{:02}:{:02}", self.hour(), self.minute())
    }

    pub fn time_of_day(&self) -> TimeOfDay {
        match self.hour() {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=20 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    pub fn is_daytime(&self) -> bool {
        (6..20).contains(&self.hour())
    }
}

// ============================================================================
// Entity Store
// ============================================================================

/// Owns every person record. Only the simulation thread touches it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityStore {
    people: HashMap<PersonId, Person>,
    /// Insertion order, so iteration is stable across runs.
    order: Vec<PersonId>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a person, returning their id.
    pub fn insert(&mut self, person: Person) -> PersonId {
        let id = person.id;
        if self.people.insert(id, person).is_none() {
            self.order.push(id);
        }
        id
    }

    pub fn remove(&mut self, id: PersonId) -> Option<Person> {
        self.order.retain(|other| *other != id);
        self.people.remove(&id)
    }

    pub fn get(&self, id: PersonId) -> Option<&Person> {
        self.people.get(&id)
    }

    pub fn get_mut(&mut self, id: PersonId) -> Option<&mut Person> {
        self.people.get_mut(&id)
    }

    pub fn contains(&self, id: PersonId) -> bool {
        self.people.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    pub fn ids(&self) -> Vec<PersonId> {
        self.order.clone()
    }

    /// People in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Person> {
        self.order.iter().filter_map(|id| self.people.get(id))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Person> {
        self.people.values_mut()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Person> {
        let lower = name.to_lowercase();
        self.iter().find(|p| p.name.to_lowercase() == lower)
    }

    pub fn name_of(&self, id: PersonId) -> Option<&str> {
        self.people.get(&id).map(|p| p.name.as_str())
    }

    pub fn snapshot(&self, id: PersonId) -> Option<PersonSnapshot> {
        self.people.get(&id).map(Person::snapshot)
    }

    /// People standing on the eight tiles around `id`.
    pub fn adjacent_to(&self, id: PersonId) -> Vec<PersonId> {
        let Some(person) = self.people.get(&id) else {
            return Vec::new();
        };
        self.iter()
            .filter(|other| other.id != id && other.position.is_adjacent(&person.position))
            .map(|other| other.id)
            .collect()
    }
}
