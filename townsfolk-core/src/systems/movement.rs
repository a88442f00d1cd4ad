//! Walking along paths and idle wandering.

use crate::person::Person;
use crate::world::{Direction, EntityStore, GridPos};
use rand::{Rng, RngCore};

/// Tiles per real second.
pub const DEFAULT_MOVEMENT_SPEED: f32 = 2.0;

/// Per-tick chance that an idle person picks somewhere new to go.
const WANDER_CHANCE: f64 = 0.01;
const WANDER_RADIUS: i32 = 15;
const WANDER_ATTEMPTS: usize = 10;

/// The map as movement sees it. Pathfinding lives with the map.
pub trait TileGrid {
    fn is_walkable(&self, pos: GridPos) -> bool;

    /// Path from `from` to `to`, including both ends, or `None` if unreachable.
    fn find_path(&self, from: GridPos, to: GridPos) -> Option<Vec<GridPos>>;

    fn random_walkable(&self, rng: &mut dyn RngCore) -> Option<GridPos>;
}

/// A rectangle with no obstacles. Paths step diagonally, then straight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenField {
    pub width: i32,
    pub height: i32,
}

impl OpenField {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

impl TileGrid for OpenField {
    fn is_walkable(&self, pos: GridPos) -> bool {
        (0..self.width).contains(&pos.x) && (0..self.height).contains(&pos.y)
    }

    fn find_path(&self, from: GridPos, to: GridPos) -> Option<Vec<GridPos>> {
        if !self.is_walkable(from) || !self.is_walkable(to) {
            return None;
        }
        let mut path = vec![from];
        let mut current = from;
        while current != to {
            current = GridPos::new(
                current.x + (to.x - current.x).signum(),
                current.y + (to.y - current.y).signum(),
            );
            path.push(current);
        }
        Some(path)
    }

    fn random_walkable(&self, rng: &mut dyn RngCore) -> Option<GridPos> {
        if self.width <= 0 || self.height <= 0 {
            return None;
        }
        Some(GridPos::new(
            rng.gen_range(0..self.width),
            rng.gen_range(0..self.height),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct MovementSystem {
    speed: f32,
}

impl Default for MovementSystem {
    fn default() -> Self {
        Self::new(DEFAULT_MOVEMENT_SPEED)
    }
}

impl MovementSystem {
    pub fn new(speed: f32) -> Self {
        Self { speed }
    }

    /// Advance everyone not in a conversation by `dt` real seconds.
    pub fn update<R: Rng>(&self, store: &mut EntityStore, grid: &dyn TileGrid, dt: f32, rng: &mut R) {
        for id in store.ids() {
            let Some(person) = store.get_mut(id) else {
                continue;
            };
            if person.in_conversation || !person.is_alive() {
                continue;
            }
            if person.is_moving() {
                self.step(person, dt);
            } else if rng.gen_bool(WANDER_CHANCE) {
                Self::pick_random_destination(person, grid, rng);
            }
        }
    }

    fn step(&self, person: &mut Person, dt: f32) {
        if let Some(next) = person.path.get(person.path_index) {
            if let Some(facing) = Direction::between(person.position, *next) {
                person.facing = facing;
            }
        }

        person.move_progress += self.speed * dt;
        while person.move_progress >= 1.0 && person.path_index < person.path.len() {
            person.move_progress -= 1.0;
            person.position = person.path[person.path_index];
            person.path_index += 1;
        }
        if person.path_index >= person.path.len() {
            Self::stop(person);
        }
    }

    fn pick_random_destination<R: Rng>(person: &mut Person, grid: &dyn TileGrid, rng: &mut R) {
        for _ in 0..WANDER_ATTEMPTS {
            let target = GridPos::new(
                person.position.x + rng.gen_range(-WANDER_RADIUS..=WANDER_RADIUS),
                person.position.y + rng.gen_range(-WANDER_RADIUS..=WANDER_RADIUS),
            );
            if Self::set_destination(person, grid, target) {
                return;
            }
        }
    }

    /// Route `person` to `destination`. Returns false if it is not reachable.
    pub fn set_destination(person: &mut Person, grid: &dyn TileGrid, destination: GridPos) -> bool {
        if destination == person.position || !grid.is_walkable(destination) {
            return false;
        }
        let Some(path) = grid.find_path(person.position, destination) else {
            return false;
        };
        if path.len() < 2 {
            return false;
        }
        person.path = path[1..].to_vec();
        person.path_index = 0;
        person.move_progress = 0.0;
        person.target = Some(destination);
        true
    }

    pub fn stop(person: &mut Person) {
        person.path.clear();
        person.path_index = 0;
        person.move_progress = 0.0;
        person.target = None;
    }
}
