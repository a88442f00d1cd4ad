//! Per-tick systems run by the simulation driver.
//!
//! Each system owns only its tuning constants and any bookkeeping it needs
//! across ticks (proximity cooldowns). People live in the [`EntityStore`],
//! which every system borrows for the duration of its update.
//!
//! [`EntityStore`]: crate::world::EntityStore

pub mod health;
pub mod movement;
pub mod proximity;
pub mod relationship;

pub use health::HealthSystem;
pub use movement::{MovementSystem, OpenField, TileGrid};
pub use proximity::ProximitySystem;
pub use relationship::RelationshipSystem;
