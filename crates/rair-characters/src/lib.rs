//! Character state, combat resolution, and the effect lifecycle engine.
//!
//! Everything in this crate is synchronous and free of I/O. A world
//! instance owns [`Character`] values and drives them through the
//! functions exposed here; nothing in this crate ever reaches another
//! character directly. Effects that need to touch someone else push a
//! [`WorldCommand`] onto the [`Outbox`] and the world applies it after the
//! current step.
//!
//! # Modules
//!
//! - [`character`] -- Character runtime state, action queue, combat snapshots
//! - [`stats`] -- Base and bonus stat blocks
//! - [`pool`] -- Clamped resource pools (health, mana)
//! - [`dice`] -- Dice rolling
//! - [`combat`] -- The combat resolver
//! - [`skills`] -- Directly used skills (attack, combust, cure)
//! - [`effects`] -- Effect lifecycle, registry, catalog, and concrete effects
//! - [`error`] -- Error types
//!
//! [`Character`]: character::Character
//! [`WorldCommand`]: effects::WorldCommand
//! [`Outbox`]: effects::Outbox

pub mod character;
pub mod combat;
pub mod dice;
pub mod effects;
pub mod error;
pub mod pool;
pub mod skills;
pub mod stats;

pub use character::{ActionQueue, Character, CharacterCore, CombatantSnapshot, QueueOverflow, Roster};
pub use error::{CastRejection, CharacterError};
