//! Shared type definitions for the Rair world simulation.
//!
//! This crate contains the types that cross crate boundaries: identifiers,
//! stat and damage vocabularies, the persisted records handed to and from
//! the storage collaborator, and the notification payloads delivered to
//! connected clients. It has no simulation logic.
//!
//! Client-facing payloads derive [`ts_rs::TS`] so that matching TypeScript
//! bindings can be exported for the game client.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for characters, spawners, effects
//! - [`enums`] -- Stats, damage classes, alignment, character kind
//! - [`position`] -- Grid position and distance helpers
//! - [`state`] -- Persisted character and spawner-timer records
//! - [`notification`] -- Outbound notification payloads and audiences
//! - [`inbound`] -- Inbound transport messages

pub mod enums;
pub mod ids;
pub mod inbound;
pub mod notification;
pub mod position;
pub mod state;

pub use enums::{Alignment, CharacterKind, DamageClass, Stat};
pub use ids::{CharacterId, EffectId, SpawnerId};
pub use inbound::InboundMessage;
pub use notification::{Audience, EffectView, IconData, MessageKind, Notification, NpcView, WorldEvent};
pub use position::Position;
pub use state::{CharacterState, PersistedEffect, SpawnerTimerRecord};
