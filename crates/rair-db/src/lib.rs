//! Storage for the Rair world simulation.
//!
//! `Dragonfly` holds the saved state of every player and the boss-timer
//! records of each map. Worlds never call this crate directly: the server
//! hands a [`DragonflyStore`] to the persistence worker through the
//! [`rair_core::persistence::PersistenceBackend`] trait.
//!
//! # Modules
//!
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) key operations
//! - [`error`] -- Shared error types

pub mod dragonfly;
pub mod error;

pub use dragonfly::DragonflyStore;
pub use error::DbError;
