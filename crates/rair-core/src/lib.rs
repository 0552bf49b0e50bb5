//! World instances, the tick scheduler, and spawners for the Rair
//! simulation.
//!
//! One [`World`] per map owns its characters and spawners outright. The
//! tick cycle runs three phases on their own rates: character actions,
//! effect ticks, and spawner updates. Persistence is submitted to a
//! background worker and never awaited from the tick.
//!
//! # Modules
//!
//! - [`clock`] -- Tick counter and phase-rate gating
//! - [`config`] -- Loading `rair-config.yaml` into typed structs
//! - [`content`] -- NPC templates and the spawner catalog
//! - [`geometry`] -- Map walls, distance, line of sight
//! - [`spawner`] -- Population control around an anchor point
//! - [`notify`] -- Outbound notification sinks
//! - [`persistence`] -- Fire-and-forget saves of players and boss timers
//! - [`world`] -- The map instance and cross-character command handling
//! - [`commands`] -- Player command parsing and execution
//! - [`tick`] -- The phased tick cycle
//! - [`runner`] -- The timed world loop and operator controls
//!
//! [`World`]: world::World

pub mod clock;
pub mod commands;
pub mod config;
pub mod content;
pub mod geometry;
pub mod notify;
pub mod persistence;
pub mod runner;
pub mod spawner;
pub mod tick;
pub mod world;
