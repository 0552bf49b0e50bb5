//! Configuration loading and typed config structures for the Rair world
//! simulation.
//!
//! The canonical configuration lives in `rair-config.yaml` at the project
//! root. Every section has defaults, so an empty file (or no file at all)
//! yields a runnable single-map server.

use std::collections::BTreeMap;
use std::path::Path;

use rair_characters::QueueOverflow;
use rair_types::Position;
use serde::Deserialize;

use crate::content::NpcDefinition;
use crate::spawner::SpawnerConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is not usable.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level server configuration.
///
/// Mirrors the structure of `rair-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RairConfig {
    /// Tick period and random seed.
    #[serde(default)]
    pub server: ServerConfig,

    /// Phase sub-rates.
    #[serde(default)]
    pub rates: TickRates,

    /// Per-character bookkeeping.
    #[serde(default)]
    pub characters: CharacterConfig,

    /// Repeated-failure limits.
    #[serde(default)]
    pub faults: FaultConfig,

    /// Background persistence.
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Infrastructure connection strings.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// One entry per world instance.
    #[serde(default = "default_maps")]
    pub maps: Vec<MapConfig>,

    /// NPC definitions keyed by content id.
    #[serde(default)]
    pub content: BTreeMap<String, NpcDefinition>,
}

impl RairConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values for infrastructure URLs:
    /// - `NATS_URL` overrides `infrastructure.nats_url`
    /// - `DRAGONFLY_URL` overrides `infrastructure.dragonfly_url`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if the tick rates are unusable.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if the tick rates are unusable.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.infrastructure.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rates.validate()?;
        if self.server.tick_period_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "server.tick_period_ms must be at least 1".to_owned(),
            });
        }
        if self.characters.action_queue_length == 0 {
            return Err(ConfigError::Invalid {
                reason: "characters.action_queue_length must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

/// Server-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Real-time milliseconds per tick.
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,

    /// Random seed. Each map derives its own stream from it.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: default_tick_period_ms(),
            seed: default_seed(),
        }
    }
}

/// Phase sub-rates, each "every Nth tick".
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TickRates {
    /// Character bookkeeping, commands, and NPC AI.
    #[serde(default = "default_one")]
    pub character_action: u64,

    /// Effect lifecycle ticks.
    #[serde(default = "default_one")]
    pub buff: u64,

    /// Spawner population maintenance.
    #[serde(default = "default_one")]
    pub spawner: u64,

    /// Save every character.
    #[serde(default = "default_persistence_rate")]
    pub persistence: u64,
}

impl Default for TickRates {
    fn default() -> Self {
        Self {
            character_action: default_one(),
            buff: default_one(),
            spawner: default_one(),
            persistence: default_persistence_rate(),
        }
    }
}

impl TickRates {
    /// Reject zero rates and a persistence rate that is not a multiple of
    /// every other rate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending rate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("character_action", self.character_action),
            ("buff", self.buff),
            ("spawner", self.spawner),
            ("persistence", self.persistence),
        ];
        for (name, rate) in named {
            if rate == 0 {
                return Err(ConfigError::Invalid {
                    reason: format!("rates.{name} must be at least 1"),
                });
            }
        }
        for (name, rate) in named {
            if self.persistence.checked_rem(rate) != Some(0) {
                return Err(ConfigError::Invalid {
                    reason: format!(
                        "rates.persistence ({}) must be a multiple of rates.{name} ({rate})",
                        self.persistence
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Per-character bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CharacterConfig {
    /// Bound on queued commands per character.
    #[serde(default = "default_action_queue_length")]
    pub action_queue_length: usize,

    /// What a full queue drops.
    #[serde(default)]
    pub queue_overflow: QueueOverflow,

    /// Character-action ticks a fed player lasts before starving.
    #[serde(default = "default_hunger_ticks")]
    pub hunger_ticks: u32,

    /// In-combat countdown set by a hit.
    #[serde(default = "default_combat_ticks")]
    pub combat_ticks: u32,

    /// Ticks a dead player waits before reviving.
    #[serde(default = "default_death_ticks")]
    pub death_ticks: u32,

    /// Regeneration applies every this many character-action ticks.
    #[serde(default = "default_regen_interval")]
    pub regen_interval: u64,

    /// Health a freshly created player starts with.
    #[serde(default = "default_starting_hp")]
    pub starting_hp: i64,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            action_queue_length: default_action_queue_length(),
            queue_overflow: QueueOverflow::default(),
            hunger_ticks: default_hunger_ticks(),
            combat_ticks: default_combat_ticks(),
            death_ticks: default_death_ticks(),
            regen_interval: default_regen_interval(),
            starting_hp: default_starting_hp(),
        }
    }
}

/// Repeated-failure limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FaultConfig {
    /// Failed hooks before an effect is force-removed.
    #[serde(default = "default_effect_fault_limit")]
    pub effect_fault_limit: u32,

    /// Consecutive failed steps before a spawner is disabled.
    #[serde(default = "default_spawner_fault_limit")]
    pub spawner_fault_limit: u32,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            effect_fault_limit: default_effect_fault_limit(),
            spawner_fault_limit: default_spawner_fault_limit(),
        }
    }
}

/// Background persistence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersistenceConfig {
    /// Pending save requests before new ones are dropped.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Infrastructure connection strings. Absent means "not used".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// Dragonfly (Redis-compatible) URL.
    #[serde(default)]
    pub dragonfly_url: Option<String>,

    /// NATS messaging URL.
    #[serde(default)]
    pub nats_url: Option<String>,
}

impl InfrastructureConfig {
    /// Override infrastructure URLs with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("NATS_URL") {
            self.nats_url = Some(val);
        }
        if let Ok(val) = std::env::var("DRAGONFLY_URL") {
            self.dragonfly_url = Some(val);
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// One world instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MapConfig {
    /// Map name. Unique per server.
    pub name: String,

    /// Impassable tiles. Empty means open field.
    #[serde(default)]
    pub walls: Vec<Position>,

    /// How far characters can see.
    #[serde(default = "default_sight_radius")]
    pub sight_radius: u32,

    /// Spawners placed at startup.
    #[serde(default)]
    pub spawners: Vec<SpawnerDefinition>,
}

impl MapConfig {
    /// An empty open map.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            walls: Vec::new(),
            sight_radius: default_sight_radius(),
            spawners: Vec::new(),
        }
    }
}

/// A spawner placed on a map.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpawnerDefinition {
    /// Label for logs.
    pub name: String,

    /// Anchor tile.
    pub anchor: Position,

    /// Population settings.
    #[serde(default)]
    pub config: SpawnerConfig,
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_tick_period_ms() -> u64 {
    1000
}

const fn default_seed() -> u64 {
    42
}

const fn default_one() -> u64 {
    1
}

const fn default_persistence_rate() -> u64 {
    60
}

const fn default_action_queue_length() -> usize {
    5
}

const fn default_hunger_ticks() -> u32 {
    3600
}

const fn default_combat_ticks() -> u32 {
    10
}

const fn default_death_ticks() -> u32 {
    30
}

const fn default_regen_interval() -> u64 {
    5
}

const fn default_starting_hp() -> i64 {
    100
}

const fn default_effect_fault_limit() -> u32 {
    5
}

const fn default_spawner_fault_limit() -> u32 {
    10
}

const fn default_channel_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_sight_radius() -> u32 {
    8
}

fn default_maps() -> Vec<MapConfig> {
    vec![MapConfig::named("overworld")]
}
