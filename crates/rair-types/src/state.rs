//! Records exchanged with the persistence collaborator.
//!
//! These are plain data: the simulation crates convert to and from them at
//! the world boundary (player join/leave, persistence ticks, shutdown).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::enums::{Alignment, Stat};
use crate::ids::CharacterId;
use crate::position::Position;

/// Saved form of a player character.
///
/// Only base stats are stored. Bonuses granted by effects are rebuilt when
/// the saved effects are re-applied on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterState {
    /// Stable identifier, shared across world instances.
    pub id: CharacterId,
    /// Display name.
    pub name: String,
    /// Map the character was last saved on.
    #[serde(default)]
    pub map: String,
    /// Character level.
    #[serde(default = "default_level")]
    pub level: u32,
    /// Alignment.
    #[serde(default)]
    pub alignment: Alignment,
    /// Last known position.
    #[serde(default)]
    pub position: Position,
    /// Base stat values.
    #[serde(default)]
    pub stats: BTreeMap<Stat, i64>,
    /// Current health.
    pub hp: i64,
    /// Current mana.
    #[serde(default)]
    pub mp: i64,
    /// Ticks until the character becomes malnourished.
    #[serde(default)]
    pub hunger_ticks: Option<u32>,
    /// Trait levels by trait name.
    #[serde(default)]
    pub traits: BTreeMap<String, u32>,
    /// Skill levels by skill name.
    #[serde(default)]
    pub skills: BTreeMap<String, u32>,
    /// Effects that were active at save time.
    #[serde(default)]
    pub effects: Vec<PersistedEffect>,
}

impl CharacterState {
    /// A fresh level-one character with the given name and health.
    pub fn fresh(id: CharacterId, name: &str, hp: i64) -> Self {
        let mut stats = BTreeMap::new();
        stats.insert(Stat::Hp, hp);
        Self {
            id,
            name: name.to_owned(),
            map: String::new(),
            level: 1,
            alignment: Alignment::default(),
            position: Position::default(),
            stats,
            hp,
            mp: 0,
            hunger_ticks: None,
            traits: BTreeMap::new(),
            skills: BTreeMap::new(),
            effects: Vec::new(),
        }
    }
}

/// Saved form of one active effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEffect {
    /// Catalog name used to rebuild the effect.
    pub name: String,
    /// Potency at save time.
    pub potency: u32,
    /// Remaining ticks, or `None` for a permanent effect.
    pub remaining: Option<u32>,
    /// Remaining charges, if the effect is charge-based.
    #[serde(default)]
    pub charges: Option<u32>,
    /// Character that cast the effect.
    #[serde(default)]
    pub caster: Option<CharacterId>,
    /// Caster display name, kept for messages after the caster is gone.
    #[serde(default)]
    pub caster_name: Option<String>,
    /// Effect-specific private state, e.g. damage fixed at cast time.
    #[serde(default)]
    pub data: BTreeMap<String, i64>,
}

/// Boss-timer record for a serializing spawner.
///
/// One record per spawner, stored under the world's map name. The spawner
/// is matched back by its anchor coordinates on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnerTimerRecord {
    /// Anchor column.
    pub x: i32,
    /// Anchor row.
    pub y: i32,
    /// Respawn counter at save time.
    pub current_tick: u64,
    /// Wall-clock save time, epoch milliseconds.
    pub timestamp: i64,
}

const fn default_level() -> u32 {
    1
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn timer_record_uses_camel_case_keys() {
        let record = SpawnerTimerRecord {
            x: 4,
            y: 9,
            current_tick: 120,
            timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["currentTick"], 120);
        assert_eq!(json["x"], 4);
    }

    #[test]
    fn character_state_tolerates_missing_optional_fields() {
        let id = CharacterId::new();
        let json = format!(r#"{{"id":"{id}","name":"Bilbo","hp":20}}"#);
        let state: CharacterState = serde_json::from_str(&json).unwrap();
        assert_eq!(state.level, 1);
        assert!(state.effects.is_empty());
        assert_eq!(state.alignment, Alignment::Neutral);
    }
}
