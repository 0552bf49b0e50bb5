//! Closed vocabularies shared by every crate: stats, damage classes,
//! alignment, and the player/NPC split.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A named character statistic.
///
/// Base values come from content definitions or persisted player state;
/// effects add signed bonuses on top. Resource maxima (`Hp`, `Mp`) are
/// stats too, so a buff that raises `Hp` raises the health pool ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    /// Strength: physical damage.
    Str,
    /// Dexterity: physical accuracy and dodge.
    Dex,
    /// Agility: dodge.
    Agi,
    /// Intelligence: arcane damage.
    Int,
    /// Wisdom: divine damage and healing.
    Wis,
    /// Willpower.
    Wil,
    /// Constitution.
    Con,
    /// Luck: critical chance.
    Luk,
    /// Maximum health.
    Hp,
    /// Maximum mana.
    Mp,
    /// Health regained per character-action tick.
    HpRegen,
    /// Mana regained per character-action tick.
    MpRegen,
    /// Flat reduction applied to physical hits.
    ArmorClass,
    /// Offsets the defender's dodge chance.
    Accuracy,
    /// Visibility of stealthed characters.
    Perception,
    /// Concealment.
    Stealth,
    /// Percentage reduction applied to all non-heal damage.
    Mitigation,
    /// Queued commands executed per character-action tick.
    ActionSpeed,
    /// Flat physical resistance.
    PhysicalResist,
    /// Flat fire resistance.
    FireResist,
    /// Flat ice resistance.
    IceResist,
    /// Flat poison resistance.
    PoisonResist,
    /// Flat energy resistance.
    EnergyResist,
    /// Flat disease resistance.
    DiseaseResist,
    /// Flat necrotic resistance.
    NecroticResist,
}

/// The class of a damage or healing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageClass {
    /// Weapons and claws. Subject to armor and dodge.
    Physical,
    /// Fire.
    Fire,
    /// Ice.
    Ice,
    /// Poison.
    Poison,
    /// Energy.
    Energy,
    /// Disease.
    Disease,
    /// Necrotic.
    Necrotic,
    /// Restores health instead of removing it.
    Heal,
}

impl DamageClass {
    /// The flat resistance stat that applies to this class, if any.
    pub const fn resist_stat(self) -> Option<Stat> {
        match self {
            Self::Physical => Some(Stat::PhysicalResist),
            Self::Fire => Some(Stat::FireResist),
            Self::Ice => Some(Stat::IceResist),
            Self::Poison => Some(Stat::PoisonResist),
            Self::Energy => Some(Stat::EnergyResist),
            Self::Disease => Some(Stat::DiseaseResist),
            Self::Necrotic => Some(Stat::NecroticResist),
            Self::Heal => None,
        }
    }

    /// Whether this class restores health.
    pub const fn is_heal(self) -> bool {
        matches!(self, Self::Heal)
    }
}

/// Moral alignment. Some effects treat same-aligned targets differently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// Good.
    Good,
    /// Neutral.
    #[default]
    Neutral,
    /// Evil.
    Evil,
}

/// Whether a character is controlled by a connected player or by a spawner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum CharacterKind {
    /// Player character. Persists across world instances.
    Player,
    /// Non-player character owned by a spawner.
    Npc,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heal_has_no_resistance() {
        assert_eq!(DamageClass::Heal.resist_stat(), None);
        assert!(DamageClass::Heal.is_heal());
    }

    #[test]
    fn fire_maps_to_fire_resist() {
        assert_eq!(DamageClass::Fire.resist_stat(), Some(Stat::FireResist));
    }
}
