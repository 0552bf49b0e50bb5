//! Directly used skills.
//!
//! A skill turns a caster's stats into an [`AttackDescriptor`]. Range,
//! line of sight, mana, and target lookup are checked by the world before
//! [`Skill::descriptor`] is called.

use std::fmt;

use rair_types::{DamageClass, Stat};
use rand::Rng;

use crate::character::CombatantSnapshot;
use crate::combat::AttackDescriptor;
use crate::dice;

/// A skill a character can use on a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skill {
    /// Melee weapon attack.
    Attack,
    /// Ranged fire spell.
    Combust,
    /// Ranged heal.
    Cure,
}

impl Skill {
    /// Look a skill up by command word.
    pub fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "attack" | "a" => Some(Self::Attack),
            "combust" => Some(Self::Combust),
            "cure" => Some(Self::Cure),
            _ => None,
        }
    }

    /// Display name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Attack => "attack",
            Self::Combust => "Combust",
            Self::Cure => "Cure",
        }
    }

    /// Maximum tile distance to the target.
    pub const fn range(self) -> u32 {
        match self {
            Self::Attack => 1,
            Self::Combust | Self::Cure => 5,
        }
    }

    /// Mana spent per use.
    pub const fn mana_cost(self) -> i64 {
        match self {
            Self::Attack => 0,
            Self::Combust | Self::Cure => 5,
        }
    }

    /// Whether the skill may target the user.
    pub const fn allows_self(self) -> bool {
        matches!(self, Self::Cure)
    }

    /// Roll the attack for `caster`.
    pub fn descriptor<R: Rng + ?Sized>(self, caster: &CombatantSnapshot, rng: &mut R) -> AttackDescriptor {
        let (stat, class) = match self {
            Self::Attack => (Stat::Str, DamageClass::Physical),
            Self::Combust => (Stat::Int, DamageClass::Fire),
            Self::Cure => (Stat::Wis, DamageClass::Heal),
        };
        let value = caster.stat(stat).max(0);
        let sides = u32::try_from(value.max(2)).unwrap_or(u32::MAX);
        let bonus = match self {
            Self::Cure => value,
            Self::Attack | Self::Combust => value.checked_div(2).unwrap_or(0),
        };
        let amount = dice::roll(rng, 1, sides).saturating_add(bonus);
        AttackDescriptor::direct(self.name(), amount, class)
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use rair_types::{CharacterId, CharacterKind};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::character::CharacterCore;

    fn caster(stats: &[(Stat, i64)]) -> CombatantSnapshot {
        CharacterCore::new(
            CharacterId::new(),
            "Caster",
            CharacterKind::Player,
            stats.iter().copied().collect::<BTreeMap<_, _>>(),
        )
        .snapshot()
    }

    #[test]
    fn parse_accepts_aliases_and_case() {
        assert_eq!(Skill::parse("A"), Some(Skill::Attack));
        assert_eq!(Skill::parse("Combust"), Some(Skill::Combust));
        assert_eq!(Skill::parse("dance"), None);
    }

    #[test]
    fn attack_damage_stays_in_range() {
        let c = caster(&[(Stat::Str, 10)]);
        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..100 {
            let d = Skill::Attack.descriptor(&c, &mut rng);
            assert_eq!(d.class, DamageClass::Physical);
            assert!((6..=15).contains(&d.damage), "{}", d.damage);
        }
    }

    #[test]
    fn cure_heals_and_never_crits() {
        let c = caster(&[(Stat::Wis, 4)]);
        let mut rng = StdRng::seed_from_u64(12);
        let d = Skill::Cure.descriptor(&c, &mut rng);
        assert!(d.class.is_heal());
        assert!(!d.can_crit);
        assert!((5..=8).contains(&d.damage));
    }

    #[test]
    fn spells_cost_mana_and_reach_further() {
        assert_eq!(Skill::Attack.mana_cost(), 0);
        assert_eq!(Skill::Combust.mana_cost(), 5);
        assert!(Skill::Combust.range() > Skill::Attack.range());
        assert!(Skill::Cure.allows_self());
    }
}
