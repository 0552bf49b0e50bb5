//! Plain stat modifiers and markers.
//!
//! A [`StatModifier`] does nothing but shift stats for as long as it
//! lasts. A [`Marker`] does even less: it exists so other effects and
//! skills can check for it.

use rair_types::{IconData, Stat};

use super::{CastSetup, EffectBehavior, EffectDuration, EffectScope, StackPolicy};
use crate::error::{CastRejection, CharacterError};

/// Default lifetime of a modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultDuration {
    /// Ticks per potency point.
    PerPotency(u32),
    /// Fixed tick count.
    Fixed(u32),
    /// Never expires.
    Permanent,
}

impl DefaultDuration {
    fn resolve(self, potency: u32) -> EffectDuration {
        match self {
            Self::PerPotency(n) => EffectDuration::Ticks(n.saturating_mul(potency).max(1)),
            Self::Fixed(n) => EffectDuration::Ticks(n),
            Self::Permanent => EffectDuration::Permanent,
        }
    }
}

/// One stat shift: `flat + per_potency * potency`.
#[derive(Debug, Clone, Copy)]
pub struct StatShift {
    /// Stat.
    pub stat: Stat,
    /// Constant part.
    pub flat: i64,
    /// Part scaled by potency.
    pub per_potency: i64,
}

impl StatShift {
    const fn scaled(stat: Stat, per_potency: i64) -> Self {
        Self {
            stat,
            flat: 0,
            per_potency,
        }
    }

    const fn flat(stat: Stat, flat: i64) -> Self {
        Self {
            stat,
            flat,
            per_potency: 0,
        }
    }

    fn amount(self, potency: u32) -> i64 {
        self.per_potency
            .saturating_mul(i64::from(potency))
            .saturating_add(self.flat)
    }
}

/// Tuning for one stat modifier.
#[derive(Debug)]
pub struct ModifierProfile {
    /// Catalog name.
    pub name: &'static str,
    /// Stat shifts while active.
    pub shifts: &'static [StatShift],
    /// Lifetime when the request sets none.
    pub duration: DefaultDuration,
    /// Caster skill that sets the default potency.
    pub skill: Option<&'static str>,
    /// Cast potency is halved.
    pub halve_potency: bool,
    /// Icon sprite.
    pub icon: &'static str,
    /// Icon tooltip.
    pub tooltip: &'static str,
}

/// Ice resistance.
pub static BAR_FROST: ModifierProfile = ModifierProfile {
    name: "BarFrost",
    shifts: &[StatShift::scaled(Stat::IceResist, 20)],
    duration: DefaultDuration::PerPotency(100),
    skill: Some("conjuration"),
    halve_potency: false,
    icon: "frozen-orb",
    tooltip: "Resistant to ice.",
};

/// Sharper sight and aim.
pub static EAGLE_EYE: ModifierProfile = ModifierProfile {
    name: "EagleEye",
    shifts: &[
        StatShift::scaled(Stat::Perception, 20),
        StatShift::scaled(Stat::Accuracy, 1),
    ],
    duration: DefaultDuration::PerPotency(30),
    skill: Some("conjuration"),
    halve_potency: true,
    icon: "dead-eye",
    tooltip: "Seeing further and aiming truer.",
};

/// Harder to notice.
pub static INVISIBLE: ModifierProfile = ModifierProfile {
    name: "Invisible",
    shifts: &[StatShift::scaled(Stat::Stealth, 10)],
    duration: DefaultDuration::PerPotency(300),
    skill: Some("conjuration"),
    halve_potency: false,
    icon: "invisible",
    tooltip: "Hidden from sight.",
};

/// Weaker armor.
pub static LOWERED_DEFENSES: ModifierProfile = ModifierProfile {
    name: "LoweredDefenses",
    shifts: &[StatShift::scaled(Stat::ArmorClass, -1)],
    duration: DefaultDuration::Fixed(10),
    skill: None,
    halve_potency: false,
    icon: "cracked-shield",
    tooltip: "Armor weakened.",
};

/// Starvation penalty.
pub static MALNOURISHED: ModifierProfile = ModifierProfile {
    name: "Malnourished",
    shifts: &[
        StatShift::flat(Stat::Str, -1),
        StatShift::flat(Stat::HpRegen, -1),
    ],
    duration: DefaultDuration::Permanent,
    skill: None,
    halve_potency: false,
    icon: "meat",
    tooltip: "Weak from hunger.",
};

/// Behavior for every [`ModifierProfile`].
#[derive(Debug)]
pub struct StatModifier {
    profile: &'static ModifierProfile,
}

impl StatModifier {
    /// A behavior for `profile`.
    pub const fn new(profile: &'static ModifierProfile) -> Self {
        Self { profile }
    }
}

impl EffectBehavior for StatModifier {
    fn stacking(&self) -> StackPolicy {
        StackPolicy::RefreshAnyCaster
    }

    fn on_cast(&mut self, setup: &mut CastSetup<'_>) -> Result<(), CastRejection> {
        let profile = self.profile;
        let skill = profile.skill.map_or(0, |s| setup.caster_skill(s));
        setup.default_potency(skill.max(1));
        if profile.halve_potency {
            setup.state.potency = setup.state.potency.saturating_div(2).max(1);
        }
        let potency = setup.state.potency;
        setup.default_duration(profile.duration.resolve(potency));
        setup.state.icon = IconData {
            icon: profile.icon.to_owned(),
            color: None,
            tooltip: profile.tooltip.to_owned(),
        };
        Ok(())
    }

    fn on_start(&mut self, scope: &mut EffectScope<'_, '_>) -> Result<(), CharacterError> {
        let potency = scope.state.potency;
        for shift in self.profile.shifts {
            scope.apply_stat(shift.stat, shift.amount(potency));
        }
        Ok(())
    }
}

/// Tuning for one marker.
#[derive(Debug)]
pub struct MarkerProfile {
    /// Catalog name.
    pub name: &'static str,
    /// Ticks when the request sets none. `None` is permanent.
    pub ticks: Option<u32>,
    /// Icon sprite.
    pub icon: &'static str,
}

/// Lockout after searing purification.
pub static RECENTLY_PURIFIED: MarkerProfile = MarkerProfile {
    name: "RecentlyPurified",
    ticks: Some(10),
    icon: "sun",
};

/// Carried by summoned pets.
pub static SUMMONED_PET: MarkerProfile = MarkerProfile {
    name: "SummonedPet",
    ticks: None,
    icon: "wolf-head",
};

/// Behavior for every [`MarkerProfile`].
#[derive(Debug)]
pub struct Marker {
    profile: &'static MarkerProfile,
}

impl Marker {
    /// A behavior for `profile`.
    pub const fn new(profile: &'static MarkerProfile) -> Self {
        Self { profile }
    }
}

impl EffectBehavior for Marker {
    fn stacking(&self) -> StackPolicy {
        StackPolicy::RefreshAnyCaster
    }

    fn on_cast(&mut self, setup: &mut CastSetup<'_>) -> Result<(), CastRejection> {
        let duration = self
            .profile
            .ticks
            .map_or(EffectDuration::Permanent, EffectDuration::Ticks);
        setup.default_duration(duration);
        setup.state.icon = IconData {
            icon: self.profile.icon.to_owned(),
            color: None,
            tooltip: self.profile.name.to_owned(),
        };
        Ok(())
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
    use crate::character::{Character, CharacterCore, Roster};
    use crate::effects::{CastRequest, EffectCatalog, EffectEnv, EndReason, cast};

    fn subject() -> Character {
        Character::new(CharacterCore::new(
            CharacterId::new(),
            "Subject",
            CharacterKind::Player,
            BTreeMap::from([(Stat::Hp, 50), (Stat::Str, 10), (Stat::ArmorClass, 6)]),
        ))
    }

    #[test]
    fn eagle_eye_halves_potency() {
        let catalog = EffectCatalog::standard();
        let roster = Roster::new();
        let mut rng = StdRng::seed_from_u64(2);
        let mut env = EffectEnv::new(1, &roster, &mut rng, 10);
        let mut s = subject();

        cast(&catalog, &CastRequest::new("EagleEye").potency(4), None, &mut s, &mut env).unwrap();
        let effect = s.effects.find("EagleEye").unwrap();
        assert_eq!(effect.state().potency, 2);
        assert_eq!(effect.state().duration, EffectDuration::Ticks(60));
        assert_eq!(s.core.stat(Stat::Perception), 40);
        assert_eq!(s.core.stat(Stat::Accuracy), 2);
    }

    #[test]
    fn lowered_defenses_reverts_on_removal() {
        let catalog = EffectCatalog::standard();
        let roster = Roster::new();
        let mut rng = StdRng::seed_from_u64(2);
        let mut env = EffectEnv::new(1, &roster, &mut rng, 10);
        let mut s = subject();

        cast(&catalog, &CastRequest::new("LoweredDefenses").potency(3), None, &mut s, &mut env).unwrap();
        assert_eq!(s.core.stat(Stat::ArmorClass), 3);
        s.effects
            .unapply_named("LoweredDefenses", &mut s.core, &mut env, EndReason::Removed);
        assert_eq!(s.core.stat(Stat::ArmorClass), 6);
        assert!(!s.core.stats().has_bonuses());
    }

    #[test]
    fn malnourished_is_permanent_and_flat() {
        let catalog = EffectCatalog::standard();
        let roster = Roster::new();
        let mut rng = StdRng::seed_from_u64(2);
        let mut env = EffectEnv::new(1, &roster, &mut rng, 10);
        let mut s = subject();

        cast(&catalog, &CastRequest::new("Malnourished").potency(9), None, &mut s, &mut env).unwrap();
        for _ in 0..50 {
            s.effects.tick(&mut s.core, &mut env, 5);
        }
        assert!(s.effects.contains("Malnourished"));
        assert_eq!(s.core.stat(Stat::Str), 9);
        assert_eq!(s.core.stat(Stat::HpRegen), -1);
    }

    #[test]
    fn markers_use_profile_durations() {
        let catalog = EffectCatalog::standard();
        let roster = Roster::new();
        let mut rng = StdRng::seed_from_u64(2);
        let mut env = EffectEnv::new(1, &roster, &mut rng, 10);
        let mut s = subject();

        cast(&catalog, &CastRequest::new("RecentlyPurified"), None, &mut s, &mut env).unwrap();
        cast(&catalog, &CastRequest::new("SummonedPet"), None, &mut s, &mut env).unwrap();
        assert_eq!(
            s.effects.find("RecentlyPurified").unwrap().state().duration,
            EffectDuration::Ticks(10)
        );
        assert!(s.effects.find("SummonedPet").unwrap().state().is_permanent());
    }

    #[test]
    fn recasting_refreshes_instead_of_stacking() {
        let catalog = EffectCatalog::standard();
        let roster = Roster::new();
        let mut rng = StdRng::seed_from_u64(2);
        let mut env = EffectEnv::new(1, &roster, &mut rng, 10);
        let mut s = subject();

        cast(&catalog, &CastRequest::new("BarFrost").potency(1), None, &mut s, &mut env).unwrap();
        cast(&catalog, &CastRequest::new("BarFrost").potency(3), None, &mut s, &mut env).unwrap();
        assert_eq!(s.effects.len(), 1);
        assert_eq!(s.core.stat(Stat::IceResist), 60);
    }
}
