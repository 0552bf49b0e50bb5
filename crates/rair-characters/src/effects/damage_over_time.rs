//! Damage-over-time effects.
//!
//! Damage is rolled once, at cast time, from the caster's stats: the
//! number of dice is the potency scaled by the profile's multiplier, and
//! the die size is the caster's governing stat. Every tick then replays
//! that same number through the combat resolver. The only per-tick roll
//! is the optional critical chance granted by a caster trait.

use std::collections::BTreeMap;

use rair_types::{DamageClass, IconData, MessageKind, Stat};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::{
    CastRequest, CastSetup, EffectBehavior, EffectDuration, EffectScope, EndReason, StackPolicy,
    TickOutcome, WorldCommand,
};
use crate::combat::{self, AttackDescriptor};
use crate::dice;
use crate::error::{CastRejection, CharacterError};

/// Percent critical chance per caster trait level.
const CRIT_PERCENT_PER_LEVEL: u32 = 5;

/// Highest per-tick critical chance, in percent.
const MAX_CRIT_PERCENT: u32 = 50;

/// Tuning for one damage-over-time effect.
#[derive(Debug)]
pub struct DotProfile {
    /// Catalog name.
    pub name: &'static str,
    /// Damage class.
    pub class: DamageClass,
    /// Caster skill that sets the default potency.
    pub skill: &'static str,
    /// Caster stat that sets the die size.
    pub governing: Stat,
    /// Dice per potency point, as `(mantissa, scale)`.
    pub dice_per_potency: (i64, u32),
    /// Default duration per potency point.
    pub ticks_per_potency: u32,
    /// Default duration regardless of potency, if set.
    pub fixed_ticks: Option<u32>,
    /// Caster trait granting a per-tick critical chance.
    pub crit_trait: Option<&'static str>,
    /// Effect cast on the victim when a tick is critical.
    pub crit_effect: Option<&'static str>,
    /// Caster trait that also weakens a stat while the effect lasts.
    pub weakening: Option<(&'static str, Stat)>,
    /// Damage scale against targets sharing the caster's alignment.
    pub same_alignment_scale: Option<(i64, u32)>,
    /// Percent of maximum mana drained per tick.
    pub mana_drain_percent: i64,
    /// Marker that blocks the cast and is applied when the effect expires.
    pub lockout: Option<(&'static str, u32)>,
    /// Icon sprite.
    pub icon: &'static str,
}

/// Poison: modest damage, long duration.
pub static POISON: DotProfile = DotProfile {
    name: "Poison",
    class: DamageClass::Poison,
    skill: "thievery",
    governing: Stat::Dex,
    dice_per_potency: (1, 0),
    ticks_per_potency: 2,
    fixed_ticks: None,
    crit_trait: Some("DeadlyPoison"),
    crit_effect: None,
    weakening: Some(("CorrosivePoison", Stat::Mitigation)),
    same_alignment_scale: None,
    mana_drain_percent: 0,
    lockout: None,
    icon: "poison-gas",
};

/// Venom: heavier damage, shorter duration, crits lower defenses.
pub static VENOM: DotProfile = DotProfile {
    name: "Venom",
    class: DamageClass::Poison,
    skill: "thievery",
    governing: Stat::Dex,
    dice_per_potency: (15, 1),
    ticks_per_potency: 1,
    fixed_ticks: None,
    crit_trait: Some("DeadlyPoison"),
    crit_effect: Some("LoweredDefenses"),
    weakening: Some(("DegenerativeVenom", Stat::Perception)),
    same_alignment_scale: None,
    mana_drain_percent: 0,
    lockout: None,
    icon: "dripping-goo",
};

/// Disease: weak and slow.
pub static DISEASE: DotProfile = DotProfile {
    name: "Disease",
    class: DamageClass::Disease,
    skill: "necromancy",
    governing: Stat::Int,
    dice_per_potency: (5, 1),
    ticks_per_potency: 3,
    fixed_ticks: None,
    crit_trait: None,
    crit_effect: None,
    weakening: Some(("Contagion", Stat::Con)),
    same_alignment_scale: None,
    mana_drain_percent: 0,
    lockout: None,
    icon: "death-juice",
};

/// Searing purification: burns mana, spares the like-minded, and leaves
/// a lockout behind.
pub static SEARING_PURIFICATION: DotProfile = DotProfile {
    name: "SearingPurification",
    class: DamageClass::Energy,
    skill: "restoration",
    governing: Stat::Wis,
    dice_per_potency: (1, 0),
    ticks_per_potency: 0,
    fixed_ticks: Some(5),
    crit_trait: None,
    crit_effect: None,
    weakening: None,
    same_alignment_scale: Some((1, 1)),
    mana_drain_percent: 2,
    lockout: Some(("RecentlyPurified", 10)),
    icon: "sun-radiations",
};

/// Behavior for every damage-over-time profile.
#[derive(Debug)]
pub struct DamageOverTime {
    profile: &'static DotProfile,
    damage: i64,
    crit_chance: u32,
}

impl DamageOverTime {
    /// A behavior for `profile` with no damage rolled yet.
    pub const fn new(profile: &'static DotProfile) -> Self {
        Self {
            profile,
            damage: 0,
            crit_chance: 0,
        }
    }

    /// Damage dealt per tick.
    pub const fn damage(&self) -> i64 {
        self.damage
    }
}

fn decimal((mantissa, exponent): (i64, u32)) -> Decimal {
    Decimal::new(mantissa, exponent)
}

fn scale(value: i64, factor: (i64, u32)) -> i64 {
    Decimal::from(value)
        .checked_mul(decimal(factor))
        .and_then(|d| d.floor().to_i64())
        .unwrap_or(0)
}

impl EffectBehavior for DamageOverTime {
    fn stacking(&self) -> StackPolicy {
        StackPolicy::RefreshSameCaster
    }

    fn on_cast(&mut self, setup: &mut CastSetup<'_>) -> Result<(), CastRejection> {
        let profile = self.profile;
        if let Some((marker, _)) = profile.lockout {
            if setup.target_effects.contains(marker) {
                return Err(CastRejection::with_message(format!(
                    "{} cannot be purified again so soon.",
                    setup.target.name
                )));
            }
        }

        setup.default_potency(setup.caster_skill(profile.skill).max(1));
        let potency = setup.state.potency;
        let ticks = profile
            .fixed_ticks
            .unwrap_or_else(|| potency.saturating_mul(profile.ticks_per_potency))
            .max(1);
        setup.default_duration(EffectDuration::Ticks(ticks));

        let sides = setup
            .caster
            .map_or(1, |c| c.stat(profile.governing))
            .clamp(1, i64::from(u32::MAX));
        let sides = u32::try_from(sides).unwrap_or(1);
        let rolls = u32::try_from(scale(i64::from(potency), profile.dice_per_potency).max(0))
            .unwrap_or(u32::MAX);
        let mut damage = dice::roll(&mut *setup.rng, rolls, sides);

        if let (Some(factor), Some(caster)) = (profile.same_alignment_scale, setup.caster) {
            if caster.alignment == setup.target.alignment {
                damage = scale(damage, factor);
            }
        }
        self.damage = damage;

        self.crit_chance = profile.crit_trait.map_or(0, |name| {
            setup
                .caster_trait(name)
                .saturating_mul(CRIT_PERCENT_PER_LEVEL)
                .min(MAX_CRIT_PERCENT)
        });

        setup.state.icon = IconData {
            icon: profile.icon.to_owned(),
            color: None,
            tooltip: format!("Taking {} {:?} damage per tick.", self.damage, profile.class),
        };
        Ok(())
    }

    fn on_start(&mut self, scope: &mut EffectScope<'_, '_>) -> Result<(), CharacterError> {
        if let Some((trait_name, stat)) = self.profile.weakening {
            let level = scope.caster().map_or(0, |c| c.trait_level(trait_name));
            if level > 0 {
                let penalty = i64::from(scope.state.potency.saturating_div(5).max(1))
                    .saturating_mul(i64::from(level));
                scope.apply_stat(stat, penalty.saturating_neg());
            }
        }
        scope.tell_owner(MessageKind::Effect, format!("You are afflicted by {}.", self.profile.name));
        Ok(())
    }

    fn on_tick(&mut self, scope: &mut EffectScope<'_, '_>) -> Result<TickOutcome, CharacterError> {
        let profile = self.profile;
        let roster = scope.env.roster;
        let attacker = scope.state.resolve_caster(roster);

        let critical = self.crit_chance > 0
            && scope.env.rng.random_range(0..100_u32) < self.crit_chance;
        let damage = if critical {
            self.damage.saturating_mul(2)
        } else {
            self.damage
        };

        let attack = AttackDescriptor::over_time(profile.name, damage, profile.class);
        let outcome = combat::resolve(
            attacker,
            scope.owner,
            &attack,
            &mut *scope.env.rng,
            scope.env.combat_ticks,
        );
        scope.damage_taken = scope.damage_taken.saturating_add(outcome.damage);
        scope.env.outbox.notify_all(outcome.notifications);
        if let (true, Some(a)) = (outcome.attacker_engaged, attacker) {
            scope
                .env
                .outbox
                .push(WorldCommand::MarkInCombat { character: a.id });
        }

        if critical {
            if let Some(effect) = profile.crit_effect {
                let mut request = CastRequest::new(effect).potency(scope.state.potency.max(1));
                if let Some(caster) = scope.state.caster {
                    request = request.caster(caster);
                }
                scope.cast_on_owner(request);
            }
        }

        if profile.mana_drain_percent > 0 {
            let drain = scope
                .owner
                .mp()
                .maximum()
                .saturating_mul(profile.mana_drain_percent)
                .checked_div(100)
                .unwrap_or(0);
            scope.owner.drain_mana(drain);
        }
        Ok(TickOutcome::Continue)
    }

    fn on_end(&mut self, scope: &mut EffectScope<'_, '_>, reason: EndReason) -> Result<(), CharacterError> {
        if let Some((marker, ticks)) = self.profile.lockout {
            if matches!(reason, EndReason::Expired | EndReason::Removed) {
                scope.cast_on_owner(CastRequest::new(marker).ticks(ticks));
            }
        }
        Ok(())
    }

    fn persist_data(&self) -> BTreeMap<String, i64> {
        BTreeMap::from([
            ("damage".to_owned(), self.damage),
            ("crit_chance".to_owned(), i64::from(self.crit_chance)),
        ])
    }

    fn restore_data(&mut self, data: &BTreeMap<String, i64>) {
        self.damage = data.get("damage").copied().unwrap_or(0);
        self.crit_chance = data
            .get("crit_chance")
            .and_then(|c| u32::try_from(*c).ok())
            .unwrap_or(0);
    }
}
