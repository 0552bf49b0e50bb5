//! Boost, stun, and vital essence.

use std::collections::BTreeMap;

use rair_types::{IconData, MessageKind, Stat};

use super::modifiers::LOWERED_DEFENSES;
use super::{CastRequest, CastSetup, EffectBehavior, EffectDuration, EffectScope, StackPolicy};
use crate::error::{CastRejection, CharacterError};

const BOOST_TICKS: u32 = 300;
const BOOST_BASE_BONUS: i64 = 3;
const BOOST_TRAIT: &str = "ImprovedBoost";
const BOOST_STUN_TICKS: u32 = 3;
const BOOST_WEAKNESS_POTENCY: u32 = 3;
const BOOST_WEAKNESS_TICKS: u32 = 23;

const STUN_TICKS: u32 = 3;

const ESSENCE_CHARGES_PER_POTENCY: u32 = 5;
const ESSENCE_HP_PER_POTENCY: i64 = 15;

fn icon(sprite: &str, tooltip: impl Into<String>) -> IconData {
    IconData {
        icon: sprite.to_owned(),
        color: None,
        tooltip: tooltip.into(),
    }
}

/// A burst of strength, dexterity, and agility that leaves the owner
/// briefly stunned and exposed.
#[derive(Debug, Default)]
pub struct Boost {
    bonus: i64,
}

impl Boost {
    /// Catalog name.
    pub const NAME: &'static str = "Boost";
}

impl EffectBehavior for Boost {
    fn stacking(&self) -> StackPolicy {
        StackPolicy::RefreshAnyCaster
    }

    fn on_cast(&mut self, setup: &mut CastSetup<'_>) -> Result<(), CastRejection> {
        setup.default_potency(1);
        setup.default_duration(EffectDuration::Ticks(BOOST_TICKS));
        self.bonus = BOOST_BASE_BONUS.saturating_add(i64::from(setup.caster_trait(BOOST_TRAIT)));
        setup.state.icon = icon("fist", format!("+{} strength, dexterity, agility.", self.bonus));
        Ok(())
    }

    fn on_start(&mut self, scope: &mut EffectScope<'_, '_>) -> Result<(), CharacterError> {
        for stat in [Stat::Str, Stat::Dex, Stat::Agi] {
            scope.apply_stat(stat, self.bonus);
        }
        scope.cast_on_owner(CastRequest::new(Stun::NAME).ticks(BOOST_STUN_TICKS));
        scope.cast_on_owner(
            CastRequest::new(LOWERED_DEFENSES.name)
                .potency(BOOST_WEAKNESS_POTENCY)
                .ticks(BOOST_WEAKNESS_TICKS),
        );
        scope.tell_owner(MessageKind::Effect, "You surge with power!");
        Ok(())
    }

    fn persist_data(&self) -> BTreeMap<String, i64> {
        BTreeMap::from([("bonus".to_owned(), self.bonus)])
    }

    fn restore_data(&mut self, data: &BTreeMap<String, i64>) {
        self.bonus = data.get("bonus").copied().unwrap_or(BOOST_BASE_BONUS);
    }
}

/// Unable to act.
#[derive(Debug)]
pub struct Stun;

impl Stun {
    /// Catalog name.
    pub const NAME: &'static str = "Stun";
}

impl EffectBehavior for Stun {
    fn stacking(&self) -> StackPolicy {
        StackPolicy::RefreshAnyCaster
    }

    fn prevents_action(&self) -> bool {
        true
    }

    fn on_cast(&mut self, setup: &mut CastSetup<'_>) -> Result<(), CastRejection> {
        setup.default_duration(EffectDuration::Ticks(STUN_TICKS));
        setup.state.icon = icon("knockout", "Stunned.");
        Ok(())
    }

    fn on_start(&mut self, scope: &mut EffectScope<'_, '_>) -> Result<(), CharacterError> {
        scope.tell_owner(MessageKind::Effect, "You are stunned!");
        Ok(())
    }
}

/// Extra health and armor that wears away as the owner is hit.
#[derive(Debug)]
pub struct VitalEssence;

impl VitalEssence {
    /// Catalog name.
    pub const NAME: &'static str = "VitalEssence";
}

impl EffectBehavior for VitalEssence {
    fn stacking(&self) -> StackPolicy {
        StackPolicy::RefreshAnyCaster
    }

    fn on_cast(&mut self, setup: &mut CastSetup<'_>) -> Result<(), CastRejection> {
        setup.default_potency(setup.caster_skill("restoration").max(1));
        let potency = setup.state.potency;
        setup.default_duration(EffectDuration::Permanent);
        setup.default_charges(potency.saturating_mul(ESSENCE_CHARGES_PER_POTENCY));
        setup.state.icon = icon("bell-shield", "Fortified with vital essence.");
        Ok(())
    }

    fn on_start(&mut self, scope: &mut EffectScope<'_, '_>) -> Result<(), CharacterError> {
        let potency = i64::from(scope.state.potency);
        let hp = ESSENCE_HP_PER_POTENCY.saturating_mul(potency);
        scope.apply_stat(Stat::Hp, hp);
        scope.apply_stat(Stat::ArmorClass, potency.checked_div(2).unwrap_or(0));
        scope.owner.heal(hp);
        Ok(())
    }

    fn on_hit(&mut self, scope: &mut EffectScope<'_, '_>, _damage: i64) -> Result<(), CharacterError> {
        scope.state.charges = scope.state.charges.map(|c| c.saturating_sub(1));
        Ok(())
    }
}
