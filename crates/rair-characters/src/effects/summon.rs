//! Familiar summoning.
//!
//! Summoning is a channel: the caster must hold still and stay unhurt for
//! the whole duration. When the channel completes the world spawns the
//! pet and puts [`ActivePet`] on the owner, which keeps the pet bound and
//! dismisses it when it ends.

use std::collections::BTreeMap;

use rair_types::{IconData, MessageKind, Position, Stat};

use super::{
    CastSetup, EffectBehavior, EffectDuration, EffectScope, EndReason, StackPolicy, TickOutcome,
    WorldCommand,
};
use crate::error::{CastRejection, CharacterError};

const CHANNEL_TICKS: u32 = 5;
const FAMILIAR_NPC: &str = "familiar";
const PET_TICKS_PER_POTENCY: u32 = 50;

/// Channel that summons a familiar when it completes.
#[derive(Debug, Default)]
pub struct ChannelFindFamiliar {
    anchor: Option<Position>,
    hp: i64,
}

impl ChannelFindFamiliar {
    /// Catalog name.
    pub const NAME: &'static str = "ChannelFindFamiliar";
}

impl EffectBehavior for ChannelFindFamiliar {
    fn stacking(&self) -> StackPolicy {
        StackPolicy::KeepExisting
    }

    fn on_cast(&mut self, setup: &mut CastSetup<'_>) -> Result<(), CastRejection> {
        if !setup.target.pets.is_empty() {
            return Err(CastRejection::with_message("You already have a familiar."));
        }
        if setup.target_effects.contains(Self::NAME) {
            return Err(CastRejection::with_message("You are already channeling."));
        }
        setup.default_potency(setup.caster_skill("conjuration").max(1));
        setup.default_duration(EffectDuration::Ticks(CHANNEL_TICKS));
        setup.state.icon = IconData {
            icon: "eye-of-horus".to_owned(),
            color: None,
            tooltip: "Channeling a familiar.".to_owned(),
        };
        Ok(())
    }

    fn on_start(&mut self, scope: &mut EffectScope<'_, '_>) -> Result<(), CharacterError> {
        self.anchor = Some(scope.owner.position);
        self.hp = scope.owner.hp().current();
        scope.tell_owner(MessageKind::Effect, "You begin channeling.");
        Ok(())
    }

    fn on_tick(&mut self, scope: &mut EffectScope<'_, '_>) -> Result<TickOutcome, CharacterError> {
        let moved = self.anchor.is_some_and(|anchor| anchor != scope.owner.position);
        if moved || scope.owner.hp().current() < self.hp {
            return Ok(TickOutcome::Interrupt);
        }
        Ok(TickOutcome::Continue)
    }

    fn on_end(&mut self, scope: &mut EffectScope<'_, '_>, reason: EndReason) -> Result<(), CharacterError> {
        match reason {
            EndReason::Expired => {
                let owner = scope.owner.id;
                let potency = scope.state.potency;
                scope.env.outbox.push(WorldCommand::Summon {
                    owner,
                    npc: FAMILIAR_NPC.to_owned(),
                    potency,
                });
            }
            EndReason::Interrupted => {
                scope.tell_owner(MessageKind::Effect, "Your concentration is broken.");
            }
            _ => {}
        }
        Ok(())
    }

    fn persist_data(&self) -> BTreeMap<String, i64> {
        let mut data = BTreeMap::from([("hp".to_owned(), self.hp)]);
        if let Some(anchor) = self.anchor {
            data.insert("x".to_owned(), i64::from(anchor.x));
            data.insert("y".to_owned(), i64::from(anchor.y));
            data.insert("z".to_owned(), i64::from(anchor.z));
        }
        data
    }

    fn restore_data(&mut self, data: &BTreeMap<String, i64>) {
        self.hp = data.get("hp").copied().unwrap_or(0);
        let coord = |key: &str| data.get(key).and_then(|v| i32::try_from(*v).ok());
        self.anchor = match (coord("x"), coord("y"), coord("z")) {
            (Some(x), Some(y), Some(z)) => Some(Position { x, y, z }),
            _ => None,
        };
    }
}

/// Carried by a pet owner while the pet lives.
///
/// Costs the owner some willpower. Expires when the owner has no pets
/// left, and dismisses any remaining pets when it ends for another reason.
#[derive(Debug)]
pub struct ActivePet;

impl ActivePet {
    /// Catalog name.
    pub const NAME: &'static str = "ActivePet";
}

impl EffectBehavior for ActivePet {
    fn stacking(&self) -> StackPolicy {
        StackPolicy::RefreshAnyCaster
    }

    fn on_cast(&mut self, setup: &mut CastSetup<'_>) -> Result<(), CastRejection> {
        setup.default_potency(1);
        let potency = setup.state.potency;
        setup.default_duration(EffectDuration::Ticks(
            potency.saturating_mul(PET_TICKS_PER_POTENCY).max(1),
        ));
        setup.state.icon = IconData {
            icon: "wolf-howl".to_owned(),
            color: None,
            tooltip: "Bound to a familiar.".to_owned(),
        };
        Ok(())
    }

    fn on_start(&mut self, scope: &mut EffectScope<'_, '_>) -> Result<(), CharacterError> {
        let loss = i64::from(scope.state.potency.saturating_div(2));
        scope.apply_stat(Stat::Wil, loss.saturating_neg());
        Ok(())
    }

    fn on_tick(&mut self, scope: &mut EffectScope<'_, '_>) -> Result<TickOutcome, CharacterError> {
        if scope.owner.pets.is_empty() {
            return Ok(TickOutcome::Expire);
        }
        Ok(TickOutcome::Continue)
    }

    fn on_end(&mut self, scope: &mut EffectScope<'_, '_>, _reason: EndReason) -> Result<(), CharacterError> {
        if !scope.owner.pets.is_empty() {
            let owner = scope.owner.id;
            scope.env.outbox.push(WorldCommand::DismissPets { owner });
        }
        Ok(())
    }
}
