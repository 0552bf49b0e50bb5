//! The death timer carried by fallen players.

use rair_types::{IconData, MessageKind};

use super::{CastSetup, EffectBehavior, EffectDuration, EffectScope, EndReason, StackPolicy};
use crate::error::{CastRejection, CharacterError};

const RESPAWN_TICKS: u32 = 30;

/// Keeps a dead player from acting, then revives them at full health and
/// mana when it ends.
#[derive(Debug)]
pub struct Dead;

impl Dead {
    /// Catalog name.
    pub const NAME: &'static str = "Dead";
}

impl EffectBehavior for Dead {
    fn stacking(&self) -> StackPolicy {
        StackPolicy::KeepExisting
    }

    fn prevents_action(&self) -> bool {
        true
    }

    fn on_cast(&mut self, setup: &mut CastSetup<'_>) -> Result<(), CastRejection> {
        setup.default_duration(EffectDuration::Ticks(RESPAWN_TICKS));
        setup.state.icon = IconData {
            icon: "dead-head".to_owned(),
            color: Some("#888".to_owned()),
            tooltip: "Dead.".to_owned(),
        };
        Ok(())
    }

    fn on_start(&mut self, scope: &mut EffectScope<'_, '_>) -> Result<(), CharacterError> {
        scope.tell_owner(MessageKind::Info, "You have died.");
        Ok(())
    }

    fn on_end(&mut self, scope: &mut EffectScope<'_, '_>, _reason: EndReason) -> Result<(), CharacterError> {
        scope.owner.revive();
        scope.tell_owner(MessageKind::Info, "You return to life.");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use rair_types::{CharacterId, CharacterKind, Stat};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::character::{Character, CharacterCore, Roster};
    use crate::effects::{ApplyOutcome, CastRequest, EffectCatalog, EffectEnv, cast};

    #[test]
    fn dead_player_revives_when_the_timer_runs_out() {
        let catalog = EffectCatalog::standard();
        let roster = Roster::new();
        let mut rng = StdRng::seed_from_u64(6);
        let mut env = EffectEnv::new(1, &roster, &mut rng, 10);
        let mut p = Character::new(CharacterCore::new(
            CharacterId::new(),
            "Fallen",
            CharacterKind::Player,
            BTreeMap::from([(Stat::Hp, 30), (Stat::Mp, 12)]),
        ));
        p.core.mark_dead();

        cast(&catalog, &CastRequest::new(Dead::NAME).ticks(2), None, &mut p, &mut env).unwrap();
        let again = cast(&catalog, &CastRequest::new(Dead::NAME), None, &mut p, &mut env).unwrap();
        assert_eq!(again, ApplyOutcome::Refused);
        assert!(!p.can_act());

        p.effects.tick(&mut p.core, &mut env, 5);
        assert!(p.core.is_dead());
        p.effects.tick(&mut p.core, &mut env, 5);
        assert!(!p.core.is_dead());
        assert_eq!(p.core.hp().current(), 30);
        assert_eq!(p.core.mp().current(), 12);
        assert!(p.can_act());
    }
}
