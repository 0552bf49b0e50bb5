//! Name-keyed effect constructors and the cast entry point.
//!
//! The catalog is built once at startup and shared by every world. It is
//! an ordinary value, not a global: worlds receive it as an
//! `Arc<EffectCatalog>` and tests build their own, registering extra
//! behaviors as needed.

use std::collections::BTreeMap;
use std::fmt;

use rair_types::{MessageKind, Notification, PersistedEffect};

use super::buffs::{Boost, Stun, VitalEssence};
use super::damage_over_time::{DISEASE, DamageOverTime, POISON, SEARING_PURIFICATION, VENOM};
use super::dead::Dead;
use super::modifiers::{
    BAR_FROST, EAGLE_EYE, INVISIBLE, LOWERED_DEFENSES, MALNOURISHED, Marker, RECENTLY_PURIFIED,
    SUMMONED_PET, StatModifier,
};
use super::summon::{ActivePet, ChannelFindFamiliar};
use super::{
    ApplyOutcome, CastRequest, CastSetup, Effect, EffectBehavior, EffectDuration, EffectEnv,
    EffectState,
};
use crate::character::{Character, CombatantSnapshot};
use crate::error::CharacterError;

type Constructor = Box<dyn Fn() -> Box<dyn EffectBehavior> + Send + Sync>;

/// Table of effect constructors keyed by effect name.
pub struct EffectCatalog {
    constructors: BTreeMap<String, Constructor>,
}

impl fmt::Debug for EffectCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectCatalog")
            .field("effects", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for EffectCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl EffectCatalog {
    /// A catalog with nothing registered.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// A catalog with every built-in effect registered.
    pub fn standard() -> Self {
        let mut catalog = Self::empty();
        for profile in [&POISON, &VENOM, &DISEASE, &SEARING_PURIFICATION] {
            catalog.register(profile.name, move || Box::new(DamageOverTime::new(profile)));
        }
        for profile in [&BAR_FROST, &EAGLE_EYE, &INVISIBLE, &LOWERED_DEFENSES, &MALNOURISHED] {
            catalog.register(profile.name, move || Box::new(StatModifier::new(profile)));
        }
        for profile in [&RECENTLY_PURIFIED, &SUMMONED_PET] {
            catalog.register(profile.name, move || Box::new(Marker::new(profile)));
        }
        catalog.register(Boost::NAME, || Box::new(Boost::default()));
        catalog.register(Stun::NAME, || Box::new(Stun));
        catalog.register(VitalEssence::NAME, || Box::new(VitalEssence));
        catalog.register(ChannelFindFamiliar::NAME, || Box::new(ChannelFindFamiliar::default()));
        catalog.register(ActivePet::NAME, || Box::new(ActivePet));
        catalog.register(Dead::NAME, || Box::new(Dead));
        catalog
    }

    /// Register or replace a constructor.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn EffectBehavior> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Box::new(constructor));
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    fn behavior(&self, name: &str) -> Result<Box<dyn EffectBehavior>, CharacterError> {
        self.constructors
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| CharacterError::UnknownEffect {
                name: name.to_owned(),
            })
    }
}

/// Cast an effect on `target`.
///
/// Validates preconditions through the behavior's cast hook, which also
/// fills in any potency, duration, or charges the request left out, then
/// hands the effect to the target's registry. A failed precondition is
/// not an error: the target is untouched, the caster gets the rejection
/// message, and [`ApplyOutcome::Rejected`] is returned.
///
/// # Errors
///
/// Returns [`CharacterError::UnknownEffect`] for an unregistered name, or
/// the start hook's error.
pub fn cast(
    catalog: &EffectCatalog,
    request: &CastRequest,
    caster: Option<&CombatantSnapshot>,
    target: &mut Character,
    env: &mut EffectEnv<'_>,
) -> Result<ApplyOutcome, CharacterError> {
    let mut behavior = catalog.behavior(&request.name)?;
    let mut state = EffectState::from_request(request);
    if state.caster.is_none() {
        state.caster = caster.map(|c| c.id);
    }
    state.caster_name = caster.map(|c| c.name.clone());

    let validation = {
        let mut setup = CastSetup {
            request,
            state: &mut state,
            caster,
            target: &target.core,
            target_effects: &target.effects,
            rng: &mut *env.rng,
        };
        behavior.on_cast(&mut setup)
    };

    if let Err(rejection) = validation {
        if let (Some(message), Some(caster_id)) = (rejection.message, state.caster) {
            env.outbox
                .notify(Notification::to_character(caster_id, MessageKind::Refused, message));
        }
        return Ok(ApplyOutcome::Rejected);
    }

    let effect = Effect::new(request.name.clone(), state, behavior);
    target.effects.apply(effect, &mut target.core, env)
}

/// Re-apply saved effects to a freshly loaded character.
///
/// Cast preconditions are not re-checked. Each saved effect that cannot
/// be rebuilt is skipped and its error returned.
pub fn restore_effects(
    catalog: &EffectCatalog,
    saved: &[PersistedEffect],
    target: &mut Character,
    env: &mut EffectEnv<'_>,
) -> Vec<CharacterError> {
    let mut errors = Vec::new();
    for record in saved {
        let mut behavior = match catalog.behavior(&record.name) {
            Ok(b) => b,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };
        behavior.restore_data(&record.data);
        let request = CastRequest {
            name: record.name.clone(),
            potency: Some(record.potency),
            duration: Some(EffectDuration::from_remaining(record.remaining)),
            charges: record.charges,
            caster: record.caster,
        };
        let mut state = EffectState::from_request(&request);
        state.caster_name.clone_from(&record.caster_name);
        let effect = Effect::new(record.name.clone(), state, behavior);
        if let Err(e) = target.effects.apply(effect, &mut target.core, env) {
            errors.push(e);
        }
    }
    errors
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use rair_types::{CharacterId, CharacterKind, Stat};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::character::{CharacterCore, Roster};
    use crate::effects::Lifecycle;
    use crate::error::CastRejection;

    fn target() -> Character {
        Character::new(CharacterCore::new(
            CharacterId::new(),
            "Target",
            CharacterKind::Player,
            BTreeMap::from([(Stat::Hp, 100)]),
        ))
    }

    #[derive(Debug)]
    struct Picky;

    impl EffectBehavior for Picky {
        fn on_cast(&mut self, setup: &mut CastSetup<'_>) -> Result<(), CastRejection> {
            if setup.target.hp().is_full() {
                return Err(CastRejection::with_message("They are not hurt."));
            }
            setup.default_duration(EffectDuration::Ticks(4));
            Ok(())
        }
    }

    #[test]
    fn standard_catalog_has_builtins() {
        let catalog = EffectCatalog::standard();
        for name in ["Poison", "Venom", "Boost", "Stun", "Dead", "VitalEssence", "ChannelFindFamiliar"] {
            assert!(catalog.contains(name), "missing {name}");
        }
    }

    #[test]
    fn unknown_effect_is_an_error() {
        let catalog = EffectCatalog::empty();
        let roster = Roster::new();
        let mut rng = StdRng::seed_from_u64(1);
        let mut env = EffectEnv::new(1, &roster, &mut rng, 10);
        let mut t = target();
        let err = cast(&catalog, &CastRequest::new("Nope"), None, &mut t, &mut env).unwrap_err();
        assert!(matches!(err, CharacterError::UnknownEffect { .. }));
    }

    #[test]
    fn rejected_cast_leaves_target_untouched_and_tells_caster() {
        let mut catalog = EffectCatalog::empty();
        catalog.register("Picky", || Box::new(Picky));
        let caster = target().core.snapshot();
        let roster = Roster::new();
        let mut rng = StdRng::seed_from_u64(1);
        let mut env = EffectEnv::new(1, &roster, &mut rng, 10);
        let mut t = target();

        let outcome = cast(&catalog, &CastRequest::new("Picky"), Some(&caster), &mut t, &mut env).unwrap();
        assert_eq!(outcome, ApplyOutcome::Rejected);
        assert!(t.effects.is_empty());
        let notes = env.outbox.take_notifications();
        assert_eq!(notes.len(), 1);
        assert!(notes.first().unwrap().is_for(caster.id));
    }

    #[test]
    fn defaults_fill_only_missing_fields() {
        let mut catalog = EffectCatalog::empty();
        catalog.register("Picky", || Box::new(Picky));
        let roster = Roster::new();
        let mut rng = StdRng::seed_from_u64(1);
        let mut env = EffectEnv::new(1, &roster, &mut rng, 10);
        let mut t = target();
        t.core.take_damage(5);

        cast(&catalog, &CastRequest::new("Picky"), None, &mut t, &mut env).unwrap();
        assert_eq!(t.effects.find("Picky").unwrap().state().duration, EffectDuration::Ticks(4));

        let mut other = target();
        other.core.take_damage(5);
        cast(&catalog, &CastRequest::new("Picky").ticks(9), None, &mut other, &mut env).unwrap();
        let effect = other.effects.find("Picky").unwrap();
        assert_eq!(effect.state().duration, EffectDuration::Ticks(9));
        assert_eq!(effect.lifecycle(), Lifecycle::Ticking);
    }

    #[test]
    fn saved_effects_are_restored() {
        let catalog = EffectCatalog::standard();
        let roster = Roster::new();
        let mut rng = StdRng::seed_from_u64(1);
        let mut env = EffectEnv::new(1, &roster, &mut rng, 10);
        let mut source = target();
        cast(&catalog, &CastRequest::new("BarFrost").potency(2), None, &mut source, &mut env).unwrap();
        let saved = source.effects.persisted();

        let mut loaded = target();
        let errors = restore_effects(&catalog, &saved, &mut loaded, &mut env);
        assert!(errors.is_empty());
        assert_eq!(loaded.core.stat(Stat::IceResist), 40);
        assert_eq!(
            loaded.effects.find("BarFrost").unwrap().state().duration,
            EffectDuration::Ticks(200)
        );
    }
}
