//! Per-character effect registry.
//!
//! The registry keeps effects in application order and is the only place
//! that moves an effect between lifecycle states. Every mutating call is
//! safe to repeat: unapplying an effect that is already gone, or ticking
//! a registry whose effects ended earlier in the same pass, is a no-op.
//!
//! A tick pass snapshots the ids of ticking effects first and then looks
//! each one up again before running it, so an effect that ends another
//! one mid-pass cannot disturb the iteration.

use rair_types::{Audience, EffectId, Notification, PersistedEffect, WorldEvent};
use tracing::{debug, warn};

use super::{
    EffectDuration, EffectEnv, EffectScope, EndReason, Effect, Lifecycle, StackPolicy, TickOutcome,
};
use crate::character::CharacterCore;
use crate::error::CharacterError;

/// Result of handing an effect to a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Added as a new instance.
    Applied(EffectId),
    /// Replaced an existing instance with the same name, in place.
    Refreshed(EffectId),
    /// Refused by the stacking policy.
    Refused,
    /// Refused by the effect's own preconditions.
    Rejected,
}

impl ApplyOutcome {
    /// Id of the effect now active, if any.
    pub const fn effect_id(self) -> Option<EffectId> {
        match self {
            Self::Applied(id) | Self::Refreshed(id) => Some(id),
            Self::Refused | Self::Rejected => None,
        }
    }
}

/// A failed effect hook observed during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectFault {
    /// Effect instance.
    pub effect: EffectId,
    /// Effect name.
    pub name: String,
    /// Rendered error.
    pub error: String,
    /// Whether the fault limit was reached and the effect removed.
    pub removed: bool,
}

/// What happened during one tick pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryTickReport {
    /// Tick hooks run.
    pub ticked: u32,
    /// Names of effects that ended.
    pub ended: Vec<String>,
    /// Hook failures.
    pub faults: Vec<EffectFault>,
}

/// Ordered set of effects on one character.
#[derive(Debug, Default)]
pub struct EffectRegistry {
    effects: Vec<Effect>,
}

impl EffectRegistry {
    /// Number of effects.
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Whether no effects are present.
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Effects in application order.
    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.effects.iter()
    }

    /// Effect by instance id.
    pub fn get(&self, id: EffectId) -> Option<&Effect> {
        self.effects.iter().find(|e| e.id == id)
    }

    /// First effect with this name.
    pub fn find(&self, name: &str) -> Option<&Effect> {
        self.effects.iter().find(|e| e.name == name)
    }

    /// Whether an effect with this name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Names in application order.
    pub fn names(&self) -> Vec<&str> {
        self.effects.iter().map(|e| e.name.as_str()).collect()
    }

    /// Whether any effect stops its owner from acting.
    pub fn prevents_action(&self) -> bool {
        self.effects.iter().any(Effect::prevents_action)
    }

    /// Saved form of every effect.
    pub fn persisted(&self) -> Vec<PersistedEffect> {
        self.effects.iter().map(Effect::to_persisted).collect()
    }

    /// Hand a pending effect to the registry.
    ///
    /// Applies the stacking policy, then runs the start hook. If an
    /// instance with the same name is replaced, it is ended with
    /// [`EndReason::Replaced`] once the new one has started, and the new
    /// one takes its slot.
    ///
    /// # Errors
    ///
    /// Returns the start hook's error. The new effect is discarded, any
    /// stat bonus it applied is reverted, and an instance it would have
    /// replaced stays in place.
    pub fn apply(
        &mut self,
        mut effect: Effect,
        owner: &mut CharacterCore,
        env: &mut EffectEnv<'_>,
    ) -> Result<ApplyOutcome, CharacterError> {
        if effect.lifecycle != Lifecycle::Pending {
            return Ok(ApplyOutcome::Refused);
        }

        let policy = effect.behavior.stacking();
        let existing = if policy == StackPolicy::Stackable {
            None
        } else {
            self.effects.iter().position(|e| e.name == effect.name)
        };

        let Some(slot) = existing else {
            Self::start(&mut effect, owner, env)?;
            let id = effect.id;
            self.effects.push(effect);
            return Ok(ApplyOutcome::Applied(id));
        };

        let allowed = match policy {
            StackPolicy::RefreshSameCaster => self
                .effects
                .get(slot)
                .is_some_and(|old| old.state.caster == effect.state.caster),
            StackPolicy::RefreshAnyCaster => true,
            StackPolicy::KeepExisting | StackPolicy::Stackable => false,
        };
        if !allowed {
            debug!(character = %owner.id, effect = %effect.name, "Effect refused by stacking policy");
            return Ok(ApplyOutcome::Refused);
        }

        Self::start(&mut effect, owner, env)?;
        let id = effect.id;
        if let Some(old) = self.effects.get_mut(slot) {
            Self::finish(old, owner, env, EndReason::Replaced);
            *old = effect;
        }
        Ok(ApplyOutcome::Refreshed(id))
    }

    fn start(
        effect: &mut Effect,
        owner: &mut CharacterCore,
        env: &mut EffectEnv<'_>,
    ) -> Result<(), CharacterError> {
        effect.lifecycle = Lifecycle::Active;
        let Effect {
            id,
            name,
            state,
            behavior,
            ..
        } = effect;
        let mut scope = EffectScope {
            owner: &mut *owner,
            state,
            env: &mut *env,
            effect_id: *id,
            name,
            damage_taken: 0,
        };
        if let Err(e) = behavior.on_start(&mut scope) {
            scope.state.revert_stats(scope.owner);
            effect.lifecycle = Lifecycle::Ended;
            return Err(e);
        }
        effect.lifecycle = Lifecycle::Ticking;
        debug!(character = %owner.id, effect = %effect.name, potency = effect.state.potency, "Effect applied");
        env.outbox.notify(Notification {
            audience: Audience::Character { id: owner.id },
            event: WorldEvent::EffectAdded {
                character: owner.id,
                effect: effect.view(),
            },
        });
        Ok(())
    }

    /// Run the end hook and revert stat bonuses. Returns `false` if the
    /// effect had already ended.
    fn finish(
        effect: &mut Effect,
        owner: &mut CharacterCore,
        env: &mut EffectEnv<'_>,
        reason: EndReason,
    ) -> bool {
        if effect.lifecycle == Lifecycle::Ended {
            return false;
        }
        let Effect {
            id,
            name,
            state,
            behavior,
            ..
        } = effect;
        let mut scope = EffectScope {
            owner: &mut *owner,
            state,
            env: &mut *env,
            effect_id: *id,
            name,
            damage_taken: 0,
        };
        if let Err(e) = behavior.on_end(&mut scope, reason) {
            warn!(character = %scope.owner.id, effect = %scope.name, error = %e, "Effect end hook failed");
        }
        scope.state.revert_stats(scope.owner);
        effect.lifecycle = Lifecycle::Ended;
        debug!(character = %owner.id, effect = %effect.name, ?reason, "Effect ended");
        env.outbox.notify(Notification {
            audience: Audience::Character { id: owner.id },
            event: WorldEvent::EffectRemoved {
                character: owner.id,
                effect: effect.id,
                name: effect.name.clone(),
            },
        });
        true
    }

    /// End and remove one effect. Returns `false` if it was not present.
    pub fn unapply(
        &mut self,
        id: EffectId,
        owner: &mut CharacterCore,
        env: &mut EffectEnv<'_>,
        reason: EndReason,
    ) -> bool {
        let Some(slot) = self.effects.iter().position(|e| e.id == id) else {
            return false;
        };
        let ended = self
            .effects
            .get_mut(slot)
            .is_some_and(|effect| Self::finish(effect, owner, env, reason));
        self.effects.remove(slot);
        ended
    }

    /// End and remove every effect with this name. Returns how many ended.
    pub fn unapply_named(
        &mut self,
        name: &str,
        owner: &mut CharacterCore,
        env: &mut EffectEnv<'_>,
        reason: EndReason,
    ) -> usize {
        let ids: Vec<EffectId> = self
            .effects
            .iter()
            .filter(|e| e.name == name)
            .map(|e| e.id)
            .collect();
        ids.into_iter()
            .filter(|id| self.unapply(*id, owner, env, reason))
            .count()
    }

    /// End and remove every effect. Returns how many ended.
    pub fn unapply_all(
        &mut self,
        owner: &mut CharacterCore,
        env: &mut EffectEnv<'_>,
        reason: EndReason,
    ) -> usize {
        let ids: Vec<EffectId> = self.effects.iter().map(|e| e.id).collect();
        ids.into_iter()
            .filter(|id| self.unapply(*id, owner, env, reason))
            .count()
    }

    /// Run one buff tick over every ticking effect, in application order.
    ///
    /// Each effect's tick hook runs, then its duration is decremented
    /// (unless permanent) and charges are checked; an effect whose
    /// duration reaches zero or whose charges run out ends in the same
    /// pass. A failing hook skips that effect's decrement and counts a
    /// fault; at `fault_limit` faults the effect is removed. The pass
    /// stops early if the owner dies during it.
    pub fn tick(
        &mut self,
        owner: &mut CharacterCore,
        env: &mut EffectEnv<'_>,
        fault_limit: u32,
    ) -> RegistryTickReport {
        let mut report = RegistryTickReport::default();
        let order: Vec<EffectId> = self
            .effects
            .iter()
            .filter(|e| e.lifecycle == Lifecycle::Ticking)
            .map(|e| e.id)
            .collect();
        let mut damage_taken: i64 = 0;
        let alive = !owner.is_dead();

        for id in order {
            if alive && owner.is_dead() {
                break;
            }
            let Some(effect) = self.effects.iter_mut().find(|e| e.id == id) else {
                continue;
            };
            if effect.lifecycle != Lifecycle::Ticking {
                continue;
            }

            let result = {
                let Effect {
                    id,
                    name,
                    state,
                    behavior,
                    ..
                } = &mut *effect;
                let mut scope = EffectScope {
                    owner: &mut *owner,
                    state,
                    env: &mut *env,
                    effect_id: *id,
                    name,
                    damage_taken: 0,
                };
                let result = behavior.on_tick(&mut scope);
                damage_taken = damage_taken.saturating_add(scope.damage_taken);
                result
            };
            report.ticked = report.ticked.saturating_add(1);

            let end = match result {
                Ok(outcome) => {
                    effect.state.ticks_elapsed = effect.state.ticks_elapsed.saturating_add(1);
                    match outcome {
                        TickOutcome::Continue => Self::countdown(effect),
                        TickOutcome::Expire => Some(EndReason::Expired),
                        TickOutcome::Interrupt => Some(EndReason::Interrupted),
                    }
                }
                Err(e) => {
                    effect.faults = effect.faults.saturating_add(1);
                    let removed = effect.faults >= fault_limit;
                    warn!(
                        character = %owner.id,
                        effect = %effect.name,
                        faults = effect.faults,
                        error = %e,
                        "Effect tick failed"
                    );
                    report.faults.push(EffectFault {
                        effect: effect.id,
                        name: effect.name.clone(),
                        error: e.to_string(),
                        removed,
                    });
                    removed.then_some(EndReason::Removed)
                }
            };

            if let Some(reason) = end {
                report.ended.push(effect.name.clone());
                self.unapply(id, owner, env, reason);
            }
        }

        if damage_taken > 0 && !owner.is_dead() {
            let hit_report = self.register_hit(owner, env, damage_taken);
            report.ended.extend(hit_report.ended);
            report.faults.extend(hit_report.faults);
        }
        report
    }

    /// Decrement duration and decide whether the effect has run out.
    fn countdown(effect: &mut Effect) -> Option<EndReason> {
        if let EffectDuration::Ticks(n) = effect.state.duration {
            let left = n.saturating_sub(1);
            effect.state.duration = EffectDuration::Ticks(left);
            if left == 0 {
                return Some(EndReason::Expired);
            }
        }
        (effect.state.charges == Some(0)).then_some(EndReason::Exhausted)
    }

    /// Offer a damage event to every ticking effect, then end any whose
    /// charges ran out.
    pub fn register_hit(
        &mut self,
        owner: &mut CharacterCore,
        env: &mut EffectEnv<'_>,
        damage: i64,
    ) -> RegistryTickReport {
        let mut report = RegistryTickReport::default();
        if damage <= 0 {
            return report;
        }
        let order: Vec<EffectId> = self
            .effects
            .iter()
            .filter(|e| e.lifecycle == Lifecycle::Ticking)
            .map(|e| e.id)
            .collect();

        for id in order {
            let Some(effect) = self.effects.iter_mut().find(|e| e.id == id) else {
                continue;
            };
            let result = {
                let Effect {
                    id,
                    name,
                    state,
                    behavior,
                    ..
                } = &mut *effect;
                let mut scope = EffectScope {
                    owner: &mut *owner,
                    state,
                    env: &mut *env,
                    effect_id: *id,
                    name,
                    damage_taken: 0,
                };
                behavior.on_hit(&mut scope, damage)
            };
            if let Err(e) = result {
                effect.faults = effect.faults.saturating_add(1);
                warn!(character = %owner.id, effect = %effect.name, error = %e, "Effect hit hook failed");
                report.faults.push(EffectFault {
                    effect: effect.id,
                    name: effect.name.clone(),
                    error: e.to_string(),
                    removed: false,
                });
            }
            if effect.state.charges == Some(0) {
                report.ended.push(effect.name.clone());
                self.unapply(id, owner, env, EndReason::Exhausted);
            }
        }
        report
    }
}
