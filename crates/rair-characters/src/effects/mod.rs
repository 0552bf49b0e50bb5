//! The effect lifecycle engine.
//!
//! An [`Effect`] is a timed or charge-based modifier attached to one
//! character. Each effect moves through [`Lifecycle`] states exactly once,
//! in order: `Pending` when built by the catalog, `Active` once its start
//! hook has run, `Ticking` while it receives periodic updates, and `Ended`
//! after its end hook has run. Nothing ever moves an effect backwards.
//!
//! Behavior specific to one kind of effect lives behind the
//! [`EffectBehavior`] trait. The common attributes (potency, duration,
//! charges, caster) live in [`EffectState`], which also records every stat
//! delta the behavior applies so teardown can reverse them exactly.
//!
//! # Modules
//!
//! - [`registry`] -- Per-character ordered registry: apply, unapply, tick
//! - [`catalog`] -- Name-keyed constructor table and the cast entry point
//! - [`damage_over_time`] -- Poison, venom, disease, searing purification
//! - [`modifiers`] -- Plain stat modifiers and markers
//! - [`buffs`] -- Boost, stun, vital essence
//! - [`summon`] -- Familiar channel and pet bookkeeping
//! - [`dead`] -- Player death timer

pub mod buffs;
pub mod catalog;
pub mod damage_over_time;
pub mod dead;
pub mod modifiers;
pub mod registry;
pub mod summon;

use std::collections::BTreeMap;
use std::fmt;

use rair_types::{
    CharacterId, EffectId, EffectView, IconData, MessageKind, Notification, PersistedEffect, Stat,
};
use rand::rngs::StdRng;

use crate::character::{CharacterCore, CombatantSnapshot, Roster};
use crate::error::{CastRejection, CharacterError};

pub use catalog::{EffectCatalog, cast, restore_effects};
pub use registry::{ApplyOutcome, EffectFault, EffectRegistry, RegistryTickReport};

/// Where an effect is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Built, not yet applied.
    Pending,
    /// Start hook has run.
    Active,
    /// Receiving periodic ticks.
    Ticking,
    /// End hook has run. Terminal.
    Ended,
}

/// Remaining lifetime of an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectDuration {
    /// Whole ticks remaining.
    Ticks(u32),
    /// Never expires on its own.
    Permanent,
}

impl EffectDuration {
    /// Remaining ticks, `None` when permanent.
    pub const fn remaining(self) -> Option<u32> {
        match self {
            Self::Ticks(n) => Some(n),
            Self::Permanent => None,
        }
    }

    /// Build from a persisted remaining count.
    pub const fn from_remaining(remaining: Option<u32>) -> Self {
        match remaining {
            Some(n) => Self::Ticks(n),
            None => Self::Permanent,
        }
    }
}

/// How a registry treats a second effect with the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPolicy {
    /// Same caster replaces the existing instance; anyone else is refused.
    RefreshSameCaster,
    /// Any caster replaces the existing instance.
    RefreshAnyCaster,
    /// The existing instance always wins.
    KeepExisting,
    /// Independent instances coexist.
    Stackable,
}

/// Why an effect ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Duration reached zero, or the effect asked to expire.
    Expired,
    /// Charges ran out.
    Exhausted,
    /// Dispelled or force-removed.
    Removed,
    /// Replaced by a newer cast of the same effect.
    Replaced,
    /// A channel was interrupted.
    Interrupted,
    /// The owner died.
    Death,
}

/// What an effect's tick hook wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Keep going; the registry decrements the duration.
    Continue,
    /// End now with [`EndReason::Expired`].
    Expire,
    /// End now with [`EndReason::Interrupted`].
    Interrupt,
}

/// A request to cast an effect by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastRequest {
    /// Catalog name.
    pub name: String,
    /// Explicit potency. Behaviors compute a default when absent.
    pub potency: Option<u32>,
    /// Explicit duration. Behaviors compute a default when absent.
    pub duration: Option<EffectDuration>,
    /// Explicit charges.
    pub charges: Option<u32>,
    /// Caster id.
    pub caster: Option<CharacterId>,
}

impl CastRequest {
    /// A request with no explicit parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            potency: None,
            duration: None,
            charges: None,
            caster: None,
        }
    }

    /// Set the potency.
    #[must_use]
    pub const fn potency(mut self, potency: u32) -> Self {
        self.potency = Some(potency);
        self
    }

    /// Set a finite duration.
    #[must_use]
    pub const fn ticks(mut self, ticks: u32) -> Self {
        self.duration = Some(EffectDuration::Ticks(ticks));
        self
    }

    /// Make the effect permanent.
    #[must_use]
    pub const fn permanent(mut self) -> Self {
        self.duration = Some(EffectDuration::Permanent);
        self
    }

    /// Set the charges.
    #[must_use]
    pub const fn charges(mut self, charges: u32) -> Self {
        self.charges = Some(charges);
        self
    }

    /// Set the caster.
    #[must_use]
    pub const fn caster(mut self, caster: CharacterId) -> Self {
        self.caster = Some(caster);
        self
    }
}

/// Attributes shared by every effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectState {
    /// Magnitude. Meaning depends on the behavior.
    pub potency: u32,
    /// Remaining lifetime.
    pub duration: EffectDuration,
    /// Remaining triggers for charge-based effects.
    pub charges: Option<u32>,
    /// Caster id. Resolve through a [`Roster`] on each use.
    pub caster: Option<CharacterId>,
    /// Caster name at cast time.
    pub caster_name: Option<String>,
    /// Icon metadata.
    pub icon: IconData,
    /// Ticks received so far.
    pub ticks_elapsed: u32,
    deltas: BTreeMap<Stat, i64>,
}

impl EffectState {
    /// State for a request, before the behavior fills in defaults.
    pub fn from_request(request: &CastRequest) -> Self {
        Self {
            potency: request.potency.unwrap_or(0),
            duration: request.duration.unwrap_or(EffectDuration::Ticks(0)),
            charges: request.charges,
            caster: request.caster,
            caster_name: None,
            icon: IconData::default(),
            ticks_elapsed: 0,
            deltas: BTreeMap::new(),
        }
    }

    /// Apply a stat bonus to `owner` and remember it for teardown.
    pub fn apply_stat(&mut self, owner: &mut CharacterCore, stat: Stat, delta: i64) {
        if delta == 0 {
            return;
        }
        owner.adjust_bonus(stat, delta);
        let entry = self.deltas.entry(stat).or_insert(0);
        *entry = entry.saturating_add(delta);
    }

    /// Reverse every recorded stat bonus. Safe to call more than once.
    pub fn revert_stats(&mut self, owner: &mut CharacterCore) {
        for (stat, delta) in std::mem::take(&mut self.deltas) {
            owner.adjust_bonus(stat, delta.saturating_neg());
        }
    }

    /// Stat bonuses currently held by this effect.
    pub const fn applied_deltas(&self) -> &BTreeMap<Stat, i64> {
        &self.deltas
    }

    /// Look the caster up in the roster.
    pub fn resolve_caster<'r>(&self, roster: &'r Roster) -> Option<&'r CombatantSnapshot> {
        self.caster.and_then(|id| roster.get(&id))
    }

    /// Whether the effect never expires on its own.
    pub const fn is_permanent(&self) -> bool {
        matches!(self.duration, EffectDuration::Permanent)
    }
}

/// Cross-character side effect requested by an effect or skill.
///
/// The world applies these after the step that produced them, so no hook
/// ever holds two characters mutably at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldCommand {
    /// Cast an effect on `target`.
    Cast {
        /// Recipient.
        target: CharacterId,
        /// What to cast.
        request: CastRequest,
    },
    /// Put a character into combat.
    MarkInCombat {
        /// Character.
        character: CharacterId,
    },
    /// Add threat from `holder` toward `toward`.
    AddAggro {
        /// Character gaining threat.
        holder: CharacterId,
        /// Target of the threat.
        toward: CharacterId,
        /// Amount.
        amount: i64,
    },
    /// Summon a pet for `owner`.
    Summon {
        /// Pet master.
        owner: CharacterId,
        /// Content id of the pet.
        npc: String,
        /// Potency of the summoning.
        potency: u32,
    },
    /// Kill every pet of `owner`.
    DismissPets {
        /// Pet master.
        owner: CharacterId,
    },
    /// Remove every effect named `effect` from `target`.
    Dispel {
        /// Character.
        target: CharacterId,
        /// Effect name.
        effect: String,
    },
}

/// Side effects collected during a step.
#[derive(Debug, Default)]
pub struct Outbox {
    commands: Vec<WorldCommand>,
    notifications: Vec<Notification>,
}

impl Outbox {
    /// Queue a world command.
    pub fn push(&mut self, command: WorldCommand) {
        self.commands.push(command);
    }

    /// Queue a notification.
    pub fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    /// Queue several notifications.
    pub fn notify_all(&mut self, notifications: impl IntoIterator<Item = Notification>) {
        self.notifications.extend(notifications);
    }

    /// Take queued commands.
    pub fn take_commands(&mut self) -> Vec<WorldCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Take queued notifications.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Queued commands.
    pub fn commands(&self) -> &[WorldCommand] {
        &self.commands
    }

    /// Queued notifications.
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.notifications.is_empty()
    }
}

/// World-level context handed to effect hooks.
pub struct EffectEnv<'w> {
    /// Current tick.
    pub tick: u64,
    /// Snapshots of every character, for caster lookups.
    pub roster: &'w Roster,
    /// World random source.
    pub rng: &'w mut StdRng,
    /// In-combat countdown applied by hits.
    pub combat_ticks: u32,
    /// Collected side effects.
    pub outbox: Outbox,
}

impl<'w> EffectEnv<'w> {
    /// A context with an empty outbox.
    pub fn new(tick: u64, roster: &'w Roster, rng: &'w mut StdRng, combat_ticks: u32) -> Self {
        Self {
            tick,
            roster,
            rng,
            combat_ticks,
            outbox: Outbox::default(),
        }
    }
}

/// Everything a lifecycle hook may touch.
pub struct EffectScope<'a, 'w> {
    /// The character carrying the effect.
    pub owner: &'a mut CharacterCore,
    /// The effect's common state.
    pub state: &'a mut EffectState,
    /// World context.
    pub env: &'a mut EffectEnv<'w>,
    /// Effect instance id.
    pub effect_id: EffectId,
    /// Effect name.
    pub name: &'a str,
    /// Health the owner lost to this hook, fed to on-hit hooks afterwards.
    pub damage_taken: i64,
}

impl EffectScope<'_, '_> {
    /// Apply and record a stat bonus on the owner.
    pub fn apply_stat(&mut self, stat: Stat, delta: i64) {
        self.state.apply_stat(self.owner, stat, delta);
    }

    /// The caster, if still present in the world.
    pub fn caster(&self) -> Option<&CombatantSnapshot> {
        self.state.resolve_caster(self.env.roster)
    }

    /// Send a message to the owner.
    pub fn tell_owner(&mut self, kind: MessageKind, text: impl Into<String>) {
        self.env
            .outbox
            .notify(Notification::to_character(self.owner.id, kind, text));
    }

    /// Cast another effect on the owner after this step.
    pub fn cast_on_owner(&mut self, request: CastRequest) {
        let target = self.owner.id;
        self.env.outbox.push(WorldCommand::Cast { target, request });
    }

    /// Hook failure for this effect.
    pub fn failure(&self, reason: impl Into<String>) -> CharacterError {
        CharacterError::EffectHook {
            effect: self.name.to_owned(),
            character: self.owner.id,
            reason: reason.into(),
        }
    }
}

/// Read-only context for validating a cast.
pub struct CastSetup<'a> {
    /// The original request.
    pub request: &'a CastRequest,
    /// State being prepared.
    pub state: &'a mut EffectState,
    /// The caster, if present.
    pub caster: Option<&'a CombatantSnapshot>,
    /// The target.
    pub target: &'a CharacterCore,
    /// The target's current effects.
    pub target_effects: &'a EffectRegistry,
    /// World random source.
    pub rng: &'a mut StdRng,
}

impl CastSetup<'_> {
    /// Set potency unless the request supplied one.
    pub const fn default_potency(&mut self, potency: u32) {
        if self.request.potency.is_none() {
            self.state.potency = potency;
        }
    }

    /// Set duration unless the request supplied one.
    pub const fn default_duration(&mut self, duration: EffectDuration) {
        if self.request.duration.is_none() {
            self.state.duration = duration;
        }
    }

    /// Set charges unless the request supplied them.
    pub const fn default_charges(&mut self, charges: u32) {
        if self.request.charges.is_none() {
            self.state.charges = Some(charges);
        }
    }

    /// Level of a caster skill, zero without a caster.
    pub fn caster_skill(&self, skill: &str) -> u32 {
        self.caster.map_or(0, |c| c.skill_level(skill))
    }

    /// Level of a caster trait, zero without a caster.
    pub fn caster_trait(&self, name: &str) -> u32 {
        self.caster.map_or(0, |c| c.trait_level(name))
    }
}

/// Behavior specific to one kind of effect.
///
/// Every hook has a no-op default. Hooks never touch characters other than
/// the owner; they request cross-character work through the outbox.
pub trait EffectBehavior: fmt::Debug + Send {
    /// Policy for a second instance with the same name.
    fn stacking(&self) -> StackPolicy {
        StackPolicy::RefreshSameCaster
    }

    /// Whether the owner is unable to act while this is active.
    fn prevents_action(&self) -> bool {
        false
    }

    /// Validate preconditions and compute defaults. Runs before `Active`.
    fn on_cast(&mut self, _setup: &mut CastSetup<'_>) -> Result<(), CastRejection> {
        Ok(())
    }

    /// Runs once when the effect becomes active.
    fn on_start(&mut self, _scope: &mut EffectScope<'_, '_>) -> Result<(), CharacterError> {
        Ok(())
    }

    /// Runs once per buff tick while ticking.
    fn on_tick(&mut self, _scope: &mut EffectScope<'_, '_>) -> Result<TickOutcome, CharacterError> {
        Ok(TickOutcome::Continue)
    }

    /// Runs once when the effect ends. Recorded stat bonuses are reverted
    /// by the registry after this returns.
    fn on_end(
        &mut self,
        _scope: &mut EffectScope<'_, '_>,
        _reason: EndReason,
    ) -> Result<(), CharacterError> {
        Ok(())
    }

    /// Runs when the owner takes damage.
    fn on_hit(&mut self, _scope: &mut EffectScope<'_, '_>, _damage: i64) -> Result<(), CharacterError> {
        Ok(())
    }

    /// Private state to save with the effect.
    fn persist_data(&self) -> BTreeMap<String, i64> {
        BTreeMap::new()
    }

    /// Reload private state saved by [`EffectBehavior::persist_data`].
    fn restore_data(&mut self, _data: &BTreeMap<String, i64>) {}
}

/// One effect instance.
#[derive(Debug)]
pub struct Effect {
    id: EffectId,
    name: String,
    state: EffectState,
    lifecycle: Lifecycle,
    faults: u32,
    behavior: Box<dyn EffectBehavior>,
}

impl Effect {
    /// A pending effect.
    pub fn new(name: impl Into<String>, state: EffectState, behavior: Box<dyn EffectBehavior>) -> Self {
        Self {
            id: EffectId::new(),
            name: name.into(),
            state,
            lifecycle: Lifecycle::Pending,
            faults: 0,
            behavior,
        }
    }

    /// Instance id.
    pub const fn id(&self) -> EffectId {
        self.id
    }

    /// Name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Common state.
    pub const fn state(&self) -> &EffectState {
        &self.state
    }

    /// Lifecycle state.
    pub const fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Number of failed hooks so far.
    pub const fn faults(&self) -> u32 {
        self.faults
    }

    /// Whether the owner is unable to act while this is active.
    pub fn prevents_action(&self) -> bool {
        self.lifecycle != Lifecycle::Ended && self.behavior.prevents_action()
    }

    /// Client view.
    pub fn view(&self) -> EffectView {
        EffectView {
            id: self.id,
            name: self.name.clone(),
            potency: self.state.potency,
            remaining: self.state.duration.remaining(),
            charges: self.state.charges,
            icon: self.state.icon.clone(),
        }
    }

    /// Saved form.
    pub fn to_persisted(&self) -> PersistedEffect {
        PersistedEffect {
            name: self.name.clone(),
            potency: self.state.potency,
            remaining: self.state.duration.remaining(),
            charges: self.state.charges,
            caster: self.state.caster,
            caster_name: self.state.caster_name.clone(),
            data: self.behavior.persist_data(),
        }
    }
}
