//! One running map instance.
//!
//! A [`World`] owns every character and spawner on its map, the clock, and
//! the random source all of its rolls come from. It is driven one tick at
//! a time by [`crate::tick::run_tick`] and is never shared between tasks:
//! inbound traffic reaches it as [`WorldInput`] values drained between
//! ticks.
//!
//! Effects and skills never touch a second character directly. A step on
//! one character returns an [`Outbox`]; the world then applies the queued
//! [`WorldCommand`]s in bounded rounds, so a command that triggers more
//! commands cannot loop forever.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use rair_characters::effects::dead::Dead;
use rair_characters::effects::modifiers::SUMMONED_PET;
use rair_characters::effects::summon::ActivePet;
use rair_characters::effects::{
    ApplyOutcome, CastRequest, EffectCatalog, EffectEnv, EndReason, Outbox, WorldCommand, cast,
    restore_effects,
};
use rair_characters::{
    ActionQueue, Character, CharacterError, CombatantSnapshot, QueueOverflow, Roster,
};
use rair_types::{
    CharacterId, CharacterState, EffectId, MessageKind, Notification, Position, SpawnerId,
    SpawnerTimerRecord, WorldEvent,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::clock::{Clock, ClockError};
use crate::config::{MapConfig, RairConfig, TickRates};
use crate::content::{ContentCatalog, NpcInstance};
use crate::geometry::{Geometry, OpenField};
use crate::notify::{NotificationSink, TracingSink};
use crate::persistence::{PersistRequest, PersistenceHandle};
use crate::spawner::{SpawnContext, Spawner, SpawnerConfig, SpawnerError};

/// Rounds of follow-up commands applied after one step.
pub const MAX_COMMAND_ROUNDS: u32 = 8;

/// Tunables of one world, resolved from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldSettings {
    /// Map name, used in storage keys and logs.
    pub map: String,
    /// Wall-clock length of a tick.
    pub tick_period_ms: u64,
    /// Seed of the world's random source.
    pub seed: u64,
    /// Phase rates.
    pub rates: TickRates,
    /// Bound on queued commands per character.
    pub action_queue_length: usize,
    /// What a full queue drops.
    pub queue_overflow: QueueOverflow,
    /// Hunger countdown given to players who have none.
    pub hunger_ticks: u32,
    /// In-combat countdown set by a hit.
    pub combat_ticks: u32,
    /// Length of the death timer.
    pub death_ticks: u32,
    /// Regeneration cadence in ticks.
    pub regen_interval: u64,
    /// Health of a freshly created player.
    pub starting_hp: i64,
    /// Failed hooks before an effect is force-removed.
    pub effect_fault_limit: u32,
    /// Consecutive failed steps before a spawner is disabled.
    pub spawner_fault_limit: u32,
}

impl WorldSettings {
    /// Settings for `map` under `config`.
    ///
    /// Each map derives its own seed from the server seed and its name, so
    /// two maps never share a random sequence.
    pub fn from_config(config: &RairConfig, map: &MapConfig) -> Self {
        let seed = map
            .name
            .bytes()
            .fold(config.server.seed, |acc, b| acc.rotate_left(5) ^ u64::from(b));
        Self {
            map: map.name.clone(),
            tick_period_ms: config.server.tick_period_ms,
            seed,
            rates: config.rates.clone(),
            action_queue_length: config.characters.action_queue_length,
            queue_overflow: config.characters.queue_overflow,
            hunger_ticks: config.characters.hunger_ticks,
            combat_ticks: config.characters.combat_ticks,
            death_ticks: config.characters.death_ticks,
            regen_interval: config.characters.regen_interval,
            starting_hp: config.characters.starting_hp,
            effect_fault_limit: config.faults.effect_fault_limit,
            spawner_fault_limit: config.faults.spawner_fault_limit,
        }
    }

    /// Default settings for a map called `name`.
    pub fn for_map(name: &str) -> Self {
        Self::from_config(&RairConfig::default(), &MapConfig::named(name))
    }
}

/// Collaborators a world is built with.
pub struct WorldServices {
    /// Effect behaviors.
    pub catalog: Arc<EffectCatalog>,
    /// NPC definitions.
    pub content: Arc<ContentCatalog>,
    /// Map queries.
    pub geometry: Box<dyn Geometry>,
    /// Where notifications go.
    pub sink: Box<dyn NotificationSink>,
    /// Where saves go.
    pub persistence: PersistenceHandle,
}

impl WorldServices {
    /// Standard effects, the built-in content, open ground, a logging
    /// sink, and no storage.
    pub fn standalone() -> Self {
        Self {
            catalog: Arc::new(EffectCatalog::standard()),
            content: Arc::new(ContentCatalog::default()),
            geometry: Box::new(OpenField::new(MapConfig::named("standalone").sight_radius)),
            sink: Box::new(TracingSink),
            persistence: PersistenceHandle::disconnected(),
        }
    }
}

/// Traffic for a world, applied between ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldInput {
    /// A player enters with their saved state.
    Admit(Box<CharacterState>),
    /// A player leaves.
    Depart {
        /// Leaving player.
        character: CharacterId,
    },
    /// A raw command line from a player.
    Command {
        /// Issuing player.
        character: CharacterId,
        /// Unparsed text.
        line: String,
    },
}

/// What a shutdown wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Players submitted for saving.
    pub players_saved: usize,
    /// Boss timers submitted for saving.
    pub timers_saved: usize,
}

/// A running map instance.
pub struct World {
    pub(crate) settings: WorldSettings,
    pub(crate) clock: Clock,
    pub(crate) characters: BTreeMap<CharacterId, Character>,
    pub(crate) spawners: BTreeMap<SpawnerId, Spawner>,
    pub(crate) catalog: Arc<EffectCatalog>,
    pub(crate) content: Arc<ContentCatalog>,
    pub(crate) geometry: Box<dyn Geometry>,
    pub(crate) rng: StdRng,
    sink: Box<dyn NotificationSink>,
    persistence: PersistenceHandle,
    pending: Vec<Notification>,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("map", &self.settings.map)
            .field("tick", &self.clock.tick())
            .field("characters", &self.characters.len())
            .field("spawners", &self.spawners.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl World {
    /// An empty world at tick zero.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if the phase rates do not
    /// validate.
    pub fn new(settings: WorldSettings, services: WorldServices) -> Result<Self, ClockError> {
        let clock = Clock::new(&settings.rates)?;
        let rng = StdRng::seed_from_u64(settings.seed);
        Ok(Self {
            settings,
            clock,
            characters: BTreeMap::new(),
            spawners: BTreeMap::new(),
            catalog: services.catalog,
            content: services.content,
            geometry: services.geometry,
            rng,
            sink: services.sink,
            persistence: services.persistence,
            pending: Vec::new(),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Resolved settings.
    pub const fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    /// Map name.
    pub fn map(&self) -> &str {
        &self.settings.map
    }

    /// Current tick.
    pub const fn tick(&self) -> u64 {
        self.clock.tick()
    }

    /// Look a character up.
    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.get(&id)
    }

    /// Mutable access to a character, for administrative changes between
    /// ticks.
    pub fn character_mut(&mut self, id: CharacterId) -> Option<&mut Character> {
        self.characters.get_mut(&id)
    }

    /// Every character, in id order.
    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    /// Look a spawner up.
    pub fn spawner(&self, id: SpawnerId) -> Option<&Spawner> {
        self.spawners.get(&id)
    }

    /// Every spawner, in id order.
    pub fn spawners(&self) -> impl Iterator<Item = &Spawner> {
        self.spawners.values()
    }

    /// Connected players.
    pub fn player_count(&self) -> usize {
        self.characters.values().filter(|c| c.core.is_player()).count()
    }

    /// NPCs, pets included.
    pub fn npc_count(&self) -> usize {
        self.characters.values().filter(|c| !c.core.is_player()).count()
    }

    /// Ids of connected players.
    pub fn player_ids(&self) -> Vec<CharacterId> {
        self.characters
            .values()
            .filter(|c| c.core.is_player())
            .map(Character::id)
            .collect()
    }

    /// Snapshot of every character, taken before a phase.
    pub fn roster(&self) -> Roster {
        self.characters
            .iter()
            .map(|(id, c)| (*id, c.core.snapshot()))
            .collect()
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    pub(crate) fn notify(&mut self, notification: Notification) {
        self.pending.push(notification);
    }

    pub(crate) fn notify_all(&mut self, notifications: impl IntoIterator<Item = Notification>) {
        self.pending.extend(notifications);
    }

    pub(crate) fn tell(&mut self, id: CharacterId, kind: MessageKind, text: impl Into<String>) {
        self.pending.push(Notification::to_character(id, kind, text));
    }

    /// Hand every queued notification to the sink. Returns how many were
    /// delivered.
    pub fn flush_notifications(&mut self) -> usize {
        let batch = std::mem::take(&mut self.pending);
        let count = batch.len();
        if count > 0 {
            self.sink.deliver(batch);
        }
        count
    }

    // =========================================================================
    // Spawners
    // =========================================================================

    /// Add a spawner. It first spawns on the next spawner phase.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnerError::NoNpcs`] if the configuration names nothing
    /// to spawn.
    pub fn add_spawner(
        &mut self,
        name: &str,
        anchor: Position,
        config: SpawnerConfig,
    ) -> Result<SpawnerId, SpawnerError> {
        let spawner = Spawner::new(name, anchor, config)?;
        let id = spawner.id();
        info!(map = %self.settings.map, spawner = %name, x = anchor.x, y = anchor.y, "Spawner added");
        self.spawners.insert(id, spawner);
        Ok(id)
    }

    /// Remove a spawner and every non-permanent NPC it owns. Permanent
    /// NPCs stay in the world, detached.
    pub fn remove_spawner(&mut self, id: SpawnerId) -> bool {
        let Some(spawner) = self.spawners.remove(&id) else {
            return false;
        };
        for npc in spawner.alive() {
            let permanent = match self.characters.get_mut(npc) {
                Some(c) if c.core.permanent => {
                    c.core.spawner = None;
                    true
                }
                Some(_) => false,
                None => continue,
            };
            if !permanent {
                self.remove_npc(*npc, false);
            }
        }
        debug!(map = %self.settings.map, spawner = %spawner.name(), "Spawner removed");
        true
    }

    /// Put a freshly spawned NPC into the world. Returns the casts of its
    /// permanent definition effects, still to be applied.
    pub(crate) fn register_npc(&mut self, instance: NpcInstance) -> Vec<WorldCommand> {
        let NpcInstance { character, effects } = instance;
        let id = character.id();
        self.notify(Notification::broadcast(WorldEvent::CharacterAdded {
            character: character.core.view(),
        }));
        self.characters.insert(id, character);
        effects
            .into_iter()
            .map(|name| WorldCommand::Cast {
                target: id,
                request: CastRequest::new(name).permanent(),
            })
            .collect()
    }

    // =========================================================================
    // Players
    // =========================================================================

    /// Add a player from saved state.
    ///
    /// Saved effects are restored without re-checking their cast
    /// preconditions. A player saved dead without a death timer gets a
    /// fresh one. Returns `false` if the player is already here.
    pub fn admit_player(&mut self, state: &CharacterState) -> bool {
        if self.characters.contains_key(&state.id) {
            warn!(map = %self.settings.map, character_id = %state.id, "Player already in world");
            return false;
        }
        let queue = ActionQueue::new(self.settings.action_queue_length, self.settings.queue_overflow);
        let mut character = Character::from_state(state, queue);
        character.core.hunger_ticks = character.core.hunger_ticks.or(Some(self.settings.hunger_ticks));
        let id = character.id();
        let view = character.core.view();
        self.characters.insert(id, character);

        let roster = self.roster();
        if let Some((errors, outbox)) = self.run_effects(&roster, id, |catalog, c, env| {
            restore_effects(catalog, &state.effects, c, env)
        }) {
            for error in errors {
                warn!(map = %self.settings.map, character_id = %id, error = %error, "Saved effect skipped");
            }
            self.absorb(&roster, outbox);
        }

        self.notify(Notification::broadcast(WorldEvent::CharacterAdded { character: view }));
        info!(map = %self.settings.map, character_id = %id, name = %state.name, "Player joined");
        self.reap();
        true
    }

    /// Remove a player, dismissing their pets and submitting a final save.
    /// Returns the state that was saved.
    pub fn depart_player(&mut self, id: CharacterId) -> Option<CharacterState> {
        if !self.characters.get(&id)?.core.is_player() {
            return None;
        }
        self.dismiss_pets(id);
        let character = self.characters.remove(&id)?;
        let state = character.to_state(&self.settings.map);
        self.persistence
            .submit(PersistRequest::SaveCharacter(Box::new(state.clone())));
        for other in self.characters.values_mut() {
            other.core.aggro.remove(&id);
        }
        self.notify(Notification::broadcast(WorldEvent::CharacterRemoved { id }));
        self.reap();
        info!(map = %self.settings.map, character_id = %id, name = %state.name, "Player left");
        Some(state)
    }

    /// Queue a command line for a player. Returns whether it was queued.
    pub fn enqueue_command(&mut self, id: CharacterId, line: &str) -> bool {
        let Some(character) = self.characters.get_mut(&id) else {
            debug!(map = %self.settings.map, character_id = %id, "Command for unknown character");
            return false;
        };
        if !character.core.is_player() {
            return false;
        }
        let queued = character.actions.push(line.to_owned());
        if !queued {
            self.tell(id, MessageKind::Refused, "You are doing too much already.");
        }
        queued
    }

    /// Apply one inbound message.
    pub fn handle_input(&mut self, input: WorldInput) {
        match input {
            WorldInput::Admit(state) => {
                self.admit_player(&state);
            }
            WorldInput::Depart { character } => {
                self.depart_player(character);
            }
            WorldInput::Command { character, line } => {
                self.enqueue_command(character, &line);
            }
        }
    }

    // =========================================================================
    // Effects
    // =========================================================================

    /// Cast an effect on `target`, applying whatever it triggers.
    ///
    /// A missing target is ignored and reported as
    /// [`ApplyOutcome::Refused`].
    ///
    /// # Errors
    ///
    /// Returns a [`CharacterError`] for an unknown effect name or a failed
    /// start hook.
    pub fn cast_on(
        &mut self,
        target: CharacterId,
        request: &CastRequest,
    ) -> Result<ApplyOutcome, CharacterError> {
        let roster = self.roster();
        let caster = self.caster_snapshot(request);
        let Some((result, outbox)) = self.run_effects(&roster, target, |catalog, c, env| {
            cast(catalog, request, caster.as_ref(), c, env)
        }) else {
            return Ok(ApplyOutcome::Refused);
        };
        self.absorb(&roster, outbox);
        result
    }

    /// End one effect on `target`. Unapplying something already gone is a
    /// no-op returning `false`.
    pub fn unapply_effect(&mut self, target: CharacterId, effect: EffectId, reason: EndReason) -> bool {
        let roster = self.roster();
        let Some((ended, outbox)) = self.run_effects(&roster, target, |_, c, env| {
            c.effects.unapply(effect, &mut c.core, env, reason)
        }) else {
            return false;
        };
        self.absorb(&roster, outbox);
        ended
    }

    fn caster_snapshot(&self, request: &CastRequest) -> Option<CombatantSnapshot> {
        request
            .caster
            .and_then(|id| self.characters.get(&id))
            .map(|c| c.core.snapshot())
    }

    /// Run `step` on one character with a fresh effect environment.
    /// Returns its result and the outbox it filled, or `None` if the
    /// character is gone.
    pub(crate) fn run_effects<T>(
        &mut self,
        roster: &Roster,
        id: CharacterId,
        step: impl FnOnce(&EffectCatalog, &mut Character, &mut EffectEnv<'_>) -> T,
    ) -> Option<(T, Outbox)> {
        let tick = self.clock.tick();
        let combat_ticks = self.settings.combat_ticks;
        let catalog = Arc::clone(&self.catalog);
        let character = self.characters.get_mut(&id)?;
        let mut env = EffectEnv::new(tick, roster, &mut self.rng, combat_ticks);
        let result = step(catalog.as_ref(), character, &mut env);
        Some((result, std::mem::take(&mut env.outbox)))
    }

    /// Queue an outbox's notifications and apply its commands.
    pub(crate) fn absorb(&mut self, roster: &Roster, mut outbox: Outbox) {
        self.pending.extend(outbox.take_notifications());
        self.apply_commands(roster, outbox.take_commands());
    }

    /// Apply commands, then whatever they trigger, for at most
    /// [`MAX_COMMAND_ROUNDS`] rounds.
    pub(crate) fn apply_commands(&mut self, roster: &Roster, commands: Vec<WorldCommand>) {
        let mut queue = commands;
        for _ in 0..MAX_COMMAND_ROUNDS {
            if queue.is_empty() {
                return;
            }
            let mut next = Vec::new();
            for command in queue {
                next.extend(self.apply_command(roster, command));
            }
            queue = next;
        }
        if !queue.is_empty() {
            warn!(
                map = %self.settings.map,
                dropped = queue.len(),
                "World command chain too deep, remaining commands dropped"
            );
        }
    }

    fn apply_command(&mut self, roster: &Roster, command: WorldCommand) -> Vec<WorldCommand> {
        match command {
            WorldCommand::Cast { target, request } => {
                let caster = self.caster_snapshot(&request);
                let Some((result, mut outbox)) = self.run_effects(roster, target, |catalog, c, env| {
                    cast(catalog, &request, caster.as_ref(), c, env)
                }) else {
                    debug!(character_id = %target, effect = %request.name, "Cast target gone");
                    return Vec::new();
                };
                if let Err(e) = result {
                    warn!(character_id = %target, effect = %request.name, error = %e, "Cast failed");
                }
                self.pending.extend(outbox.take_notifications());
                outbox.take_commands()
            }
            WorldCommand::MarkInCombat { character } => {
                if let Some(c) = self.characters.get_mut(&character) {
                    c.core.engage(self.settings.combat_ticks);
                }
                Vec::new()
            }
            WorldCommand::AddAggro { holder, toward, amount } => {
                if let Some(c) = self.characters.get_mut(&holder) {
                    c.core.add_aggro(toward, amount);
                }
                Vec::new()
            }
            WorldCommand::Summon { owner, npc, potency } => self.summon_pet(owner, &npc, potency),
            WorldCommand::DismissPets { owner } => {
                self.dismiss_pets(owner);
                Vec::new()
            }
            WorldCommand::Dispel { target, effect } => {
                let Some((_, mut outbox)) = self.run_effects(roster, target, |_, c, env| {
                    c.effects.unapply_named(&effect, &mut c.core, env, EndReason::Removed)
                }) else {
                    return Vec::new();
                };
                self.pending.extend(outbox.take_notifications());
                outbox.take_commands()
            }
        }
    }

    /// Create a one-shot spawner next to `owner` and spawn their pet from
    /// it. Returns the casts binding pet and owner together.
    fn summon_pet(&mut self, owner: CharacterId, npc: &str, potency: u32) -> Vec<WorldCommand> {
        let anchor = match self.characters.get(&owner) {
            Some(master) if master.core.pets.is_empty() && !master.core.is_dead() => {
                master.core.position
            }
            _ => return Vec::new(),
        };
        let mut spawner = match Spawner::for_pet(owner, anchor, npc) {
            Ok(s) => s,
            Err(e) => {
                warn!(character_id = %owner, npc = %npc, error = %e, "Pet spawner rejected");
                return Vec::new();
            }
        };
        let ctx = SpawnContext {
            content: self.content.as_ref(),
            geometry: self.geometry.as_ref(),
            player_near: true,
            alternate: false,
        };
        let spawned = match spawner.tick(&ctx, &mut self.rng) {
            Ok(spawned) => spawned,
            Err(e) => {
                warn!(character_id = %owner, npc = %npc, error = %e, "Pet spawn failed");
                return Vec::new();
            }
        };
        self.spawners.insert(spawner.id(), spawner);

        let mut commands = Vec::new();
        for instance in spawned {
            let pet = instance.character.id();
            if let Some(master) = self.characters.get_mut(&owner) {
                master.core.pets.push(pet);
            }
            commands.extend(self.register_npc(instance));
            commands.push(WorldCommand::Cast {
                target: pet,
                request: CastRequest::new(SUMMONED_PET.name).permanent().caster(owner),
            });
            commands.push(WorldCommand::Cast {
                target: owner,
                request: CastRequest::new(ActivePet::NAME)
                    .potency(potency.max(1))
                    .caster(owner),
            });
            info!(character_id = %owner, pet_id = %pet, npc = %npc, "Pet summoned");
        }
        commands
    }

    /// Kill every pet of `owner`. The reaper removes them.
    fn dismiss_pets(&mut self, owner: CharacterId) {
        let pets = self
            .characters
            .get_mut(&owner)
            .map(|c| std::mem::take(&mut c.core.pets))
            .unwrap_or_default();
        for pet in pets {
            if let Some(p) = self.characters.get_mut(&pet) {
                p.core.mark_dead();
            }
        }
    }

    // =========================================================================
    // Death
    // =========================================================================

    /// Settle every death since the last call. Dead players lose their
    /// effects and start a death timer; dead NPCs leave the world. Spent
    /// one-shot spawners are removed. Returns the number of deaths.
    pub(crate) fn reap(&mut self) -> usize {
        let fallen: Vec<CharacterId> = self
            .characters
            .values()
            .filter(|c| c.core.is_player() && c.core.is_dead() && !c.effects.contains(Dead::NAME))
            .map(Character::id)
            .collect();
        if !fallen.is_empty() {
            let roster = self.roster();
            for id in &fallen {
                self.player_death(&roster, *id);
            }
        }

        let dead_npcs: Vec<CharacterId> = self
            .characters
            .values()
            .filter(|c| !c.core.is_player() && c.core.is_dead())
            .map(Character::id)
            .collect();
        for id in &dead_npcs {
            self.remove_npc(*id, true);
        }

        let forgotten: BTreeSet<CharacterId> = fallen.iter().chain(&dead_npcs).copied().collect();
        if !forgotten.is_empty() {
            for c in self.characters.values_mut() {
                c.core.aggro.retain(|id, _| !forgotten.contains(id));
            }
        }

        let spent: Vec<SpawnerId> = self
            .spawners
            .values()
            .filter(|s| s.should_remove())
            .map(Spawner::id)
            .collect();
        for id in spent {
            self.remove_spawner(id);
        }

        fallen.len().saturating_add(dead_npcs.len())
    }

    fn player_death(&mut self, roster: &Roster, id: CharacterId) {
        let death_ticks = self.settings.death_ticks;
        let Some((result, outbox)) = self.run_effects(roster, id, |catalog, c, env| {
            c.effects.unapply_all(&mut c.core, env, EndReason::Death);
            c.actions.clear();
            c.core.aggro.clear();
            c.core.combat_ticks = 0;
            cast(catalog, &CastRequest::new(Dead::NAME).ticks(death_ticks), None, c, env)
        }) else {
            return;
        };
        if let Err(e) = result {
            warn!(map = %self.settings.map, character_id = %id, error = %e, "Death timer failed");
        }
        self.absorb(roster, outbox);
        let name = self
            .characters
            .get(&id)
            .map(|c| c.core.name.clone())
            .unwrap_or_default();
        info!(map = %self.settings.map, character_id = %id, name = %name, "Player died");
        self.notify(Notification::broadcast(WorldEvent::CharacterDied { id, name }));
    }

    fn remove_npc(&mut self, id: CharacterId, died: bool) {
        let Some(npc) = self.characters.remove(&id) else {
            return;
        };
        if let Some(spawner) = npc.core.spawner.and_then(|s| self.spawners.get_mut(&s)) {
            spawner.remove_npc(id);
        }
        if let Some(master) = npc.core.owner.and_then(|o| self.characters.get_mut(&o)) {
            master.core.pets.retain(|p| *p != id);
        }
        if died {
            debug!(map = %self.settings.map, character_id = %id, name = %npc.core.name, "NPC died");
            self.notify(Notification::broadcast(WorldEvent::CharacterDied {
                id,
                name: npc.core.name.clone(),
            }));
        }
        self.notify(Notification::broadcast(WorldEvent::CharacterRemoved { id }));
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Submit a save of every player. Returns how many were accepted.
    pub fn persist_all(&mut self) -> usize {
        let map = self.settings.map.clone();
        let accepted = self
            .characters
            .values()
            .filter(|c| c.core.is_player())
            .filter(|c| {
                self.persistence
                    .submit(PersistRequest::SaveCharacter(Box::new(c.to_state(&map))))
            })
            .count();
        debug!(map = %map, saved = accepted, "Players submitted for saving");
        accepted
    }

    /// Resume saved boss timers. Returns how many spawners matched.
    pub fn restore_spawner_timers(&mut self, records: &[SpawnerTimerRecord], now_ms: i64) -> usize {
        let period = self.settings.tick_period_ms;
        let mut restored: usize = 0;
        for spawner in self.spawners.values_mut() {
            if let Some(record) = records.iter().find(|r| spawner.matches_record(r)) {
                spawner.restore_timer(record, now_ms, period);
                restored = restored.saturating_add(1);
                info!(
                    map = %self.settings.map,
                    spawner = %spawner.name(),
                    current_tick = spawner.current_tick(),
                    "Spawner timer restored"
                );
            }
        }
        restored
    }

    /// Save boss timers and every player, then deliver pending
    /// notifications.
    ///
    /// Unlike the periodic saves, these writes wait for room in the
    /// persistence channel. The timer list is written even when empty, so
    /// a boss that was alive at shutdown does not inherit an older record.
    pub async fn shutdown(&mut self, now_ms: i64) -> ShutdownReport {
        let map = self.settings.map.clone();
        let records: Vec<SpawnerTimerRecord> = self
            .spawners
            .values()
            .filter_map(|s| s.timer_record(now_ms))
            .collect();
        let timer_count = records.len();
        let timers_delivered = self
            .persistence
            .send(PersistRequest::SaveSpawnerTimers {
                map: map.clone(),
                records,
            })
            .await;
        let timers_saved = if timers_delivered { timer_count } else { 0 };

        let players: Vec<CharacterState> = self
            .characters
            .values()
            .filter(|c| c.core.is_player())
            .map(|c| c.to_state(&map))
            .collect();
        let mut players_saved: usize = 0;
        for state in players {
            if self.persistence.send(PersistRequest::SaveCharacter(Box::new(state))).await {
                players_saved = players_saved.saturating_add(1);
            }
        }

        self.flush_notifications();
        if !timers_delivered {
            warn!(map = %map, timers = timer_count, "Persistence gone before boss timers were saved");
        }
        info!(map = %map, players_saved, timers_saved, "World shut down");
        ShutdownReport {
            players_saved,
            timers_saved,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rair_characters::effects::damage_over_time::POISON;
    use rair_types::Stat;

    use super::*;
    use crate::notify::RecordingSink;
    use crate::spawner::NpcChoice;

    fn world() -> World {
        World::new(WorldSettings::for_map("test"), WorldServices::standalone()).unwrap()
    }

    fn hero(name: &str) -> CharacterState {
        let mut state = CharacterState::fresh(CharacterId::new(), name, 50);
        state.stats.insert(Stat::Mp, 20);
        state.mp = 20;
        state
    }

    #[test]
    fn admitted_player_gets_hunger_and_a_queue() {
        let mut w = world();
        let state = hero("Ayla");
        assert!(w.admit_player(&state));
        assert!(!w.admit_player(&state));
        let c = w.character(state.id).unwrap();
        assert_eq!(c.core.hunger_ticks, Some(w.settings().hunger_ticks));
        assert_eq!(w.player_count(), 1);
    }

    #[test]
    fn saved_effects_come_back_on_admit() {
        let mut w = world();
        let state = hero("Ayla");
        w.admit_player(&state);
        w.cast_on(state.id, &CastRequest::new(POISON.name).potency(2)).unwrap();
        let saved = w.depart_player(state.id).unwrap();
        assert_eq!(saved.effects.len(), 1);

        w.admit_player(&saved);
        assert!(w.character(state.id).unwrap().effects.contains(POISON.name));
    }

    #[test]
    fn player_saved_dead_gets_a_death_timer() {
        let mut w = world();
        let mut state = hero("Ghost");
        state.hp = 0;
        w.admit_player(&state);
        let c = w.character(state.id).unwrap();
        assert!(c.core.is_dead());
        assert!(c.effects.contains(Dead::NAME));
        assert!(!c.can_act());
    }

    #[test]
    fn unapplying_twice_is_a_no_op() {
        let mut w = world();
        let state = hero("Ayla");
        w.admit_player(&state);
        let id = w
            .cast_on(state.id, &CastRequest::new(POISON.name))
            .unwrap()
            .effect_id()
            .unwrap();
        assert!(w.unapply_effect(state.id, id, EndReason::Removed));
        assert!(!w.unapply_effect(state.id, id, EndReason::Removed));
    }

    #[test]
    fn summoning_links_pet_and_owner() {
        let mut w = world();
        let state = hero("Mage");
        w.admit_player(&state);
        let roster = w.roster();
        w.apply_commands(
            &roster,
            vec![WorldCommand::Summon {
                owner: state.id,
                npc: crate::content::FAMILIAR.to_owned(),
                potency: 2,
            }],
        );

        let owner = w.character(state.id).unwrap();
        assert_eq!(owner.core.pets.len(), 1);
        assert!(owner.effects.contains(ActivePet::NAME));
        let pet_id = *owner.core.pets.first().unwrap();
        let pet = w.character(pet_id).unwrap();
        assert_eq!(pet.core.owner, Some(state.id));
        assert!(pet.core.permanent);
        assert!(pet.effects.contains(SUMMONED_PET.name));
        assert_eq!(w.spawners().count(), 1);
    }

    #[test]
    fn departing_owner_takes_pets_and_spawner_along() {
        let mut w = world();
        let state = hero("Mage");
        w.admit_player(&state);
        let roster = w.roster();
        w.apply_commands(
            &roster,
            vec![WorldCommand::Summon {
                owner: state.id,
                npc: crate::content::FAMILIAR.to_owned(),
                potency: 1,
            }],
        );
        assert_eq!(w.npc_count(), 1);

        w.depart_player(state.id).unwrap();
        assert_eq!(w.npc_count(), 0);
        assert_eq!(w.spawners().count(), 0);
    }

    #[test]
    fn removing_a_spawner_keeps_permanent_npcs() {
        let mut w = world();
        let mut config = SpawnerConfig::default();
        config.npcs = vec![NpcChoice::new(crate::content::FAMILIAR)];
        config.initial_spawn = 2;
        let sid = w.add_spawner("den", Position::new(0, 0), config).unwrap();

        let ctx_spawned = {
            let spawner = w.spawners.get_mut(&sid).unwrap();
            let ctx = SpawnContext {
                content: w.content.as_ref(),
                geometry: w.geometry.as_ref(),
                player_near: true,
                alternate: false,
            };
            spawner.tick(&ctx, &mut w.rng).unwrap()
        };
        let ids: Vec<CharacterId> = ctx_spawned.iter().map(|i| i.character.id()).collect();
        for instance in ctx_spawned {
            w.register_npc(instance);
        }
        let kept = *ids.first().unwrap();
        w.character_mut(kept).unwrap().core.permanent = true;

        assert!(w.remove_spawner(sid));
        assert_eq!(w.npc_count(), 1);
        assert_eq!(w.character(kept).unwrap().core.spawner, None);
        assert!(!w.remove_spawner(sid));
    }

    #[tokio::test]
    async fn shutdown_flushes_notifications() {
        let recorder = RecordingSink::new();
        let mut services = WorldServices::standalone();
        services.sink = Box::new(recorder.clone());
        let mut w = World::new(WorldSettings::for_map("test"), services).unwrap();
        w.admit_player(&hero("Ayla"));
        let report = w.shutdown(0).await;
        assert_eq!(report, ShutdownReport::default());
        assert!(!recorder.take().is_empty());
    }

    #[tokio::test]
    async fn shutdown_waits_for_room_behind_periodic_saves() {
        let (persistence, mut rx) = PersistenceHandle::channel(4);
        let services = WorldServices {
            persistence,
            ..WorldServices::standalone()
        };
        let mut w = World::new(WorldSettings::for_map("keep"), services).unwrap();
        for name in ["Ayla", "Bren", "Cato", "Dara"] {
            w.admit_player(&hero(name));
        }
        assert_eq!(w.persist_all(), 4);

        let drain = tokio::spawn(async move {
            let mut delivered = Vec::new();
            while let Some(request) = rx.recv().await {
                delivered.push(request);
            }
            delivered
        });
        let report = w.shutdown(0).await;
        drop(w);
        let delivered = drain.await.unwrap();

        assert_eq!(report.players_saved, 4);
        assert_eq!(delivered.len(), 9);
        assert!(delivered.iter().any(|r| matches!(
            r,
            PersistRequest::SaveSpawnerTimers { map, records } if map == "keep" && records.is_empty()
        )));
    }

    #[test]
    fn full_queue_refuses_with_a_message() {
        let mut settings = WorldSettings::for_map("test");
        settings.action_queue_length = 1;
        settings.queue_overflow = QueueOverflow::DropNewest;
        let mut w = World::new(settings, WorldServices::standalone()).unwrap();
        let state = hero("Ayla");
        w.admit_player(&state);
        assert!(w.enqueue_command(state.id, "move 1 0"));
        assert!(!w.enqueue_command(state.id, "move 1 0"));
        assert!(w.pending.iter().any(|n| n.is_for(state.id) && n.text().is_some()));
    }

    #[test]
    fn map_seeds_differ() {
        let config = RairConfig::default();
        let a = WorldSettings::from_config(&config, &MapConfig::named("a"));
        let b = WorldSettings::from_config(&config, &MapConfig::named("b"));
        assert_ne!(a.seed, b.seed);
    }
}
