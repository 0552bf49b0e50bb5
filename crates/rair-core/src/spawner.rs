//! Spawner / population controller.
//!
//! A [`Spawner`] owns a bounded population of NPCs tied to an anchor tile.
//! Each spawner tick may create one NPC (or the initial batch on the very
//! first tick); each character-action tick the spawner's AI step decides
//! what its living NPCs want to do. The world executes those intents, so a
//! spawner never mutates a character directly.
//!
//! # Respawn timing
//!
//! The respawn counter only advances while the population is below its
//! maximum, and resets to zero whenever the population is full. A spawn
//! happens once the counter reaches `respawn_rate`. A `respawn_rate` of
//! zero means the spawner never respawns.
//!
//! # Boss timers
//!
//! A spawner configured with `should_serialize` saves its counter when the
//! world shuts down while nothing it owns is alive. On restart the counter
//! is advanced by the number of whole ticks that elapsed in real time.

use std::collections::{BTreeMap, BTreeSet};

use rair_characters::Character;
use rair_characters::skills::Skill;
use rair_types::{CharacterId, Position, SpawnerId, SpawnerTimerRecord};
use rand::Rng;
use serde::Deserialize;
use tracing::debug;

use crate::content::{ContentCatalog, ContentError, NpcInstance};
use crate::geometry::Geometry;

/// Side of a square player-location bucket, in tiles.
pub const BUCKET_SIZE: i32 = 6;

/// Attempts at finding an open tile before falling back to the anchor.
const PLACEMENT_ATTEMPTS: u32 = 10;

/// Pets stay within this many tiles of their owner.
const PET_FOLLOW_DISTANCE: u32 = 2;

/// Aggressive NPCs notice players this close.
const AGGRO_RADIUS: u32 = 4;

/// Errors raised by a spawner step.
#[derive(Debug, thiserror::Error)]
pub enum SpawnerError {
    /// The spawner has nothing to spawn.
    #[error("spawner {name} has no npc ids with positive weight")]
    NoNpcs {
        /// Spawner name.
        name: String,
    },

    /// Content lookup failed.
    #[error("content error: {source}")]
    Content {
        /// The underlying content error.
        #[from]
        source: ContentError,
    },

    /// Every candidate tile, including the anchor, is a wall.
    #[error("spawner {name} found no open tile near its anchor")]
    NoSpawnTile {
        /// Spawner name.
        name: String,
    },
}

/// One candidate NPC with its relative weight.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NpcChoice {
    /// Content id.
    pub id: String,
    /// Relative chance. Zero never spawns.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl NpcChoice {
    /// A choice with weight one.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            weight: default_weight(),
        }
    }
}

/// Population settings for one spawner.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpawnerConfig {
    /// Weighted content ids.
    #[serde(default)]
    pub npcs: Vec<NpcChoice>,

    /// Population ceiling.
    #[serde(default = "default_max_creatures")]
    pub max_creatures: usize,

    /// Ticks below the ceiling between spawns. Zero never respawns.
    #[serde(default = "default_respawn_rate")]
    pub respawn_rate: u64,

    /// NPCs created on the first tick.
    #[serde(default = "default_initial_spawn")]
    pub initial_spawn: usize,

    /// NPCs appear within this many tiles of the anchor.
    #[serde(default = "default_spawn_radius")]
    pub spawn_radius: u32,

    /// Idle NPCs wander within this many tiles of the anchor.
    #[serde(default = "default_random_walk_radius")]
    pub random_walk_radius: u32,

    /// NPCs further than this from the anchor are pulled back.
    #[serde(default = "default_leash_radius")]
    pub leash_radius: u32,

    /// Every Nth spawn is elite. Zero disables elites.
    #[serde(default)]
    pub elite_tick_cap: u64,

    /// Save the respawn counter across restarts.
    #[serde(default)]
    pub should_serialize: bool,

    /// Remove the spawner once its population has spawned and died out.
    #[serde(default)]
    pub remove_when_empty: bool,

    /// Count respawn ticks at half rate when no player is nearby.
    #[serde(default)]
    pub slow_when_idle: bool,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            npcs: Vec::new(),
            max_creatures: default_max_creatures(),
            respawn_rate: default_respawn_rate(),
            initial_spawn: default_initial_spawn(),
            spawn_radius: default_spawn_radius(),
            random_walk_radius: default_random_walk_radius(),
            leash_radius: default_leash_radius(),
            elite_tick_cap: 0,
            should_serialize: false,
            remove_when_empty: false,
            slow_when_idle: false,
        }
    }
}

/// World state a population step reads.
pub struct SpawnContext<'a> {
    /// NPC definitions.
    pub content: &'a ContentCatalog,
    /// Map queries.
    pub geometry: &'a dyn Geometry,
    /// Whether a player is near the anchor.
    pub player_near: bool,
    /// Half-rate cadence flag from the clock.
    pub alternate: bool,
}

/// World state an AI step reads.
pub struct AiContext<'a> {
    /// Map queries.
    pub geometry: &'a dyn Geometry,
    /// Buckets holding at least one living player.
    pub player_buckets: &'a BTreeSet<(i32, i32)>,
    /// Half-rate cadence flag from the clock.
    pub alternate: bool,
}

/// Something an NPC wants to do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpcAction {
    /// Step back toward the anchor and forget all threat.
    Leash {
        /// Destination tile.
        to: Position,
    },
    /// Step to an adjacent tile.
    Move {
        /// Destination tile.
        to: Position,
    },
    /// Use a skill on a target.
    Attack {
        /// Target.
        target: CharacterId,
        /// Skill to use.
        skill: Skill,
    },
}

/// An NPC's chosen action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NpcIntent {
    /// Acting NPC.
    pub npc: CharacterId,
    /// What it wants to do.
    pub action: NpcAction,
}

/// Bucket holding `pos`.
pub const fn bucket_of(pos: Position) -> (i32, i32) {
    (pos.x.div_euclid(BUCKET_SIZE), pos.y.div_euclid(BUCKET_SIZE))
}

/// Whether `pos` lies in or next to an occupied bucket.
pub fn near_players(pos: Position, buckets: &BTreeSet<(i32, i32)>) -> bool {
    let (bx, by) = bucket_of(pos);
    (-1..=1).any(|dx: i32| {
        (-1..=1).any(|dy: i32| buckets.contains(&(bx.saturating_add(dx), by.saturating_add(dy))))
    })
}

/// A bounded NPC population tied to an anchor tile.
#[derive(Debug, Clone)]
pub struct Spawner {
    id: SpawnerId,
    name: String,
    anchor: Position,
    config: SpawnerConfig,
    current_tick: u64,
    spawned_total: u64,
    initial_done: bool,
    alive: Vec<CharacterId>,
    owner: Option<CharacterId>,
    faults: u32,
    disabled: bool,
}

impl Spawner {
    /// A spawner that has not ticked yet.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnerError::NoNpcs`] if no content id has a positive
    /// weight.
    pub fn new(
        name: impl Into<String>,
        anchor: Position,
        config: SpawnerConfig,
    ) -> Result<Self, SpawnerError> {
        let name = name.into();
        if config.npcs.iter().all(|c| c.weight == 0) {
            return Err(SpawnerError::NoNpcs { name });
        }
        Ok(Self {
            id: SpawnerId::new(),
            name,
            anchor,
            config,
            current_tick: 0,
            spawned_total: 0,
            initial_done: false,
            alive: Vec::new(),
            owner: None,
            faults: 0,
            disabled: false,
        })
    }

    /// A one-shot spawner holding a single pet for `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnerError::NoNpcs`] for an empty `npc`.
    pub fn for_pet(owner: CharacterId, anchor: Position, npc: &str) -> Result<Self, SpawnerError> {
        let config = SpawnerConfig {
            npcs: vec![NpcChoice::new(npc)],
            max_creatures: 1,
            respawn_rate: 0,
            initial_spawn: 1,
            spawn_radius: 1,
            random_walk_radius: 0,
            leash_radius: 0,
            elite_tick_cap: 0,
            should_serialize: false,
            remove_when_empty: true,
            slow_when_idle: false,
        };
        if npc.is_empty() {
            return Err(SpawnerError::NoNpcs {
                name: format!("pet of {owner}"),
            });
        }
        let mut spawner = Self::new(format!("pet of {owner}"), anchor, config)?;
        spawner.owner = Some(owner);
        Ok(spawner)
    }

    /// Spawner id.
    pub const fn id(&self) -> SpawnerId {
        self.id
    }

    /// Label for logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Anchor tile.
    pub const fn anchor(&self) -> Position {
        self.anchor
    }

    /// Population settings.
    pub const fn config(&self) -> &SpawnerConfig {
        &self.config
    }

    /// Respawn counter.
    pub const fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// NPCs created so far.
    pub const fn spawned_total(&self) -> u64 {
        self.spawned_total
    }

    /// Living NPCs owned by this spawner.
    pub fn alive(&self) -> &[CharacterId] {
        &self.alive
    }

    /// Pet master, for pet spawners.
    pub const fn owner(&self) -> Option<CharacterId> {
        self.owner
    }

    /// Whether repeated failures have stopped this spawner.
    pub const fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Consecutive failed steps.
    pub const fn faults(&self) -> u32 {
        self.faults
    }

    /// Population maintenance step.
    ///
    /// Returns the NPCs created this tick. They are already counted as
    /// alive; the caller must add them to the world.
    ///
    /// # Errors
    ///
    /// Returns a [`SpawnerError`] if content lookup or placement fails.
    /// A failed initial batch is discarded whole and retried next tick.
    pub fn tick<R: Rng + ?Sized>(
        &mut self,
        ctx: &SpawnContext<'_>,
        rng: &mut R,
    ) -> Result<Vec<NpcInstance>, SpawnerError> {
        let mut spawned = Vec::new();
        if self.disabled {
            return Ok(spawned);
        }

        if !self.initial_done {
            let room = self.config.max_creatures.saturating_sub(self.alive.len());
            for _ in 0..self.config.initial_spawn.min(room) {
                match self.spawn_one(ctx, rng) {
                    Ok(instance) => spawned.push(instance),
                    Err(e) => {
                        self.alive
                            .retain(|id| !spawned.iter().any(|s| s.character.id() == *id));
                        return Err(e);
                    }
                }
            }
            self.initial_done = true;
            return Ok(spawned);
        }

        if self.alive.len() >= self.config.max_creatures {
            self.current_tick = 0;
            return Ok(spawned);
        }
        if self.config.respawn_rate == 0 {
            return Ok(spawned);
        }

        let slowed = self.config.slow_when_idle && !ctx.player_near && !ctx.alternate;
        if !slowed {
            self.current_tick = self.current_tick.saturating_add(1);
        }
        if self.current_tick >= self.config.respawn_rate {
            self.current_tick = 0;
            spawned.push(self.spawn_one(ctx, rng)?);
        }
        Ok(spawned)
    }

    fn spawn_one<R: Rng + ?Sized>(
        &mut self,
        ctx: &SpawnContext<'_>,
        rng: &mut R,
    ) -> Result<NpcInstance, SpawnerError> {
        let npc = self.pick_npc(rng)?.to_owned();
        let ordinal = self.spawned_total.saturating_add(1);
        let elite = self.config.elite_tick_cap > 0
            && ordinal.checked_rem(self.config.elite_tick_cap) == Some(0);

        let mut instance = ctx.content.instantiate(&npc, elite)?;
        let position = self.placement(ctx.geometry, rng)?;
        let core = &mut instance.character.core;
        core.position = position;
        core.spawner = Some(self.id);
        core.owner = self.owner;
        core.permanent = self.owner.is_some();

        self.alive.push(core.id);
        self.spawned_total = ordinal;
        debug!(
            spawner = %self.name,
            npc = %npc,
            character_id = %core.id,
            elite,
            "NPC spawned"
        );
        Ok(instance)
    }

    fn pick_npc<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&str, SpawnerError> {
        let total = self
            .config
            .npcs
            .iter()
            .fold(0_u32, |acc, c| acc.saturating_add(c.weight));
        if total == 0 {
            return Err(SpawnerError::NoNpcs {
                name: self.name.clone(),
            });
        }
        let mut roll = rng.random_range(0..total);
        for choice in &self.config.npcs {
            if roll < choice.weight {
                return Ok(&choice.id);
            }
            roll = roll.saturating_sub(choice.weight);
        }
        Err(SpawnerError::NoNpcs {
            name: self.name.clone(),
        })
    }

    fn placement<R: Rng + ?Sized>(
        &self,
        geometry: &dyn Geometry,
        rng: &mut R,
    ) -> Result<Position, SpawnerError> {
        let radius = i32::try_from(self.config.spawn_radius).unwrap_or(i32::MAX);
        if radius > 0 {
            for _ in 0..PLACEMENT_ATTEMPTS {
                let dx = rng.random_range(radius.saturating_neg()..=radius);
                let dy = rng.random_range(radius.saturating_neg()..=radius);
                let candidate = self.anchor.offset(dx, dy);
                if !geometry.is_wall(candidate) {
                    return Ok(candidate);
                }
            }
        }
        if geometry.is_wall(self.anchor) {
            return Err(SpawnerError::NoSpawnTile {
                name: self.name.clone(),
            });
        }
        Ok(self.anchor)
    }

    /// AI step: one intent per living NPC that wants to act.
    ///
    /// NPCs beyond the leash radius walk home. Other NPCs only think when
    /// a player is in or next to their bucket; they attack their most
    /// hated visible target in reach, chase it when out of reach, and
    /// otherwise wander near the anchor on alternate ticks. Pets follow
    /// their owner and fight whatever their owner is fighting.
    pub fn npc_tick<R: Rng + ?Sized>(
        &self,
        characters: &BTreeMap<CharacterId, Character>,
        ctx: &AiContext<'_>,
        rng: &mut R,
    ) -> Vec<NpcIntent> {
        if self.disabled {
            return Vec::new();
        }
        let mut intents = Vec::new();
        for id in &self.alive {
            let Some(npc) = characters.get(id) else {
                continue;
            };
            if !npc.can_act() {
                continue;
            }
            let action = match self.owner {
                Some(owner) => Self::pet_action(npc, owner, characters, ctx),
                None => self.wild_action(npc, characters, ctx, rng),
            };
            if let Some(action) = action {
                intents.push(NpcIntent { npc: *id, action });
            }
        }
        intents
    }

    fn wild_action<R: Rng + ?Sized>(
        &self,
        npc: &Character,
        characters: &BTreeMap<CharacterId, Character>,
        ctx: &AiContext<'_>,
        rng: &mut R,
    ) -> Option<NpcAction> {
        let pos = npc.core.position;
        if self.config.leash_radius > 0
            && ctx.geometry.distance(pos, self.anchor) > self.config.leash_radius
        {
            return Some(NpcAction::Leash {
                to: pos.step_toward(&self.anchor),
            });
        }
        if !near_players(pos, ctx.player_buckets) {
            return None;
        }

        let target = npc
            .core
            .highest_aggro()
            .or_else(|| aggressive_target(npc, characters, ctx));
        if let Some(action) = target.and_then(|t| engage(npc, t, characters, ctx)) {
            return Some(action);
        }

        if !ctx.alternate || self.config.random_walk_radius == 0 || rng.random_range(0..4_u8) != 0 {
            return None;
        }
        let to = pos.offset(rng.random_range(-1..=1), rng.random_range(-1..=1));
        let in_range = ctx.geometry.distance(to, self.anchor) <= self.config.random_walk_radius;
        (to != pos && in_range && !ctx.geometry.is_wall(to)).then_some(NpcAction::Move { to })
    }

    fn pet_action(
        pet: &Character,
        owner: CharacterId,
        characters: &BTreeMap<CharacterId, Character>,
        ctx: &AiContext<'_>,
    ) -> Option<NpcAction> {
        let master = characters.get(&owner)?;
        let target = pet
            .core
            .highest_aggro()
            .or_else(|| master.core.highest_aggro());
        if let Some(action) = target.and_then(|t| engage(pet, t, characters, ctx)) {
            return Some(action);
        }
        let pos = pet.core.position;
        if ctx.geometry.distance(pos, master.core.position) > PET_FOLLOW_DISTANCE {
            let to = pos.step_toward(&master.core.position);
            if !ctx.geometry.is_wall(to) {
                return Some(NpcAction::Move { to });
            }
        }
        None
    }

    /// Forget a dead or removed NPC. Returns whether it was owned here.
    pub fn remove_npc(&mut self, id: CharacterId) -> bool {
        let before = self.alive.len();
        self.alive.retain(|a| *a != id);
        self.alive.len() != before
    }

    /// Whether a one-shot spawner has run its course.
    pub fn should_remove(&self) -> bool {
        self.config.remove_when_empty && self.initial_done && self.alive.is_empty()
    }

    /// Count a failed step. Returns `true` if this disabled the spawner.
    pub fn record_fault(&mut self, limit: u32) -> bool {
        self.faults = self.faults.saturating_add(1);
        if !self.disabled && self.faults >= limit {
            self.disabled = true;
            return true;
        }
        false
    }

    /// Reset the consecutive failure count.
    pub const fn record_success(&mut self) {
        self.faults = 0;
    }

    /// Boss-timer record, if this spawner should save one now.
    pub fn timer_record(&self, now_ms: i64) -> Option<SpawnerTimerRecord> {
        (self.config.should_serialize && self.current_tick > 0 && self.alive.is_empty()).then_some(
            SpawnerTimerRecord {
                x: self.anchor.x,
                y: self.anchor.y,
                current_tick: self.current_tick,
                timestamp: now_ms,
            },
        )
    }

    /// Whether `record` belongs to this spawner.
    pub const fn matches_record(&self, record: &SpawnerTimerRecord) -> bool {
        self.config.should_serialize && self.anchor.x == record.x && self.anchor.y == record.y
    }

    /// Resume a saved boss timer.
    ///
    /// The counter advances by the whole ticks that elapsed between the
    /// save and `now_ms`. The initial batch is skipped: the encounter was
    /// already running before the restart.
    pub fn restore_timer(&mut self, record: &SpawnerTimerRecord, now_ms: i64, tick_period_ms: u64) {
        let elapsed = u64::try_from(now_ms.saturating_sub(record.timestamp)).unwrap_or(0);
        let ticks = elapsed.checked_div(tick_period_ms).unwrap_or(0);
        self.current_tick = record.current_tick.saturating_add(ticks);
        self.initial_done = true;
    }
}

/// Closest visible living player an aggressive NPC would pick a fight with.
fn aggressive_target(
    npc: &Character,
    characters: &BTreeMap<CharacterId, Character>,
    ctx: &AiContext<'_>,
) -> Option<CharacterId> {
    if npc.core.trait_level("Aggressive") == 0 {
        return None;
    }
    let pos = npc.core.position;
    characters
        .values()
        .filter(|c| c.core.is_player() && !c.core.is_dead())
        .filter(|c| ctx.geometry.distance(pos, c.core.position) <= AGGRO_RADIUS)
        .filter(|c| {
            let (dx, dy) = pos.delta_to(&c.core.position);
            ctx.geometry.can_see(pos, dx, dy)
        })
        .min_by_key(|c| (ctx.geometry.distance(pos, c.core.position), c.core.id))
        .map(|c| c.core.id)
}

/// Attack `target` if it is in reach, otherwise close in when it is visible.
fn engage(
    npc: &Character,
    target: CharacterId,
    characters: &BTreeMap<CharacterId, Character>,
    ctx: &AiContext<'_>,
) -> Option<NpcAction> {
    let victim = characters.get(&target).filter(|c| !c.core.is_dead())?;
    let pos = npc.core.position;
    let (dx, dy) = pos.delta_to(&victim.core.position);
    if !ctx.geometry.can_see(pos, dx, dy) {
        return None;
    }
    let skill = preferred_skill(npc);
    if ctx.geometry.distance(pos, victim.core.position) <= skill.range() {
        return Some(NpcAction::Attack { target, skill });
    }
    let to = pos.step_toward(&victim.core.position);
    (!ctx.geometry.is_wall(to)).then_some(NpcAction::Move { to })
}

fn preferred_skill(npc: &Character) -> Skill {
    let can_combust = npc.core.skill_level("combust") > 0
        && npc.core.mp().current() >= Skill::Combust.mana_cost();
    if can_combust { Skill::Combust } else { Skill::Attack }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_weight() -> u32 {
    1
}

const fn default_max_creatures() -> usize {
    3
}

const fn default_respawn_rate() -> u64 {
    60
}

const fn default_initial_spawn() -> usize {
    1
}

const fn default_spawn_radius() -> u32 {
    2
}

const fn default_random_walk_radius() -> u32 {
    5
}

const fn default_leash_radius() -> u32 {
    10
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rair_types::{CharacterKind, Stat};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use rair_characters::CharacterCore;

    use super::*;
    use crate::geometry::{OpenField, WallGrid};

    fn rats(max_creatures: usize, initial_spawn: usize, respawn_rate: u64) -> SpawnerConfig {
        SpawnerConfig {
            npcs: vec![NpcChoice::new("familiar")],
            max_creatures,
            initial_spawn,
            respawn_rate,
            ..SpawnerConfig::default()
        }
    }

    fn spawn_ctx<'a>(content: &'a ContentCatalog, geometry: &'a dyn Geometry) -> SpawnContext<'a> {
        SpawnContext {
            content,
            geometry,
            player_near: true,
            alternate: false,
        }
    }

    #[test]
    fn empty_npc_list_is_rejected() {
        let err = Spawner::new("nothing", Position::new(0, 0), SpawnerConfig::default());
        assert!(matches!(err, Err(SpawnerError::NoNpcs { .. })));
    }

    #[test]
    fn initial_then_respawn_rate() {
        let content = ContentCatalog::default();
        let geometry = OpenField::new(8);
        let ctx = spawn_ctx(&content, &geometry);
        let mut rng = StdRng::seed_from_u64(1);
        let mut s = Spawner::new("rats", Position::new(10, 10), rats(3, 1, 5)).unwrap();

        assert_eq!(s.tick(&ctx, &mut rng).unwrap().len(), 1);
        for _ in 0..4 {
            assert!(s.tick(&ctx, &mut rng).unwrap().is_empty());
        }
        assert_eq!(s.tick(&ctx, &mut rng).unwrap().len(), 1);
        assert_eq!(s.alive().len(), 2);
    }

    #[test]
    fn full_population_resets_the_counter() {
        let content = ContentCatalog::default();
        let geometry = OpenField::new(8);
        let ctx = spawn_ctx(&content, &geometry);
        let mut rng = StdRng::seed_from_u64(1);
        let mut s = Spawner::new("rats", Position::new(0, 0), rats(1, 1, 3)).unwrap();

        let first = s.tick(&ctx, &mut rng).unwrap();
        for _ in 0..10 {
            assert!(s.tick(&ctx, &mut rng).unwrap().is_empty());
        }
        assert_eq!(s.current_tick(), 0);

        let id = first.first().unwrap().character.id();
        assert!(s.remove_npc(id));
        assert!(!s.remove_npc(id));
        assert!(s.tick(&ctx, &mut rng).unwrap().is_empty());
        assert!(s.tick(&ctx, &mut rng).unwrap().is_empty());
        assert_eq!(s.tick(&ctx, &mut rng).unwrap().len(), 1);
    }

    #[test]
    fn population_never_exceeds_max() {
        let content = ContentCatalog::default();
        let geometry = OpenField::new(8);
        let ctx = spawn_ctx(&content, &geometry);
        let mut rng = StdRng::seed_from_u64(3);
        let mut s = Spawner::new("rats", Position::new(0, 0), rats(2, 5, 1)).unwrap();
        for _ in 0..20 {
            let _ = s.tick(&ctx, &mut rng).unwrap();
            assert!(s.alive().len() <= 2);
        }
    }

    #[test]
    fn every_nth_spawn_is_elite() {
        let content = ContentCatalog::default();
        let geometry = OpenField::new(8);
        let ctx = spawn_ctx(&content, &geometry);
        let mut rng = StdRng::seed_from_u64(5);
        let mut config = rats(5, 3, 1);
        config.elite_tick_cap = 3;
        let mut s = Spawner::new("rats", Position::new(0, 0), config).unwrap();
        let names: Vec<String> = s
            .tick(&ctx, &mut rng)
            .unwrap()
            .into_iter()
            .map(|n| n.character.core.name)
            .collect();
        assert_eq!(names, vec!["familiar", "familiar", "elite familiar"]);
    }

    #[test]
    fn slowed_spawner_counts_only_on_alternate_ticks() {
        let content = ContentCatalog::default();
        let geometry = OpenField::new(8);
        let mut rng = StdRng::seed_from_u64(1);
        let mut config = rats(3, 0, 10);
        config.slow_when_idle = true;
        let mut s = Spawner::new("rats", Position::new(0, 0), config).unwrap();
        let mut ctx = spawn_ctx(&content, &geometry);
        ctx.player_near = false;
        let _ = s.tick(&ctx, &mut rng).unwrap();
        for _ in 0..6 {
            ctx.alternate = !ctx.alternate;
            let _ = s.tick(&ctx, &mut rng).unwrap();
        }
        assert_eq!(s.current_tick(), 3);
    }

    #[test]
    fn weights_pick_only_positive_entries() {
        let content = ContentCatalog::default();
        let geometry = OpenField::new(8);
        let ctx = spawn_ctx(&content, &geometry);
        let mut rng = StdRng::seed_from_u64(8);
        let config = SpawnerConfig {
            npcs: vec![
                NpcChoice {
                    id: "ghost".to_owned(),
                    weight: 0,
                },
                NpcChoice::new("familiar"),
            ],
            max_creatures: 10,
            initial_spawn: 10,
            ..SpawnerConfig::default()
        };
        let mut s = Spawner::new("mixed", Position::new(0, 0), config).unwrap();
        assert_eq!(s.tick(&ctx, &mut rng).unwrap().len(), 10);
    }

    #[test]
    fn walled_anchor_without_radius_cannot_spawn() {
        let content = ContentCatalog::default();
        let geometry = WallGrid::new([Position::new(0, 0)], 8);
        let ctx = spawn_ctx(&content, &geometry);
        let mut rng = StdRng::seed_from_u64(1);
        let mut config = rats(1, 1, 1);
        config.spawn_radius = 0;
        let mut s = Spawner::new("boxed", Position::new(0, 0), config).unwrap();
        assert!(matches!(s.tick(&ctx, &mut rng), Err(SpawnerError::NoSpawnTile { .. })));
        assert!(s.alive().is_empty());
        assert!(s.tick(&ctx, &mut rng).is_err());
    }

    #[test]
    fn boss_timer_round_trip() {
        let mut config = rats(1, 1, 600);
        config.should_serialize = true;
        let mut s = Spawner::new("boss", Position::new(4, 9), config.clone()).unwrap();
        s.current_tick = 120;
        let record = s.timer_record(1_000_000).unwrap();
        assert_eq!(record.current_tick, 120);

        let mut resumed = Spawner::new("boss", Position::new(4, 9), config).unwrap();
        assert!(resumed.matches_record(&record));
        resumed.restore_timer(&record, 1_000_000 + 45_500, 1000);
        assert_eq!(resumed.current_tick(), 165);
    }

    #[test]
    fn no_timer_while_the_boss_lives() {
        let mut config = rats(1, 1, 600);
        config.should_serialize = true;
        let mut s = Spawner::new("boss", Position::new(0, 0), config).unwrap();
        s.current_tick = 5;
        s.alive.push(CharacterId::new());
        assert!(s.timer_record(0).is_none());
    }

    #[test]
    fn pet_spawner_is_one_shot() {
        let content = ContentCatalog::default();
        let geometry = OpenField::new(8);
        let ctx = spawn_ctx(&content, &geometry);
        let mut rng = StdRng::seed_from_u64(1);
        let owner = CharacterId::new();
        let mut s = Spawner::for_pet(owner, Position::new(0, 0), "familiar").unwrap();
        let pet = s.tick(&ctx, &mut rng).unwrap().pop().unwrap();
        assert_eq!(pet.character.core.owner, Some(owner));
        assert!(pet.character.core.permanent);
        assert!(!s.should_remove());
        s.remove_npc(pet.character.id());
        assert!(s.should_remove());
    }

    #[test]
    fn repeated_faults_disable_the_spawner() {
        let mut s = Spawner::new("rats", Position::new(0, 0), rats(1, 1, 1)).unwrap();
        assert!(!s.record_fault(2));
        assert!(s.record_fault(2));
        assert!(s.is_disabled());
        assert!(!s.record_fault(2));
    }

    fn placed(s: &mut Spawner, kind: CharacterKind, pos: Position) -> Character {
        let mut core = CharacterCore::new(CharacterId::new(), "c", kind, BTreeMap::from([(Stat::Hp, 10)]));
        core.position = pos;
        if kind == CharacterKind::Npc {
            s.alive.push(core.id);
        }
        Character::new(core)
    }

    #[test]
    fn leashed_npc_walks_home() {
        let mut s = Spawner::new("rats", Position::new(0, 0), rats(1, 1, 1)).unwrap();
        let npc = placed(&mut s, CharacterKind::Npc, Position::new(15, 0));
        let id = npc.id();
        let characters = BTreeMap::from([(id, npc)]);
        let buckets = BTreeSet::new();
        let geometry = OpenField::new(8);
        let ctx = AiContext {
            geometry: &geometry,
            player_buckets: &buckets,
            alternate: false,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let intents = s.npc_tick(&characters, &ctx, &mut rng);
        assert_eq!(
            intents,
            vec![NpcIntent {
                npc: id,
                action: NpcAction::Leash {
                    to: Position::new(14, 0)
                },
            }]
        );
    }

    #[test]
    fn npc_far_from_players_stays_idle() {
        let mut s = Spawner::new("rats", Position::new(0, 0), rats(1, 1, 1)).unwrap();
        let mut npc = placed(&mut s, CharacterKind::Npc, Position::new(1, 1));
        let player = placed(&mut s, CharacterKind::Player, Position::new(60, 60));
        npc.core.add_aggro(player.id(), 5);
        let characters = BTreeMap::from([(npc.id(), npc), (player.id(), player)]);
        let buckets = BTreeSet::from([bucket_of(Position::new(60, 60))]);
        let geometry = OpenField::new(8);
        let ctx = AiContext {
            geometry: &geometry,
            player_buckets: &buckets,
            alternate: true,
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert!(s.npc_tick(&characters, &ctx, &mut rng).is_empty());
    }

    #[test]
    fn npc_attacks_hated_target_in_reach_and_chases_otherwise() {
        let mut s = Spawner::new("rats", Position::new(0, 0), rats(1, 1, 1)).unwrap();
        let mut npc = placed(&mut s, CharacterKind::Npc, Position::new(0, 0));
        let player = placed(&mut s, CharacterKind::Player, Position::new(1, 1));
        let player_id = player.id();
        let npc_id = npc.id();
        npc.core.add_aggro(player_id, 5);
        let mut characters = BTreeMap::from([(npc_id, npc), (player_id, player)]);
        let buckets = BTreeSet::from([bucket_of(Position::new(1, 1))]);
        let geometry = OpenField::new(8);
        let ctx = AiContext {
            geometry: &geometry,
            player_buckets: &buckets,
            alternate: false,
        };
        let mut rng = StdRng::seed_from_u64(1);

        let intents = s.npc_tick(&characters, &ctx, &mut rng);
        assert_eq!(
            intents.first().map(|i| i.action),
            Some(NpcAction::Attack {
                target: player_id,
                skill: Skill::Attack
            })
        );

        characters.get_mut(&player_id).unwrap().core.position = Position::new(3, 0);
        let intents = s.npc_tick(&characters, &ctx, &mut rng);
        assert_eq!(
            intents.first().map(|i| i.action),
            Some(NpcAction::Move {
                to: Position::new(1, 0)
            })
        );
    }

    #[test]
    fn bucket_neighbors_count_as_near() {
        let buckets = BTreeSet::from([bucket_of(Position::new(0, 0))]);
        assert!(near_players(Position::new(11, -6), &buckets));
        assert!(!near_players(Position::new(12, 0), &buckets));
    }
}
