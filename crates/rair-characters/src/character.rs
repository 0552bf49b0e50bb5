//! Character runtime state.
//!
//! A [`Character`] is split into two halves so the effect registry can be
//! iterated while its owner is mutated: [`CharacterCore`] holds everything
//! except the effects, and [`EffectRegistry`] holds the effects. Registry
//! methods take `&mut CharacterCore` for the owner.
//!
//! Other characters are only ever seen through a [`CombatantSnapshot`],
//! an owned copy of the fields combat formulas read. Snapshots are looked
//! up by id in a [`Roster`] each time they are needed, so an effect never
//! holds a reference to its caster.

use std::collections::{BTreeMap, VecDeque};

use rair_types::{
    Alignment, CharacterId, CharacterKind, CharacterState, NpcView, Position, SpawnerId, Stat,
};
use serde::Deserialize;

use crate::effects::EffectRegistry;
use crate::pool::ResourcePool;
use crate::stats::StatBlock;

/// Snapshots of every character in a world, keyed by id.
pub type Roster = BTreeMap<CharacterId, CombatantSnapshot>;

/// Everything about a character except its effects.
#[derive(Debug, Clone)]
pub struct CharacterCore {
    /// Unique id.
    pub id: CharacterId,
    /// Display name.
    pub name: String,
    /// Player or NPC.
    pub kind: CharacterKind,
    /// Level.
    pub level: u32,
    /// Alignment.
    pub alignment: Alignment,
    /// Position on the map.
    pub position: Position,
    /// Ticks remaining in combat. Zero means out of combat.
    pub combat_ticks: u32,
    /// Hostility toward other characters.
    pub aggro: BTreeMap<CharacterId, i64>,
    /// Trait levels by name.
    pub traits: BTreeMap<String, u32>,
    /// Skill levels by name.
    pub skills: BTreeMap<String, u32>,
    /// Spawner that owns this NPC.
    pub spawner: Option<SpawnerId>,
    /// Master of a summoned pet.
    pub owner: Option<CharacterId>,
    /// Pets this character has summoned.
    pub pets: Vec<CharacterId>,
    /// Survives removal of its spawner.
    pub permanent: bool,
    /// Ticks until hunger sets in. `None` for characters that never starve.
    pub hunger_ticks: Option<u32>,
    stats: StatBlock,
    hp: ResourcePool,
    mp: ResourcePool,
    dead: bool,
}

impl CharacterCore {
    /// Create a character at full health and mana from base stats.
    pub fn new(
        id: CharacterId,
        name: impl Into<String>,
        kind: CharacterKind,
        base: BTreeMap<Stat, i64>,
    ) -> Self {
        let stats = StatBlock::from_base(base);
        let hp = ResourcePool::full(stats.get(Stat::Hp));
        let mp = ResourcePool::full(stats.get(Stat::Mp));
        Self {
            id,
            name: name.into(),
            kind,
            level: 1,
            alignment: Alignment::default(),
            position: Position::default(),
            combat_ticks: 0,
            aggro: BTreeMap::new(),
            traits: BTreeMap::new(),
            skills: BTreeMap::new(),
            spawner: None,
            owner: None,
            pets: Vec::new(),
            permanent: false,
            hunger_ticks: None,
            stats,
            hp,
            mp,
            dead: false,
        }
    }

    /// Effective stat value.
    pub fn stat(&self, stat: Stat) -> i64 {
        self.stats.get(stat)
    }

    /// Read access to the stat block.
    pub const fn stats(&self) -> &StatBlock {
        &self.stats
    }

    /// Overwrite a base stat. Resource maxima follow `Hp` and `Mp`.
    pub fn set_base_stat(&mut self, stat: Stat, value: i64) {
        self.stats.set_base(stat, value);
        self.sync_pool_maxima();
    }

    /// Shift a stat bonus. Used by the effect engine, which records every
    /// delta so it can be reversed exactly.
    pub fn adjust_bonus(&mut self, stat: Stat, delta: i64) {
        self.stats.adjust_bonus(stat, delta);
        if matches!(stat, Stat::Hp | Stat::Mp) {
            self.sync_pool_maxima();
        }
    }

    fn sync_pool_maxima(&mut self) {
        self.hp.set_maximum(self.stats.get(Stat::Hp));
        self.mp.set_maximum(self.stats.get(Stat::Mp));
    }

    /// Health pool.
    pub const fn hp(&self) -> &ResourcePool {
        &self.hp
    }

    /// Mana pool.
    pub const fn mp(&self) -> &ResourcePool {
        &self.mp
    }

    /// Remove health. Returns the amount removed.
    pub fn take_damage(&mut self, amount: i64) -> i64 {
        self.hp.drain(amount)
    }

    /// Restore health. Returns the amount restored.
    pub fn heal(&mut self, amount: i64) -> i64 {
        if self.dead {
            return 0;
        }
        self.hp.restore(amount)
    }

    /// Remove mana. Returns the amount removed.
    pub fn drain_mana(&mut self, amount: i64) -> i64 {
        self.mp.drain(amount)
    }

    /// Restore mana. Returns the amount restored.
    pub fn restore_mana(&mut self, amount: i64) -> i64 {
        self.mp.restore(amount)
    }

    /// Set current health and mana directly, clamped.
    pub fn set_pools(&mut self, hp: i64, mp: i64) {
        self.hp = ResourcePool::with_current(hp, self.stats.get(Stat::Hp));
        self.mp = ResourcePool::with_current(mp, self.stats.get(Stat::Mp));
    }

    /// Whether the character is dead.
    pub const fn is_dead(&self) -> bool {
        self.dead
    }

    /// Flag the character dead and empty its health.
    pub fn mark_dead(&mut self) {
        self.dead = true;
        let current = self.hp.current();
        self.hp.drain(current);
    }

    /// Bring the character back with full health and mana.
    pub const fn revive(&mut self) {
        self.dead = false;
        self.hp.refill();
        self.mp.refill();
    }

    /// Whether the character is a player.
    pub fn is_player(&self) -> bool {
        self.kind == CharacterKind::Player
    }

    /// Level of a named trait, zero when absent.
    pub fn trait_level(&self, name: &str) -> u32 {
        self.traits.get(name).copied().unwrap_or(0)
    }

    /// Level of a named skill, zero when absent.
    pub fn skill_level(&self, name: &str) -> u32 {
        self.skills.get(name).copied().unwrap_or(0)
    }

    /// Add threat toward `other`.
    pub fn add_aggro(&mut self, other: CharacterId, amount: i64) {
        if other == self.id || amount <= 0 {
            return;
        }
        let entry = self.aggro.entry(other).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// The character this one hates most, ties broken by id order.
    pub fn highest_aggro(&self) -> Option<CharacterId> {
        self.aggro
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(id, _)| *id)
    }

    /// Refresh the in-combat countdown.
    pub fn engage(&mut self, ticks: u32) {
        self.combat_ticks = self.combat_ticks.max(ticks);
    }

    /// Whether the in-combat countdown is running.
    pub const fn in_combat(&self) -> bool {
        self.combat_ticks > 0
    }

    /// Owned copy of the fields other characters' formulas read.
    pub fn snapshot(&self) -> CombatantSnapshot {
        CombatantSnapshot {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            level: self.level,
            alignment: self.alignment,
            position: self.position,
            stats: self.stats.effective(),
            traits: self.traits.clone(),
            skills: self.skills.clone(),
            hp: self.hp.current(),
            dead: self.dead,
            owner: self.owner,
        }
    }

    /// Client view.
    pub fn view(&self) -> NpcView {
        NpcView {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            position: self.position,
            level: self.level,
            hp: self.hp.current(),
            max_hp: self.hp.maximum(),
        }
    }
}

/// Read-only copy of another character, taken at the start of a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatantSnapshot {
    /// Character id.
    pub id: CharacterId,
    /// Display name.
    pub name: String,
    /// Player or NPC.
    pub kind: CharacterKind,
    /// Level.
    pub level: u32,
    /// Alignment.
    pub alignment: Alignment,
    /// Position.
    pub position: Position,
    /// Effective stats.
    pub stats: BTreeMap<Stat, i64>,
    /// Trait levels.
    pub traits: BTreeMap<String, u32>,
    /// Skill levels.
    pub skills: BTreeMap<String, u32>,
    /// Current health.
    pub hp: i64,
    /// Dead flag.
    pub dead: bool,
    /// Pet owner.
    pub owner: Option<CharacterId>,
}

impl CombatantSnapshot {
    /// Effective stat value, zero when absent.
    pub fn stat(&self, stat: Stat) -> i64 {
        self.stats.get(&stat).copied().unwrap_or(0)
    }

    /// Trait level, zero when absent.
    pub fn trait_level(&self, name: &str) -> u32 {
        self.traits.get(name).copied().unwrap_or(0)
    }

    /// Skill level, zero when absent.
    pub fn skill_level(&self, name: &str) -> u32 {
        self.skills.get(name).copied().unwrap_or(0)
    }
}

/// What to discard when a full action queue receives another command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueOverflow {
    /// Drop the oldest queued command to make room.
    #[default]
    DropOldest,
    /// Refuse the incoming command.
    DropNewest,
}

/// Bounded FIFO of raw command lines.
#[derive(Debug, Clone)]
pub struct ActionQueue {
    lines: VecDeque<String>,
    capacity: usize,
    overflow: QueueOverflow,
}

impl ActionQueue {
    /// An empty queue. A capacity of zero is raised to one.
    pub fn new(capacity: usize, overflow: QueueOverflow) -> Self {
        Self {
            lines: VecDeque::new(),
            capacity: capacity.max(1),
            overflow,
        }
    }

    /// Queue a command. Returns `false` if it was refused.
    pub fn push(&mut self, line: String) -> bool {
        if self.lines.len() >= self.capacity {
            match self.overflow {
                QueueOverflow::DropOldest => {
                    self.lines.pop_front();
                }
                QueueOverflow::DropNewest => return false,
            }
        }
        self.lines.push_back(line);
        true
    }

    /// Take the next command.
    pub fn pop(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    /// Discard everything.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new(5, QueueOverflow::DropOldest)
    }
}

/// A character: core state, active effects, and queued commands.
#[derive(Debug)]
pub struct Character {
    /// Everything but effects.
    pub core: CharacterCore,
    /// Active effects in application order.
    pub effects: EffectRegistry,
    /// Queued player commands.
    pub actions: ActionQueue,
}

impl Character {
    /// Wrap a core with no effects and a default queue.
    pub fn new(core: CharacterCore) -> Self {
        Self {
            core,
            effects: EffectRegistry::default(),
            actions: ActionQueue::default(),
        }
    }

    /// Character id.
    pub const fn id(&self) -> CharacterId {
        self.core.id
    }

    /// Whether the character may execute commands this tick.
    pub fn can_act(&self) -> bool {
        !self.core.is_dead() && !self.effects.prevents_action()
    }

    /// Build a player from saved state. Saved effects are not applied here;
    /// see [`crate::effects::restore_effects`].
    pub fn from_state(state: &CharacterState, actions: ActionQueue) -> Self {
        let mut core = CharacterCore::new(
            state.id,
            state.name.clone(),
            CharacterKind::Player,
            state.stats.clone(),
        );
        core.level = state.level;
        core.alignment = state.alignment;
        core.position = state.position;
        core.traits.clone_from(&state.traits);
        core.skills.clone_from(&state.skills);
        core.hunger_ticks = state.hunger_ticks;
        core.set_pools(state.hp, state.mp);
        if state.hp <= 0 {
            core.mark_dead();
        }
        Self {
            core,
            effects: EffectRegistry::default(),
            actions,
        }
    }

    /// Saved form of this character.
    pub fn to_state(&self, map: &str) -> CharacterState {
        CharacterState {
            id: self.core.id,
            name: self.core.name.clone(),
            map: map.to_owned(),
            level: self.core.level,
            alignment: self.core.alignment,
            position: self.core.position,
            stats: self.core.stats.base().clone(),
            hp: self.core.hp.current(),
            mp: self.core.mp.current(),
            hunger_ticks: self.core.hunger_ticks,
            traits: self.core.traits.clone(),
            skills: self.core.skills.clone(),
            effects: self.effects.persisted(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn core_with_hp(hp: i64) -> CharacterCore {
        CharacterCore::new(
            CharacterId::new(),
            "Tester",
            CharacterKind::Player,
            BTreeMap::from([(Stat::Hp, hp), (Stat::Mp, 10)]),
        )
    }

    #[test]
    fn pools_start_full() {
        let core = core_with_hp(40);
        assert_eq!(core.hp().current(), 40);
        assert_eq!(core.mp().current(), 10);
    }

    #[test]
    fn hp_bonus_raises_maximum_and_removal_clamps() {
        let mut core = core_with_hp(40);
        core.adjust_bonus(Stat::Hp, 15);
        assert_eq!(core.hp().maximum(), 55);
        core.heal(15);
        assert_eq!(core.hp().current(), 55);
        core.adjust_bonus(Stat::Hp, -15);
        assert_eq!(core.hp().current(), 40);
    }

    #[test]
    fn highest_aggro_prefers_larger_threat() {
        let mut core = core_with_hp(10);
        let a = CharacterId::new();
        let b = CharacterId::new();
        core.add_aggro(a, 3);
        core.add_aggro(b, 7);
        assert_eq!(core.highest_aggro(), Some(b));
        core.add_aggro(core.id, 100);
        assert!(!core.aggro.contains_key(&core.id));
    }

    #[test]
    fn dead_characters_do_not_heal() {
        let mut core = core_with_hp(10);
        core.mark_dead();
        assert_eq!(core.heal(5), 0);
        core.revive();
        assert_eq!(core.hp().current(), 10);
    }

    #[test]
    fn queue_drop_oldest_keeps_newest() {
        let mut q = ActionQueue::new(2, QueueOverflow::DropOldest);
        assert!(q.push("a".to_owned()));
        assert!(q.push("b".to_owned()));
        assert!(q.push("c".to_owned()));
        assert_eq!(q.pop().as_deref(), Some("b"));
        assert_eq!(q.pop().as_deref(), Some("c"));
    }

    #[test]
    fn queue_drop_newest_refuses() {
        let mut q = ActionQueue::new(1, QueueOverflow::DropNewest);
        assert!(q.push("a".to_owned()));
        assert!(!q.push("b".to_owned()));
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop().as_deref(), Some("a"));
    }

    #[test]
    fn state_round_trip_keeps_base_stats() {
        let mut state = CharacterState::fresh(CharacterId::new(), "Frodo", 30);
        state.hp = 12;
        state.position = Position::new(3, 4);
        let character = Character::from_state(&state, ActionQueue::default());
        assert_eq!(character.core.hp().current(), 12);
        let saved = character.to_state("shire");
        assert_eq!(saved.hp, 12);
        assert_eq!(saved.position, Position::new(3, 4));
        assert_eq!(saved.map, "shire");
        assert_eq!(saved.stats.get(&Stat::Hp), Some(&30));
    }
}
