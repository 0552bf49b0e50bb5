//! The tick scheduler.
//!
//! [`run_tick`] advances a world by one tick and runs the phases the clock
//! selects, always in this order:
//!
//! 1. **Character action**: bookkeeping (combat countdown, regeneration,
//!    hunger), queued player commands, then NPC AI intents.
//! 2. **Buff**: one effect tick for every character. Spawner-owned NPCs
//!    go first, then everyone else.
//! 3. **Spawner**: population maintenance.
//! 4. **Persistence**: every player is submitted for saving.
//!
//! Deaths are settled after each phase. A failure in one character or
//! spawner is logged and counted; it never stops the rest of the tick.

use std::collections::BTreeSet;

use rair_characters::effects::{CastRequest, cast};
use rair_characters::{CharacterError, Roster};
use rair_types::{CharacterId, Notification, SpawnerId, Stat, WorldEvent};
use tracing::{debug, error, warn};

use crate::clock::{ClockError, TickPhases};
use crate::spawner::{AiContext, SpawnContext, SpawnerError, bucket_of, near_players};
use crate::world::World;

/// Effect cast on a player whose hunger runs out.
const STARVATION_EFFECT: &str = "Malnourished";

/// Errors that can occur during a tick.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// The clock could not advance.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// A character step failed.
    #[error("character {character} failed: {source}")]
    Character {
        /// The failing character.
        character: CharacterId,
        /// What went wrong.
        source: CharacterError,
    },

    /// A spawner step failed.
    #[error("spawner {spawner} failed: {source}")]
    Spawner {
        /// The failing spawner.
        spawner: SpawnerId,
        /// What went wrong.
        source: SpawnerError,
    },
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// The tick number. Unchanged for an idle tick.
    pub tick: u64,
    /// No player was present, so nothing ran.
    pub idle: bool,
    /// Players present at the end of the tick.
    pub players: usize,
    /// NPCs present at the end of the tick.
    pub npcs: usize,
    /// Command lines consumed.
    pub commands_executed: usize,
    /// NPCs created by spawners.
    pub spawned: usize,
    /// Deaths settled.
    pub deaths: usize,
    /// Effects that ended during the buff phase.
    pub effects_ended: usize,
    /// Isolated failures.
    pub faults: usize,
    /// Players submitted for saving.
    pub persisted: usize,
}

/// Advance `world` by one tick.
///
/// A world with no players idles: the clock does not advance and only
/// pending notifications are delivered.
///
/// # Errors
///
/// Returns [`TickError::Clock`] if the tick counter cannot advance.
/// Per-character and per-spawner failures are logged, not returned.
pub fn run_tick(world: &mut World) -> Result<TickSummary, TickError> {
    if world.player_count() == 0 {
        world.flush_notifications();
        return Ok(TickSummary {
            tick: world.tick(),
            idle: true,
            npcs: world.npc_count(),
            ..TickSummary::default()
        });
    }

    let phases = world.clock.advance()?;
    let mut summary = TickSummary {
        tick: phases.tick,
        ..TickSummary::default()
    };

    if phases.character_action {
        character_action_phase(world, &phases, &mut summary);
        summary.deaths = summary.deaths.saturating_add(world.reap());
    }
    if phases.buff {
        buff_phase(world, &mut summary);
        summary.deaths = summary.deaths.saturating_add(world.reap());
    }
    if phases.spawner {
        spawner_phase(world, &phases, &mut summary);
        summary.deaths = summary.deaths.saturating_add(world.reap());
    }
    if phases.persistence {
        summary.persisted = world.persist_all();
    }

    summary.players = world.player_count();
    summary.npcs = world.npc_count();
    world.flush_notifications();
    debug!(
        map = %world.map(),
        tick = summary.tick,
        players = summary.players,
        npcs = summary.npcs,
        faults = summary.faults,
        "Tick complete"
    );
    Ok(summary)
}

/// Buckets holding at least one living player.
fn player_buckets(world: &World) -> BTreeSet<(i32, i32)> {
    world
        .characters
        .values()
        .filter(|c| c.core.is_player() && !c.core.is_dead())
        .map(|c| bucket_of(c.core.position))
        .collect()
}

// =========================================================================
// Character action
// =========================================================================

fn character_action_phase(world: &mut World, phases: &TickPhases, summary: &mut TickSummary) {
    world.notify(Notification::broadcast(WorldEvent::Tick { tick: phases.tick }));
    let roster = world.roster();
    let regen_due = phases.tick.checked_rem(world.settings.regen_interval.max(1)) == Some(0);

    let ids: Vec<CharacterId> = world.characters.keys().copied().collect();
    for id in ids {
        match character_step(world, &roster, id, regen_due) {
            Ok(executed) => {
                summary.commands_executed = summary.commands_executed.saturating_add(executed);
            }
            Err(e) => {
                summary.faults = summary.faults.saturating_add(1);
                warn!(map = %world.map(), tick = phases.tick, error = %e, "Character step failed");
            }
        }
    }

    let buckets = player_buckets(world);
    let spawner_ids: Vec<SpawnerId> = world.spawners.keys().copied().collect();
    for sid in spawner_ids {
        let intents = {
            let Some(spawner) = world.spawners.get(&sid) else {
                continue;
            };
            let ctx = AiContext {
                geometry: world.geometry.as_ref(),
                player_buckets: &buckets,
                alternate: phases.alternate,
            };
            spawner.npc_tick(&world.characters, &ctx, &mut world.rng)
        };
        for intent in intents {
            world.execute_intent(&roster, intent);
        }
    }
}

/// Bookkeeping and queued commands for one character. Returns the number
/// of command lines consumed.
fn character_step(
    world: &mut World,
    roster: &Roster,
    id: CharacterId,
    regen_due: bool,
) -> Result<usize, TickError> {
    let Some(character) = world.characters.get_mut(&id) else {
        return Ok(0);
    };
    let core = &mut character.core;
    core.combat_ticks = core.combat_ticks.saturating_sub(1);
    if core.is_dead() {
        return Ok(0);
    }

    if regen_due && !core.in_combat() {
        let hp = core.stat(Stat::HpRegen).max(0);
        let mp = core.stat(Stat::MpRegen).max(0);
        core.heal(hp);
        core.restore_mana(mp);
    }

    let starving = match core.hunger_ticks.as_mut() {
        Some(left) if *left > 0 => {
            *left = left.saturating_sub(1);
            *left == 0
        }
        _ => false,
    };
    if starving && !character.effects.contains(STARVATION_EFFECT) {
        if let Some((result, outbox)) = world.run_effects(roster, id, |catalog, c, env| {
            cast(catalog, &CastRequest::new(STARVATION_EFFECT), None, c, env)
        }) {
            world.absorb(roster, outbox);
            result.map_err(|source| TickError::Character {
                character: id,
                source,
            })?;
        }
    }

    Ok(world.execute_queued(roster, id))
}

// =========================================================================
// Buff
// =========================================================================

fn buff_phase(world: &mut World, summary: &mut TickSummary) {
    let roster = world.roster();
    let limit = world.settings.effect_fault_limit;
    let tick = world.tick();

    let mut seen = BTreeSet::new();
    let mut order = Vec::with_capacity(world.characters.len());
    for spawner in world.spawners.values() {
        order.extend(spawner.alive().iter().copied().filter(|id| seen.insert(*id)));
    }
    order.extend(world.characters.keys().copied().filter(|id| seen.insert(*id)));

    for id in order {
        let Some((report, outbox)) = world.run_effects(&roster, id, |_, c, env| {
            c.effects.tick(&mut c.core, env, limit)
        }) else {
            continue;
        };
        world.absorb(&roster, outbox);
        summary.effects_ended = summary.effects_ended.saturating_add(report.ended.len());
        for fault in &report.faults {
            summary.faults = summary.faults.saturating_add(1);
            if fault.removed {
                error!(
                    map = %world.map(),
                    tick,
                    character_id = %id,
                    effect = %fault.name,
                    error = %fault.error,
                    "Effect removed after repeated failures"
                );
            } else {
                warn!(
                    map = %world.map(),
                    tick,
                    character_id = %id,
                    effect = %fault.name,
                    error = %fault.error,
                    "Effect tick failed"
                );
            }
        }
    }
}

// =========================================================================
// Spawner
// =========================================================================

fn spawner_phase(world: &mut World, phases: &TickPhases, summary: &mut TickSummary) {
    let buckets = player_buckets(world);
    let roster = world.roster();
    let limit = world.settings.spawner_fault_limit;

    let spawner_ids: Vec<SpawnerId> = world.spawners.keys().copied().collect();
    for sid in spawner_ids {
        let result = {
            let Some(spawner) = world.spawners.get_mut(&sid) else {
                continue;
            };
            let ctx = SpawnContext {
                content: world.content.as_ref(),
                geometry: world.geometry.as_ref(),
                player_near: near_players(spawner.anchor(), &buckets),
                alternate: phases.alternate,
            };
            spawner
                .tick(&ctx, &mut world.rng)
                .map_err(|source| TickError::Spawner { spawner: sid, source })
        };

        match result {
            Ok(instances) => {
                if let Some(spawner) = world.spawners.get_mut(&sid) {
                    spawner.record_success();
                }
                summary.spawned = summary.spawned.saturating_add(instances.len());
                for instance in instances {
                    let commands = world.register_npc(instance);
                    world.apply_commands(&roster, commands);
                }
            }
            Err(e) => {
                summary.faults = summary.faults.saturating_add(1);
                warn!(map = %world.map(), tick = phases.tick, error = %e, "Spawner step failed");
                let disabled = world
                    .spawners
                    .get_mut(&sid)
                    .is_some_and(|s| s.record_fault(limit));
                if disabled {
                    error!(
                        map = %world.map(),
                        tick = phases.tick,
                        spawner = %sid,
                        "Spawner disabled after repeated failures"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rair_types::{CharacterState, Position};

    use super::*;
    use crate::config::TickRates;
    use crate::content::FAMILIAR;
    use crate::spawner::{NpcChoice, SpawnerConfig};
    use crate::world::{WorldServices, WorldSettings};

    fn world_with(settings: WorldSettings) -> World {
        World::new(settings, WorldServices::standalone()).unwrap()
    }

    fn world() -> World {
        world_with(WorldSettings::for_map("test"))
    }

    fn admit(w: &mut World, name: &str, stats: &[(Stat, i64)]) -> CharacterId {
        let mut state = CharacterState::fresh(CharacterId::new(), name, 50);
        for (stat, value) in stats {
            state.stats.insert(*stat, *value);
        }
        w.admit_player(&state);
        state.id
    }

    #[test]
    fn empty_world_idles_without_advancing() {
        let mut w = world();
        let summary = run_tick(&mut w).unwrap();
        assert!(summary.idle);
        assert_eq!(w.tick(), 0);
    }

    #[test]
    fn ticks_advance_while_a_player_is_present() {
        let mut w = world();
        admit(&mut w, "Ayla", &[]);
        for expected in 1..=3 {
            let summary = run_tick(&mut w).unwrap();
            assert!(!summary.idle);
            assert_eq!(summary.tick, expected);
        }
    }

    #[test]
    fn regeneration_waits_for_the_interval_and_combat() {
        let mut settings = WorldSettings::for_map("test");
        settings.regen_interval = 2;
        let mut w = world_with(settings);
        let id = admit(&mut w, "Ayla", &[(Stat::HpRegen, 3)]);
        w.character_mut(id).unwrap().core.take_damage(20);

        run_tick(&mut w).unwrap();
        assert_eq!(w.character(id).unwrap().core.hp().current(), 30);
        run_tick(&mut w).unwrap();
        assert_eq!(w.character(id).unwrap().core.hp().current(), 33);

        w.character_mut(id).unwrap().core.engage(10);
        run_tick(&mut w).unwrap();
        run_tick(&mut w).unwrap();
        assert_eq!(w.character(id).unwrap().core.hp().current(), 33);
    }

    #[test]
    fn starving_player_becomes_malnourished_once() {
        let mut settings = WorldSettings::for_map("test");
        settings.hunger_ticks = 2;
        let mut w = world_with(settings);
        let id = admit(&mut w, "Ayla", &[]);

        run_tick(&mut w).unwrap();
        assert!(!w.character(id).unwrap().effects.contains(STARVATION_EFFECT));
        run_tick(&mut w).unwrap();
        run_tick(&mut w).unwrap();
        let c = w.character(id).unwrap();
        assert!(c.effects.contains(STARVATION_EFFECT));
        assert_eq!(c.effects.iter().filter(|e| e.name() == STARVATION_EFFECT).count(), 1);
        assert_eq!(c.core.hunger_ticks, Some(0));
    }

    #[test]
    fn phases_follow_their_rates() {
        let mut settings = WorldSettings::for_map("test");
        settings.rates = TickRates {
            character_action: 1,
            buff: 1,
            spawner: 2,
            persistence: 4,
        };
        let mut w = world_with(settings);
        admit(&mut w, "Ayla", &[]);
        let mut config = SpawnerConfig::default();
        config.npcs = vec![NpcChoice::new(FAMILIAR)];
        config.initial_spawn = 1;
        w.add_spawner("den", Position::new(0, 0), config).unwrap();

        assert_eq!(run_tick(&mut w).unwrap().spawned, 0);
        assert_eq!(run_tick(&mut w).unwrap().spawned, 1);
        assert_eq!(w.npc_count(), 1);
    }

    #[test]
    fn broken_spawner_is_disabled_without_stopping_others() {
        let mut settings = WorldSettings::for_map("test");
        settings.spawner_fault_limit = 2;
        let mut w = world_with(settings);
        admit(&mut w, "Ayla", &[]);

        let mut broken = SpawnerConfig::default();
        broken.npcs = vec![NpcChoice::new("dragon")];
        let bad = w.add_spawner("lair", Position::new(0, 0), broken).unwrap();
        let mut good = SpawnerConfig::default();
        good.npcs = vec![NpcChoice::new(FAMILIAR)];
        w.add_spawner("den", Position::new(0, 0), good).unwrap();

        let first = run_tick(&mut w).unwrap();
        assert_eq!(first.faults, 1);
        assert_eq!(first.spawned, 1);
        run_tick(&mut w).unwrap();
        assert!(w.spawner(bad).unwrap().is_disabled());

        let third = run_tick(&mut w).unwrap();
        assert_eq!(third.faults, 0);
    }

    #[test]
    fn queued_commands_run_in_the_action_phase() {
        let mut w = world();
        let id = admit(&mut w, "Ayla", &[]);
        w.enqueue_command(id, "move 1 1");
        w.enqueue_command(id, "dance");
        let summary = run_tick(&mut w).unwrap();
        assert_eq!(summary.commands_executed, 1);
        assert_eq!(w.character(id).unwrap().core.position, Position::new(1, 1));
        assert_eq!(run_tick(&mut w).unwrap().commands_executed, 1);
    }
}
