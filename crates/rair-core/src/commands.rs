//! Player commands and NPC intents.
//!
//! Players send raw text lines. They are queued on the character and
//! parsed into a [`Command`] only when the character-action phase gets to
//! them, so a stunned or dead player's queue waits untouched. NPC intents
//! from the spawner AI go through the same skill path as player attacks.
//!
//! Command words:
//!
//! | Line | Effect |
//! |------|--------|
//! | `attack <id>` / `a <id>` | melee attack |
//! | `combust <id>` | fire spell |
//! | `cure [<id>]` | heal, self when no target |
//! | `cast <effect> [<id>]` | cast a castable effect |
//! | `move <dx> <dy>` | step one tile |
//! | `dispel <effect>` | end a castable effect on yourself |

use rair_characters::combat::{self, HitResult};
use rair_characters::effects::buffs::{Boost, VitalEssence};
use rair_characters::effects::summon::ChannelFindFamiliar;
use rair_characters::effects::{ApplyOutcome, CastRequest, EndReason};
use rair_characters::skills::Skill;
use rair_characters::{CastRejection, Character, Roster};
use rair_types::{CharacterId, MessageKind, Notification, Stat, WorldEvent};
use tracing::{debug, warn};

use crate::spawner::{NpcAction, NpcIntent};
use crate::world::World;

/// Mana spent on a `cast` command.
pub const CAST_MANA_COST: i64 = 5;

/// Range of a `cast` command.
pub const CAST_RANGE: u32 = 5;

/// Effects players may cast and dispel by name.
pub const CASTABLE: [&str; 11] = [
    "Poison",
    "Venom",
    "Disease",
    "SearingPurification",
    "BarFrost",
    "EagleEye",
    "Invisible",
    "LoweredDefenses",
    Boost::NAME,
    VitalEssence::NAME,
    ChannelFindFamiliar::NAME,
];

/// Errors raised while parsing a command line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandParseError {
    /// Blank line.
    #[error("What do you want to do?")]
    Empty,

    /// First word is not a command.
    #[error("Unknown command: {verb}")]
    UnknownVerb {
        /// The word given.
        verb: String,
    },

    /// A required argument is absent.
    #[error("{verb} needs {argument}.")]
    MissingArgument {
        /// Command word.
        verb: String,
        /// What is missing.
        argument: &'static str,
    },

    /// A target is not a character id.
    #[error("No such target: {text}")]
    InvalidTarget {
        /// The text given.
        text: String,
        /// Why it did not parse.
        reason: String,
    },

    /// A step is not a number.
    #[error("Not a number: {text}")]
    InvalidNumber {
        /// The text given.
        text: String,
        /// Why it did not parse.
        source: std::num::ParseIntError,
    },

    /// The effect cannot be cast by players.
    #[error("You don't know how to cast {name}.")]
    UnknownEffect {
        /// The name given.
        name: String,
    },
}

/// A parsed player command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Use a skill.
    Use {
        /// Skill.
        skill: Skill,
        /// Target, if named.
        target: Option<CharacterId>,
    },
    /// Cast an effect.
    Cast {
        /// Catalog name.
        effect: &'static str,
        /// Target, self when absent.
        target: Option<CharacterId>,
    },
    /// Step to a neighbouring tile. Components are clamped to one.
    Move {
        /// X step.
        dx: i32,
        /// Y step.
        dy: i32,
    },
    /// End a castable effect on yourself.
    Dispel {
        /// Catalog name.
        effect: &'static str,
    },
}

impl Command {
    /// Parse one command line.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandParseError`] describing what is wrong with the
    /// line. Its message is suitable for showing to the player.
    pub fn parse(line: &str) -> Result<Self, CommandParseError> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or(CommandParseError::Empty)?;

        if let Some(skill) = Skill::parse(verb) {
            let target = words.next().map(parse_target).transpose()?;
            return Ok(Self::Use { skill, target });
        }

        match verb.to_ascii_lowercase().as_str() {
            "cast" | "c" => {
                let name = words.next().ok_or_else(|| missing(verb, "an effect"))?;
                let effect = castable(name)?;
                let target = words.next().map(parse_target).transpose()?;
                Ok(Self::Cast { effect, target })
            }
            "move" | "m" => {
                let dx = parse_step(words.next().ok_or_else(|| missing(verb, "a direction"))?)?;
                let dy = parse_step(words.next().ok_or_else(|| missing(verb, "a direction"))?)?;
                Ok(Self::Move {
                    dx: dx.clamp(-1, 1),
                    dy: dy.clamp(-1, 1),
                })
            }
            "dispel" => {
                let name = words.next().ok_or_else(|| missing(verb, "an effect"))?;
                Ok(Self::Dispel {
                    effect: castable(name)?,
                })
            }
            _ => Err(CommandParseError::UnknownVerb {
                verb: verb.to_owned(),
            }),
        }
    }
}

fn missing(verb: &str, argument: &'static str) -> CommandParseError {
    CommandParseError::MissingArgument {
        verb: verb.to_owned(),
        argument,
    }
}

fn parse_target(text: &str) -> Result<CharacterId, CommandParseError> {
    text.parse().map_err(|e: <CharacterId as std::str::FromStr>::Err| {
        CommandParseError::InvalidTarget {
            text: text.to_owned(),
            reason: e.to_string(),
        }
    })
}

fn parse_step(text: &str) -> Result<i32, CommandParseError> {
    text.parse().map_err(|source| CommandParseError::InvalidNumber {
        text: text.to_owned(),
        source,
    })
}

fn castable(name: &str) -> Result<&'static str, CommandParseError> {
    CASTABLE
        .iter()
        .copied()
        .find(|known| known.eq_ignore_ascii_case(name))
        .ok_or_else(|| CommandParseError::UnknownEffect {
            name: name.to_owned(),
        })
}

impl World {
    /// Execute queued commands for one character, up to its action speed.
    /// Returns how many lines were consumed.
    pub(crate) fn execute_queued(&mut self, roster: &Roster, actor: CharacterId) -> usize {
        let budget = match self.characters.get(&actor) {
            Some(c) if c.can_act() => usize::try_from(c.core.stat(Stat::ActionSpeed).max(1)).unwrap_or(1),
            _ => return 0,
        };
        let mut executed: usize = 0;
        for _ in 0..budget {
            let Some(line) = self.characters.get_mut(&actor).and_then(|c| c.actions.pop()) else {
                break;
            };
            match Command::parse(&line) {
                Ok(command) => self.execute_command(roster, actor, &command),
                Err(e) => self.tell(actor, MessageKind::Refused, e.to_string()),
            }
            executed = executed.saturating_add(1);
            if !self.characters.get(&actor).is_some_and(Character::can_act) {
                break;
            }
        }
        executed
    }

    /// Carry out one parsed command.
    pub(crate) fn execute_command(&mut self, roster: &Roster, actor: CharacterId, command: &Command) {
        let result = match *command {
            Command::Use { skill, target } => self.use_skill(roster, actor, skill, target).map(|_| ()),
            Command::Cast { effect, target } => self.cast_command(roster, actor, effect, target),
            Command::Move { dx, dy } => self.step(actor, dx, dy),
            Command::Dispel { effect } => self.dispel_command(roster, actor, effect),
        };
        if let Err(CastRejection { message: Some(message) }) = result {
            self.tell(actor, MessageKind::Refused, message);
        }
    }

    /// Carry out one NPC intent.
    pub(crate) fn execute_intent(&mut self, roster: &Roster, intent: NpcIntent) {
        let NpcIntent { npc, action } = intent;
        if !self.characters.get(&npc).is_some_and(Character::can_act) {
            return;
        }
        match action {
            NpcAction::Leash { to } => {
                if let Some(c) = self.characters.get_mut(&npc) {
                    c.core.aggro.clear();
                    c.core.combat_ticks = 0;
                    c.core.position = to;
                }
                self.notify(Notification::broadcast(WorldEvent::CharacterMoved { id: npc, position: to }));
            }
            NpcAction::Move { to } => {
                if self.geometry.is_wall(to) {
                    return;
                }
                if let Some(c) = self.characters.get_mut(&npc) {
                    c.core.position = to;
                }
                self.notify(Notification::broadcast(WorldEvent::CharacterMoved { id: npc, position: to }));
            }
            NpcAction::Attack { target, skill } => {
                if let Err(rejection) = self.use_skill(roster, npc, skill, Some(target)) {
                    debug!(character_id = %npc, target = %target, reason = ?rejection.message, "NPC action refused");
                }
            }
        }
    }

    /// Use a skill through the combat resolver.
    ///
    /// Checks the target, range, line of sight, and mana in that order.
    /// Players pay the skill's mana cost; NPCs do not. Damage dealt is
    /// offered to the defender's effects as a hit.
    pub(crate) fn use_skill(
        &mut self,
        roster: &Roster,
        actor: CharacterId,
        skill: Skill,
        target: Option<CharacterId>,
    ) -> Result<HitResult, CastRejection> {
        let target = match target {
            Some(t) if t == actor && !skill.allows_self() => {
                return Err(CastRejection::with_message(format!("You can't {skill} yourself.")));
            }
            Some(t) => t,
            None if skill.allows_self() => actor,
            None => return Err(CastRejection::with_message(format!("Who do you want to {skill}?"))),
        };
        self.check_reach(actor, target, skill.range())?;
        self.spend_mana(actor, skill.mana_cost())?;

        let attacker = self
            .characters
            .get(&actor)
            .map(|c| c.core.snapshot())
            .ok_or_else(CastRejection::silent)?;
        let descriptor = skill.descriptor(&attacker, &mut self.rng);
        let combat_ticks = self.settings.combat_ticks;
        let defender = self.characters.get_mut(&target).ok_or_else(CastRejection::silent)?;
        let outcome = combat::resolve(
            Some(&attacker),
            &mut defender.core,
            &descriptor,
            &mut self.rng,
            combat_ticks,
        );
        self.notify_all(outcome.notifications);

        if outcome.attacker_engaged {
            if let Some(a) = self.characters.get_mut(&actor) {
                a.core.engage(combat_ticks);
            }
        }
        if outcome.damage > 0 {
            let damage = outcome.damage;
            if let Some((report, outbox)) = self.run_effects(roster, target, |_, c, env| {
                c.effects.register_hit(&mut c.core, env, damage)
            }) {
                for fault in &report.faults {
                    warn!(character_id = %target, effect = %fault.name, error = %fault.error, "Effect hit hook failed");
                }
                self.absorb(roster, outbox);
            }
        }
        Ok(outcome.result)
    }

    fn cast_command(
        &mut self,
        roster: &Roster,
        actor: CharacterId,
        effect: &'static str,
        target: Option<CharacterId>,
    ) -> Result<(), CastRejection> {
        let target = target.unwrap_or(actor);
        self.check_reach(actor, target, CAST_RANGE)?;
        self.spend_mana(actor, CAST_MANA_COST)?;
        let request = CastRequest::new(effect).caster(actor);
        match self.cast_on(target, &request) {
            Ok(ApplyOutcome::Refused) => Err(CastRejection::with_message("Nothing happens.")),
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(character_id = %actor, target = %target, effect, error = %e, "Cast command failed");
                Err(CastRejection::with_message("Your spell fizzles."))
            }
        }
    }

    fn dispel_command(&mut self, roster: &Roster, actor: CharacterId, effect: &'static str) -> Result<(), CastRejection> {
        let ended = self
            .run_effects(roster, actor, |_, c, env| {
                c.effects.unapply_named(effect, &mut c.core, env, EndReason::Removed)
            })
            .map_or(0, |(ended, outbox)| {
                self.absorb(roster, outbox);
                ended
            });
        if ended == 0 {
            return Err(CastRejection::with_message(format!("You are not affected by {effect}.")));
        }
        Ok(())
    }

    fn step(&mut self, actor: CharacterId, dx: i32, dy: i32) -> Result<(), CastRejection> {
        let from = self
            .characters
            .get(&actor)
            .map(|c| c.core.position)
            .ok_or_else(CastRejection::silent)?;
        let to = from.offset(dx.clamp(-1, 1), dy.clamp(-1, 1));
        if to == from {
            return Ok(());
        }
        if self.geometry.is_wall(to) {
            return Err(CastRejection::with_message("You can't go that way."));
        }
        if let Some(c) = self.characters.get_mut(&actor) {
            c.core.position = to;
        }
        self.notify(Notification::broadcast(WorldEvent::CharacterMoved { id: actor, position: to }));
        Ok(())
    }

    fn check_reach(&self, actor: CharacterId, target: CharacterId, range: u32) -> Result<(), CastRejection> {
        let (Some(a), Some(t)) = (self.characters.get(&actor), self.characters.get(&target)) else {
            return Err(CastRejection::with_message("You don't see that here."));
        };
        if t.core.is_dead() {
            return Err(CastRejection::with_message(format!("{} is already dead.", t.core.name)));
        }
        if actor == target {
            return Ok(());
        }
        let (from, to) = (a.core.position, t.core.position);
        if self.geometry.distance(from, to) > range {
            return Err(CastRejection::with_message(format!("{} is too far away.", t.core.name)));
        }
        let (dx, dy) = from.delta_to(&to);
        if !self.geometry.can_see(from, dx, dy) {
            return Err(CastRejection::with_message(format!("You can't see {}.", t.core.name)));
        }
        Ok(())
    }

    fn spend_mana(&mut self, actor: CharacterId, cost: i64) -> Result<(), CastRejection> {
        let Some(c) = self.characters.get_mut(&actor) else {
            return Err(CastRejection::silent());
        };
        if cost <= 0 || !c.core.is_player() {
            return Ok(());
        }
        if c.core.mp().current() < cost {
            return Err(CastRejection::with_message("You don't have enough mana."));
        }
        c.core.drain_mana(cost);
        Ok(())
    }
}
