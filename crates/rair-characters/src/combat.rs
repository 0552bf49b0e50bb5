//! The combat resolver.
//!
//! [`resolve`] turns an attack intent into an outcome. It reads the
//! attacker through a [`CombatantSnapshot`] and mutates only the
//! defender, so it is safe to call from anywhere in a tick, including
//! from inside an effect hook that is itself running in the middle of a
//! registry pass.
//!
//! # Pipeline
//!
//! 1. Dead defenders are ignored.
//! 2. Healing is clamped to the defender's missing health and returns.
//! 3. Direct physical attacks roll dodge, then armor may block outright.
//! 4. A critical roll doubles the damage if the attack allows it.
//! 5. Flat per-class resistance, then percentage mitigation.
//! 6. Health is removed, threat and the combat countdown are refreshed,
//!    and the defender is flagged dead at zero health.
//!
//! Message templates use `%0` for the attacker, `%1` for the defender,
//! `%2` for the amount, and `%3` for the skill or effect name.

use rair_types::{Audience, CharacterId, DamageClass, MessageKind, Notification, Stat, WorldEvent};
use rand::Rng;

use crate::character::{CharacterCore, CombatantSnapshot};

/// Highest dodge chance, in percent.
const MAX_DODGE_PERCENT: i64 = 50;

/// Highest critical chance, in percent.
const MAX_CRIT_PERCENT: i64 = 50;

/// Highest mitigation, in percent.
const MAX_MITIGATION_PERCENT: i64 = 75;

/// Radius for observer messages.
const OBSERVER_RADIUS: u32 = 4;

/// Name used for attacks without a living attacker.
const UNKNOWN_ATTACKER: &str = "something";

/// Message templates for one attack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageTemplates {
    /// Sent to the attacker.
    pub attacker: Option<String>,
    /// Sent to the defender.
    pub defender: Option<String>,
    /// Sent to everyone nearby except the two above.
    pub observers: Option<String>,
}

impl MessageTemplates {
    /// Standard templates for a damaging skill.
    pub fn damage() -> Self {
        Self {
            attacker: Some("You hit %1 with %3 for %2 damage!".to_owned()),
            defender: Some("%0 hits you with %3 for %2 damage!".to_owned()),
            observers: Some("%0 hits %1 with %3.".to_owned()),
        }
    }

    /// Standard templates for damage over time.
    pub fn over_time() -> Self {
        Self {
            attacker: Some("Your %3 hurts %1 for %2 damage.".to_owned()),
            defender: Some("%3 hurts you for %2 damage.".to_owned()),
            observers: None,
        }
    }

    /// Standard templates for healing.
    pub fn heal() -> Self {
        Self {
            attacker: Some("You heal %1 for %2 health.".to_owned()),
            defender: Some("%0 heals you for %2 health.".to_owned()),
            observers: None,
        }
    }
}

/// An attack or heal intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackDescriptor {
    /// Skill or effect name, for messages.
    pub source: String,
    /// Base amount before mitigation. For heals, the amount restored.
    pub damage: i64,
    /// Damage class.
    pub class: DamageClass,
    /// Damage over time skips dodge and armor.
    pub over_time: bool,
    /// Whether a critical roll is made.
    pub can_crit: bool,
    /// Messages to emit.
    pub templates: MessageTemplates,
}

impl AttackDescriptor {
    /// A direct attack with standard messages.
    pub fn direct(source: impl Into<String>, damage: i64, class: DamageClass) -> Self {
        let templates = if class.is_heal() {
            MessageTemplates::heal()
        } else {
            MessageTemplates::damage()
        };
        Self {
            source: source.into(),
            damage,
            class,
            over_time: false,
            can_crit: !class.is_heal(),
            templates,
        }
    }

    /// A damage-over-time tick with standard messages.
    pub fn over_time(source: impl Into<String>, damage: i64, class: DamageClass) -> Self {
        Self {
            source: source.into(),
            damage,
            class,
            over_time: true,
            can_crit: false,
            templates: MessageTemplates::over_time(),
        }
    }
}

/// How an attack landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitResult {
    /// Normal hit.
    Hit,
    /// Critical hit.
    Critical,
    /// Avoided entirely.
    Dodged,
    /// Absorbed by armor.
    Blocked,
    /// Health restored.
    Healed,
    /// Defender was already dead.
    Ignored,
}

/// Result of [`resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackOutcome {
    /// How the attack landed.
    pub result: HitResult,
    /// Health removed from the defender.
    pub damage: i64,
    /// Health restored to the defender.
    pub healed: i64,
    /// The defender died from this attack.
    pub killed: bool,
    /// Whether the attacker should be put into combat.
    pub attacker_engaged: bool,
    /// Messages to deliver.
    pub notifications: Vec<Notification>,
}

impl AttackOutcome {
    const fn ignored() -> Self {
        Self {
            result: HitResult::Ignored,
            damage: 0,
            healed: 0,
            killed: false,
            attacker_engaged: false,
            notifications: Vec::new(),
        }
    }
}

/// Resolve one attack against `defender`.
///
/// `combat_ticks` is the in-combat countdown applied to a defender that
/// was hit.
pub fn resolve<R: Rng + ?Sized>(
    attacker: Option<&CombatantSnapshot>,
    defender: &mut CharacterCore,
    attack: &AttackDescriptor,
    rng: &mut R,
    combat_ticks: u32,
) -> AttackOutcome {
    if defender.is_dead() {
        return AttackOutcome::ignored();
    }

    if attack.class.is_heal() {
        let healed = defender.heal(attack.damage);
        let notifications = render(attacker, defender, attack, healed, MessageKind::Heal);
        return AttackOutcome {
            result: HitResult::Healed,
            damage: 0,
            healed,
            killed: false,
            attacker_engaged: false,
            notifications,
        };
    }

    let mut damage = attack.damage.max(0);
    let mut result = HitResult::Hit;
    let direct_physical = attack.class == DamageClass::Physical && !attack.over_time;

    if direct_physical && roll_percent(rng, dodge_chance(attacker, defender)) {
        result = HitResult::Dodged;
        damage = 0;
    }

    if result == HitResult::Hit && direct_physical {
        let armor = defender.stat(Stat::ArmorClass).max(0);
        if armor >= damage {
            result = HitResult::Blocked;
            damage = 0;
        } else {
            damage = damage.saturating_sub(armor);
        }
    }

    if result == HitResult::Hit && attack.can_crit {
        let chance = attacker.map_or(0, |a| a.stat(Stat::Luk).clamp(0, MAX_CRIT_PERCENT));
        if roll_percent(rng, chance) {
            result = HitResult::Critical;
            damage = damage.saturating_mul(2);
        }
    }

    if matches!(result, HitResult::Hit | HitResult::Critical) {
        if let Some(resist) = attack.class.resist_stat() {
            damage = damage.saturating_sub(defender.stat(resist).max(0)).max(0);
        }
        let mitigation = defender.stat(Stat::Mitigation).clamp(0, MAX_MITIGATION_PERCENT);
        let reduced = damage
            .saturating_mul(mitigation)
            .checked_div(100)
            .unwrap_or(0);
        damage = damage.saturating_sub(reduced);
    }

    let removed = defender.take_damage(damage);
    defender.engage(combat_ticks);
    if let Some(a) = attacker {
        if a.id != defender.id {
            defender.add_aggro(a.id, removed.max(1));
        }
    }

    let killed = defender.hp().is_empty();
    if killed {
        defender.mark_dead();
    }

    let notifications = match result {
        HitResult::Dodged => miss_messages(attacker, defender, attack, "dodges"),
        HitResult::Blocked => miss_messages(attacker, defender, attack, "blocks"),
        _ => render(attacker, defender, attack, removed, MessageKind::Combat),
    };

    AttackOutcome {
        result,
        damage: removed,
        healed: 0,
        killed,
        attacker_engaged: attacker.is_some_and(|a| a.id != defender.id),
        notifications,
    }
}

fn dodge_chance(attacker: Option<&CombatantSnapshot>, defender: &CharacterCore) -> i64 {
    let evasion = defender
        .stat(Stat::Agi)
        .saturating_add(defender.stat(Stat::Dex).checked_div(2).unwrap_or(0));
    let accuracy = attacker.map_or(0, |a| {
        a.stat(Stat::Accuracy)
            .saturating_add(a.stat(Stat::Dex).checked_div(2).unwrap_or(0))
    });
    evasion.saturating_sub(accuracy).clamp(0, MAX_DODGE_PERCENT)
}

fn roll_percent<R: Rng + ?Sized>(rng: &mut R, chance: i64) -> bool {
    chance > 0 && rng.random_range(0..100_i64) < chance
}

fn fill(template: &str, attacker: &str, defender: &str, amount: i64, source: &str) -> String {
    template
        .replace("%0", attacker)
        .replace("%1", defender)
        .replace("%2", &amount.to_string())
        .replace("%3", source)
}

fn render(
    attacker: Option<&CombatantSnapshot>,
    defender: &CharacterCore,
    attack: &AttackDescriptor,
    amount: i64,
    kind: MessageKind,
) -> Vec<Notification> {
    let attacker_name = attacker.map_or(UNKNOWN_ATTACKER, |a| a.name.as_str());
    let mut out = Vec::new();
    let mut exclude = vec![defender.id];

    if let (Some(a), Some(template)) = (attacker, attack.templates.attacker.as_deref()) {
        if a.id != defender.id {
            out.push(Notification::to_character(
                a.id,
                kind,
                fill(template, attacker_name, &defender.name, amount, &attack.source),
            ));
            exclude.push(a.id);
        }
    }
    if let Some(template) = attack.templates.defender.as_deref() {
        out.push(Notification::to_character(
            defender.id,
            kind,
            fill(template, attacker_name, &defender.name, amount, &attack.source),
        ));
    }
    if let Some(template) = attack.templates.observers.as_deref() {
        out.push(nearby(
            defender,
            exclude,
            kind,
            fill(template, attacker_name, &defender.name, amount, &attack.source),
        ));
    }
    out
}

fn miss_messages(
    attacker: Option<&CombatantSnapshot>,
    defender: &CharacterCore,
    attack: &AttackDescriptor,
    verb: &str,
) -> Vec<Notification> {
    let mut out = Vec::new();
    if let Some(a) = attacker {
        out.push(Notification::to_character(
            a.id,
            MessageKind::Combat,
            format!("{} {verb} your {}!", defender.name, attack.source),
        ));
        out.push(Notification::to_character(
            defender.id,
            MessageKind::Combat,
            format!("You {} {}'s {}!", verb.trim_end_matches('s'), a.name, attack.source),
        ));
    }
    out
}

fn nearby(defender: &CharacterCore, exclude: Vec<CharacterId>, kind: MessageKind, text: String) -> Notification {
    Notification {
        audience: Audience::Nearby {
            center: defender.position,
            radius: OBSERVER_RADIUS,
            exclude,
        },
        event: WorldEvent::Message { kind, text },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use rair_types::CharacterKind;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn fighter(name: &str, stats: &[(Stat, i64)]) -> CharacterCore {
        let mut base: BTreeMap<Stat, i64> = stats.iter().copied().collect();
        base.entry(Stat::Hp).or_insert(100);
        CharacterCore::new(CharacterId::new(), name, CharacterKind::Npc, base)
    }

    #[test]
    fn plain_hit_with_no_defenses() {
        let attacker = fighter("Orc", &[]).snapshot();
        let mut defender = fighter("Hobbit", &[]);
        let mut rng = StdRng::seed_from_u64(3);
        let attack = AttackDescriptor::direct("claw", 12, DamageClass::Physical);

        let out = resolve(Some(&attacker), &mut defender, &attack, &mut rng, 10);
        assert_eq!(out.result, HitResult::Hit);
        assert_eq!(out.damage, 12);
        assert_eq!(defender.hp().current(), 88);
        assert_eq!(defender.aggro.get(&attacker.id), Some(&12));
        assert_eq!(defender.combat_ticks, 10);
        assert!(out.attacker_engaged);
        assert_eq!(out.notifications.len(), 3);
        assert_eq!(
            out.notifications.first().unwrap().text(),
            Some("You hit Hobbit with claw for 12 damage!")
        );
    }

    #[test]
    fn armor_blocks_small_hits() {
        let attacker = fighter("Orc", &[]).snapshot();
        let mut defender = fighter("Dwarf", &[(Stat::ArmorClass, 8)]);
        let mut rng = StdRng::seed_from_u64(3);

        let blocked = resolve(
            Some(&attacker),
            &mut defender,
            &AttackDescriptor::direct("claw", 8, DamageClass::Physical),
            &mut rng,
            10,
        );
        assert_eq!(blocked.result, HitResult::Blocked);
        assert_eq!(defender.hp().current(), 100);

        let through = resolve(
            Some(&attacker),
            &mut defender,
            &AttackDescriptor::direct("claw", 20, DamageClass::Physical),
            &mut rng,
            10,
        );
        assert_eq!(through.damage, 12);
    }

    #[test]
    fn over_time_ignores_armor_but_not_resistance() {
        let mut defender = fighter("Dwarf", &[(Stat::ArmorClass, 50), (Stat::PoisonResist, 3)]);
        let mut rng = StdRng::seed_from_u64(3);
        let out = resolve(
            None,
            &mut defender,
            &AttackDescriptor::over_time("Poison", 10, DamageClass::Poison),
            &mut rng,
            10,
        );
        assert_eq!(out.damage, 7);
        assert!(!out.attacker_engaged);
    }

    #[test]
    fn mitigation_is_a_percentage() {
        let mut defender = fighter("Ent", &[(Stat::Mitigation, 25)]);
        let mut rng = StdRng::seed_from_u64(3);
        let out = resolve(
            None,
            &mut defender,
            &AttackDescriptor::over_time("Fire", 40, DamageClass::Fire),
            &mut rng,
            10,
        );
        assert_eq!(out.damage, 30);
    }

    #[test]
    fn mitigation_is_capped() {
        let mut defender = fighter("Ent", &[(Stat::Mitigation, 400)]);
        let mut rng = StdRng::seed_from_u64(3);
        let out = resolve(
            None,
            &mut defender,
            &AttackDescriptor::over_time("Fire", 100, DamageClass::Fire),
            &mut rng,
            10,
        );
        assert_eq!(out.damage, 25);
    }

    #[test]
    fn lethal_damage_kills() {
        let attacker = fighter("Troll", &[]).snapshot();
        let mut defender = fighter("Goblin", &[(Stat::Hp, 5)]);
        let mut rng = StdRng::seed_from_u64(3);
        let out = resolve(
            Some(&attacker),
            &mut defender,
            &AttackDescriptor::direct("club", 50, DamageClass::Physical),
            &mut rng,
            10,
        );
        assert!(out.killed);
        assert_eq!(out.damage, 5);
        assert!(defender.is_dead());

        let again = resolve(
            Some(&attacker),
            &mut defender,
            &AttackDescriptor::direct("club", 50, DamageClass::Physical),
            &mut rng,
            10,
        );
        assert_eq!(again.result, HitResult::Ignored);
    }

    #[test]
    fn healing_is_clamped_and_adds_no_threat() {
        let healer = fighter("Elf", &[]).snapshot();
        let mut patient = fighter("Man", &[]);
        patient.take_damage(10);
        let mut rng = StdRng::seed_from_u64(3);
        let out = resolve(
            Some(&healer),
            &mut patient,
            &AttackDescriptor::direct("Cure", 50, DamageClass::Heal),
            &mut rng,
            10,
        );
        assert_eq!(out.result, HitResult::Healed);
        assert_eq!(out.healed, 10);
        assert!(patient.aggro.is_empty());
        assert_eq!(patient.combat_ticks, 0);
    }

    #[test]
    fn agile_defender_sometimes_dodges() {
        let attacker = fighter("Orc", &[]).snapshot();
        let mut rng = StdRng::seed_from_u64(11);
        let mut dodged = 0;
        for _ in 0..200 {
            let mut defender = fighter("Elf", &[(Stat::Agi, 40)]);
            let out = resolve(
                Some(&attacker),
                &mut defender,
                &AttackDescriptor::direct("claw", 5, DamageClass::Physical),
                &mut rng,
                10,
            );
            if out.result == HitResult::Dodged {
                dodged += 1;
                assert_eq!(defender.hp().current(), 100);
            }
        }
        assert!(dodged > 0);
        assert!(dodged < 200);
    }

    #[test]
    fn zero_stats_never_dodge_or_crit() {
        let attacker = fighter("Orc", &[]).snapshot();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            let mut defender = fighter("Man", &[]);
            let out = resolve(
                Some(&attacker),
                &mut defender,
                &AttackDescriptor::direct("claw", 5, DamageClass::Physical),
                &mut rng,
                10,
            );
            assert_eq!(out.result, HitResult::Hit);
        }
    }
}
