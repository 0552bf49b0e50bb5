//! NPC definitions.
//!
//! Content is loaded once with the configuration and shared by every
//! world as an immutable [`ContentCatalog`]. Spawners turn a definition
//! into a fresh NPC through [`ContentCatalog::instantiate`].

use std::collections::BTreeMap;

use rair_characters::effects::EffectCatalog;
use rair_characters::{Character, CharacterCore};
use rair_types::{Alignment, CharacterId, CharacterKind, Stat};
use serde::Deserialize;

/// Content id of the pet created by familiar summoning.
pub const FAMILIAR: &str = "familiar";

/// Stats raised by a quarter on elite spawns.
const ELITE_STATS: [Stat; 5] = [Stat::Str, Stat::Dex, Stat::Agi, Stat::Int, Stat::Wis];

/// Errors raised while resolving content.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// No definition with this id exists.
    #[error("unknown npc: {id}")]
    UnknownNpc {
        /// Requested content id.
        id: String,
    },

    /// A definition names an effect the catalog does not know.
    #[error("npc {id} references unknown effect {effect}")]
    UnknownEffect {
        /// Content id.
        id: String,
        /// Effect name.
        effect: String,
    },
}

/// Static description of one kind of NPC.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NpcDefinition {
    /// Display name.
    pub name: String,

    /// Level.
    #[serde(default = "default_level")]
    pub level: u32,

    /// Alignment.
    #[serde(default)]
    pub alignment: Alignment,

    /// Base stats.
    #[serde(default)]
    pub stats: BTreeMap<Stat, i64>,

    /// Trait levels. `Aggressive` makes the NPC attack players on sight.
    #[serde(default)]
    pub traits: BTreeMap<String, u32>,

    /// Skill levels. A `combust` level lets the NPC cast it.
    #[serde(default)]
    pub skills: BTreeMap<String, u32>,

    /// Effects put on the NPC permanently when it spawns.
    #[serde(default)]
    pub effects: Vec<String>,
}

/// A freshly created NPC and the effects to cast on it.
#[derive(Debug)]
pub struct NpcInstance {
    /// The NPC.
    pub character: Character,
    /// Permanent effects from its definition.
    pub effects: Vec<String>,
}

/// Every NPC definition, keyed by content id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentCatalog {
    definitions: BTreeMap<String, NpcDefinition>,
}

impl Default for ContentCatalog {
    fn default() -> Self {
        Self {
            definitions: BTreeMap::from([(FAMILIAR.to_owned(), familiar())]),
        }
    }
}

impl ContentCatalog {
    /// Build a catalog, adding the familiar if it is not defined.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::UnknownEffect`] if a definition references
    /// an effect `effects` does not contain.
    pub fn new(
        definitions: BTreeMap<String, NpcDefinition>,
        effects: &EffectCatalog,
    ) -> Result<Self, ContentError> {
        for (id, definition) in &definitions {
            if let Some(unknown) = definition.effects.iter().find(|e| !effects.contains(e)) {
                return Err(ContentError::UnknownEffect {
                    id: id.clone(),
                    effect: unknown.clone(),
                });
            }
        }
        let mut catalog = Self { definitions };
        catalog
            .definitions
            .entry(FAMILIAR.to_owned())
            .or_insert_with(familiar);
        Ok(catalog)
    }

    /// Look a definition up.
    pub fn get(&self, id: &str) -> Option<&NpcDefinition> {
        self.definitions.get(id)
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether there are no definitions.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Create a new NPC from a definition.
    ///
    /// Elite variants get double health and a quarter more of each
    /// primary stat.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::UnknownNpc`] if `id` is not defined.
    pub fn instantiate(&self, id: &str, elite: bool) -> Result<NpcInstance, ContentError> {
        let definition = self.get(id).ok_or_else(|| ContentError::UnknownNpc { id: id.to_owned() })?;

        let mut stats = definition.stats.clone();
        let mut name = definition.name.clone();
        if elite {
            if let Some(hp) = stats.get_mut(&Stat::Hp) {
                *hp = hp.saturating_mul(2);
            }
            for stat in ELITE_STATS {
                if let Some(value) = stats.get_mut(&stat) {
                    *value = value.saturating_add(value.checked_div(4).unwrap_or(0));
                }
            }
            name = format!("elite {name}");
        }

        let mut core = CharacterCore::new(CharacterId::new(), name, CharacterKind::Npc, stats);
        core.level = definition.level;
        core.alignment = definition.alignment;
        core.traits.clone_from(&definition.traits);
        core.skills.clone_from(&definition.skills);

        Ok(NpcInstance {
            character: Character::new(core),
            effects: definition.effects.clone(),
        })
    }
}

fn familiar() -> NpcDefinition {
    NpcDefinition {
        name: "familiar".to_owned(),
        level: 1,
        alignment: Alignment::Neutral,
        stats: BTreeMap::from([
            (Stat::Hp, 30),
            (Stat::Str, 5),
            (Stat::Dex, 4),
            (Stat::Agi, 4),
            (Stat::ActionSpeed, 1),
        ]),
        traits: BTreeMap::new(),
        skills: BTreeMap::new(),
        effects: Vec::new(),
    }
}

const fn default_level() -> u32 {
    1
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rat() -> NpcDefinition {
        NpcDefinition {
            name: "rat".to_owned(),
            level: 2,
            alignment: Alignment::Evil,
            stats: BTreeMap::from([(Stat::Hp, 10), (Stat::Str, 8)]),
            traits: BTreeMap::new(),
            skills: BTreeMap::new(),
            effects: vec!["Invisible".to_owned()],
        }
    }

    fn catalog() -> ContentCatalog {
        ContentCatalog::new(BTreeMap::from([("rat".to_owned(), rat())]), &EffectCatalog::standard()).unwrap()
    }

    #[test]
    fn familiar_is_always_available() {
        let c = catalog();
        assert!(c.get(FAMILIAR).is_some());
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn instantiate_builds_a_full_health_npc() {
        let npc = catalog().instantiate("rat", false).unwrap();
        let core = &npc.character.core;
        assert_eq!(core.kind, CharacterKind::Npc);
        assert_eq!(core.level, 2);
        assert_eq!(core.hp().current(), 10);
        assert_eq!(npc.effects, vec!["Invisible".to_owned()]);
    }

    #[test]
    fn elite_doubles_health_and_raises_stats() {
        let npc = catalog().instantiate("rat", true).unwrap();
        assert_eq!(npc.character.core.hp().maximum(), 20);
        assert_eq!(npc.character.core.stat(Stat::Str), 10);
        assert!(npc.character.core.name.starts_with("elite"));
    }

    #[test]
    fn unknown_npc_is_an_error() {
        assert!(matches!(
            catalog().instantiate("dragon", false),
            Err(ContentError::UnknownNpc { .. })
        ));
    }

    #[test]
    fn unknown_effect_is_rejected_at_load() {
        let mut bad = rat();
        bad.effects = vec!["Levitate".to_owned()];
        let err = ContentCatalog::new(BTreeMap::from([("rat".to_owned(), bad)]), &EffectCatalog::standard());
        assert!(matches!(err, Err(ContentError::UnknownEffect { .. })));
    }
}
