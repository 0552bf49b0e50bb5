//! Outbound notification payloads.
//!
//! The simulation never talks to sockets. It produces [`Notification`]s,
//! each an [`Audience`] plus a [`WorldEvent`], and hands them to a sink.
//! The transport collaborator decides how to fan them out.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::CharacterKind;
use crate::ids::{CharacterId, EffectId};
use crate::position::Position;

/// Who should receive a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Audience {
    /// A single character.
    Character {
        /// Recipient.
        id: CharacterId,
    },
    /// Everyone within `radius` tiles of `center`, except `exclude`.
    Nearby {
        /// Center of the area.
        center: Position,
        /// Radius in tiles.
        radius: u32,
        /// Characters that already received a personal variant.
        exclude: Vec<CharacterId>,
    },
    /// Everyone in the world.
    Broadcast,
}

/// Category of a text message, used by clients for coloring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain informational text.
    Info,
    /// Outgoing or incoming damage.
    Combat,
    /// Healing.
    Heal,
    /// Effect-related text.
    Effect,
    /// A command or cast was refused.
    Refused,
}

/// Display metadata for an effect icon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct IconData {
    /// Icon sprite name.
    pub icon: String,
    /// Optional tint color.
    #[serde(default)]
    pub color: Option<String>,
    /// Tooltip text.
    #[serde(default)]
    pub tooltip: String,
}

/// Client view of an active effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EffectView {
    /// Effect instance id.
    pub id: EffectId,
    /// Effect name.
    pub name: String,
    /// Potency.
    pub potency: u32,
    /// Remaining ticks, `None` when permanent.
    pub remaining: Option<u32>,
    /// Remaining charges.
    pub charges: Option<u32>,
    /// Icon metadata.
    pub icon: IconData,
}

/// Client view of a character entering the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NpcView {
    /// Character id.
    pub id: CharacterId,
    /// Display name.
    pub name: String,
    /// Player or NPC.
    pub kind: CharacterKind,
    /// Position.
    pub position: Position,
    /// Level.
    pub level: u32,
    /// Current health.
    pub hp: i64,
    /// Maximum health.
    pub max_hp: i64,
}

/// Something that happened in the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorldEvent {
    /// A world tick completed its character-action phase.
    Tick {
        /// Monotonic tick number.
        tick: u64,
    },
    /// An effect icon should appear.
    EffectAdded {
        /// Character carrying the effect.
        character: CharacterId,
        /// Effect view.
        effect: EffectView,
    },
    /// An effect icon should disappear.
    EffectRemoved {
        /// Character that carried the effect.
        character: CharacterId,
        /// Effect instance id.
        effect: EffectId,
        /// Effect name.
        name: String,
    },
    /// A text message.
    Message {
        /// Message category.
        kind: MessageKind,
        /// Rendered text.
        text: String,
    },
    /// A character appeared in the world.
    CharacterAdded {
        /// Character view.
        character: NpcView,
    },
    /// A character left the world.
    CharacterRemoved {
        /// Character id.
        id: CharacterId,
    },
    /// A character moved.
    CharacterMoved {
        /// Character id.
        id: CharacterId,
        /// New position.
        position: Position,
    },
    /// A character died.
    CharacterDied {
        /// Character id.
        id: CharacterId,
        /// Display name.
        name: String,
    },
}

/// A payload bound for an audience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Notification {
    /// Recipients.
    pub audience: Audience,
    /// Payload.
    pub event: WorldEvent,
}

impl Notification {
    /// A message for one character.
    pub fn to_character(id: CharacterId, kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            audience: Audience::Character { id },
            event: WorldEvent::Message {
                kind,
                text: text.into(),
            },
        }
    }

    /// An event for everyone in the world.
    pub const fn broadcast(event: WorldEvent) -> Self {
        Self {
            audience: Audience::Broadcast,
            event,
        }
    }

    /// Whether this notification is addressed to `id` personally.
    pub fn is_for(&self, id: CharacterId) -> bool {
        matches!(self.audience, Audience::Character { id: target } if target == id)
    }

    /// The message text, if this is a text message.
    pub fn text(&self) -> Option<&str> {
        match &self.event {
            WorldEvent::Message { text, .. } => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn event_is_tagged_by_type() {
        let n = Notification::broadcast(WorldEvent::Tick { tick: 7 });
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["event"]["type"], "tick");
        assert_eq!(json["audience"]["scope"], "broadcast");
    }

    #[test]
    fn personal_message_is_addressed() {
        let id = CharacterId::new();
        let n = Notification::to_character(id, MessageKind::Info, "hello");
        assert!(n.is_for(id));
        assert!(!n.is_for(CharacterId::new()));
        assert_eq!(n.text(), Some("hello"));
    }
}
