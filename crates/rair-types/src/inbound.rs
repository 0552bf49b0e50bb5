//! Messages the transport collaborator delivers into a world.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::CharacterId;

/// An inbound transport message addressed to one world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// A player entered this world. The engine loads their saved state.
    Join {
        /// Player id.
        character: CharacterId,
        /// Display name, used when no saved state exists.
        name: String,
    },
    /// A player left this world.
    Leave {
        /// Player id.
        character: CharacterId,
    },
    /// A text command for a player's action queue.
    Command {
        /// Player id.
        character: CharacterId,
        /// Raw command line, e.g. `attack 0191...`.
        line: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn command_parses_from_json() {
        let id = CharacterId::new();
        let json = format!(r#"{{"type":"command","character":"{id}","line":"move 1 0"}}"#);
        let msg: InboundMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Command {
                character: id,
                line: "move 1 0".to_owned(),
            }
        );
    }
}
