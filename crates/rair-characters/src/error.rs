//! Error types for character and effect operations.

use rair_types::CharacterId;

/// Errors raised while mutating a character or running an effect hook.
///
/// These are per-entity failures. The world scheduler logs them and moves
/// on to the next entity; none of them is fatal to a tick.
#[derive(Debug, thiserror::Error)]
pub enum CharacterError {
    /// A stat or resource computation overflowed.
    #[error("arithmetic overflow in {context}")]
    ArithmeticOverflow {
        /// What was being computed.
        context: String,
    },

    /// No effect with this name is registered in the catalog.
    #[error("unknown effect: {name}")]
    UnknownEffect {
        /// The requested effect name.
        name: String,
    },

    /// An effect hook failed.
    #[error("effect {effect} failed on {character}: {reason}")]
    EffectHook {
        /// Effect name.
        effect: String,
        /// Character carrying the effect.
        character: CharacterId,
        /// Failure description.
        reason: String,
    },
}

/// A cast whose preconditions were not met.
///
/// This is a validation outcome, not a fault: no state was touched. The
/// optional message is shown to the caster.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cast rejected")]
pub struct CastRejection {
    /// User-facing explanation, if any.
    pub message: Option<String>,
}

impl CastRejection {
    /// A rejection with a message for the caster.
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// A silent rejection.
    pub const fn silent() -> Self {
        Self { message: None }
    }
}
