//! `Dragonfly` (Redis-compatible) storage operations.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `character:{id}:state` | JSON | Saved player state |
//! | `map:{name}:spawner_timers` | JSON | Boss-timer records of one map |
//! | `map:{name}:players` | Set | Ids of players saved from this map |

use fred::prelude::*;
use rair_core::persistence::{PersistError, PersistenceBackend};
use rair_types::{CharacterId, CharacterState, SpawnerTimerRecord};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DbError;

/// Key holding a player's saved state.
pub fn character_key(id: CharacterId) -> String {
    format!("character:{id}:state")
}

/// Key holding a map's boss timers.
pub fn timers_key(map: &str) -> String {
    format!("map:{map}:spawner_timers")
}

/// Key of the set of players last saved from a map.
pub fn players_key(map: &str) -> String {
    format!("map:{map}:players")
}

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
///
/// Wraps a [`fred::prelude::Client`] and provides typed operations for
/// the key patterns above.
#[derive(Clone)]
pub struct DragonflyStore {
    client: Client,
}

impl DragonflyStore {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    // =========================================================================
    // Generic JSON get/set/delete
    // =========================================================================

    /// Serialize `value` as JSON and store it at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if serialization fails.
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), DbError> {
        let json = serde_json::to_string(value)?;
        let _: () = self.client.set(key, json.as_str(), None, None, false).await?;
        Ok(())
    }

    /// Read the value at `key` and deserialize it from JSON. A missing key
    /// is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if deserialization fails.
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DbError> {
        let value: Option<String> = self.client.get(key).await?;
        value.map_or(Ok(None), |s| Ok(Some(serde_json::from_str(&s)?)))
    }

    /// Delete a key from `Dragonfly`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the delete fails.
    pub async fn delete(&self, key: &str) -> Result<(), DbError> {
        let _: u32 = self.client.del(key).await?;
        Ok(())
    }

    // =========================================================================
    // Players -- character:{id}:state, map:{name}:players
    // =========================================================================

    /// Store a player's state and record them under their map.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or either write fails.
    pub async fn set_character(&self, state: &CharacterState) -> Result<(), DbError> {
        self.set_json(&character_key(state.id), state).await?;
        let _: u32 = self
            .client
            .sadd(players_key(&state.map), state.id.to_string().as_str())
            .await?;
        Ok(())
    }

    /// Read a player's saved state.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read or deserialization fails.
    pub async fn get_character(&self, id: CharacterId) -> Result<Option<CharacterState>, DbError> {
        self.get_json(&character_key(id)).await
    }

    /// Forget a player entirely.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if a delete fails.
    pub async fn delete_character(&self, id: CharacterId, map: &str) -> Result<(), DbError> {
        self.delete(&character_key(id)).await?;
        let _: u32 = self
            .client
            .srem(players_key(map), id.to_string().as_str())
            .await?;
        Ok(())
    }

    /// Ids of every player last saved from `map`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] for a stored id that does not parse.
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn get_map_players(&self, map: &str) -> Result<Vec<CharacterId>, DbError> {
        let members: Vec<String> = self.client.smembers(players_key(map)).await?;
        let mut ids = Vec::with_capacity(members.len());
        for m in &members {
            let id = m.parse::<CharacterId>().map_err(|e| {
                DbError::Config(format!("Invalid character id in {}: {e}", players_key(map)))
            })?;
            ids.push(id);
        }
        Ok(ids)
    }

    // =========================================================================
    // Boss timers -- map:{name}:spawner_timers
    // =========================================================================

    /// Replace a map's boss-timer records.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or the write fails.
    pub async fn set_spawner_timers(
        &self,
        map: &str,
        records: &[SpawnerTimerRecord],
    ) -> Result<(), DbError> {
        self.set_json(&timers_key(map), &records).await
    }

    /// A map's boss-timer records, empty when none were saved.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read or deserialization fails.
    pub async fn get_spawner_timers(&self, map: &str) -> Result<Vec<SpawnerTimerRecord>, DbError> {
        Ok(self.get_json(&timers_key(map)).await?.unwrap_or_default())
    }

    /// Flush all keys from the `Dragonfly` instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), DbError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }

    /// Return a reference to the underlying [`Client`].
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

impl PersistenceBackend for DragonflyStore {
    async fn load_character(&self, id: CharacterId) -> Result<Option<CharacterState>, PersistError> {
        Ok(self.get_character(id).await?)
    }

    async fn save_character(&self, state: &CharacterState) -> Result<(), PersistError> {
        Ok(self.set_character(state).await?)
    }

    async fn load_spawner_timers(&self, map: &str) -> Result<Vec<SpawnerTimerRecord>, PersistError> {
        Ok(self.get_spawner_timers(map).await?)
    }

    async fn save_spawner_timers(
        &self,
        map: &str,
        records: &[SpawnerTimerRecord],
    ) -> Result<(), PersistError> {
        Ok(self.set_spawner_timers(map, records).await?)
    }
}
