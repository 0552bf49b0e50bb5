//! Integration tests for the `rair-db` storage layer.
//!
//! These tests require a live `Dragonfly` instance. Run with:
//!
//! ```bash
//! docker run -d -p 6379:6379 docker.dragonflydb.io/dragonflydb/dragonfly
//! cargo test -p rair-db -- --ignored
//! ```
//!
//! All tests are marked `#[ignore]` so they are skipped during normal
//! `cargo test` runs.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;

use rair_core::persistence::{PersistRequest, PersistenceBackend, PersistenceHandle, spawn_worker};
use rair_db::DragonflyStore;
use rair_types::{CharacterId, CharacterState, SpawnerTimerRecord};

/// Dragonfly connection URL for the local Docker instance.
const DRAGONFLY_URL: &str = "redis://localhost:6379";

async fn store() -> DragonflyStore {
    let store = DragonflyStore::connect(DRAGONFLY_URL)
        .await
        .expect("Failed to connect to Dragonfly -- is Docker running?");
    store.flush_all().await.expect("Failed to flush");
    store
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance"]
async fn character_state_roundtrip() {
    let store = store().await;
    let mut state = CharacterState::fresh(CharacterId::new(), "Ayla", 40);
    state.map = "overworld".to_owned();
    state.level = 4;

    assert!(store.get_character(state.id).await.unwrap().is_none());
    store.set_character(&state).await.unwrap();
    assert_eq!(store.get_character(state.id).await.unwrap(), Some(state.clone()));
    assert_eq!(store.get_map_players("overworld").await.unwrap(), vec![state.id]);

    store.delete_character(state.id, "overworld").await.unwrap();
    assert!(store.get_character(state.id).await.unwrap().is_none());
    assert!(store.get_map_players("overworld").await.unwrap().is_empty());

    store.flush_all().await.unwrap();
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance"]
async fn spawner_timers_are_replaced_per_map() {
    let store = store().await;
    assert!(store.get_spawner_timers("keep").await.unwrap().is_empty());

    let record = SpawnerTimerRecord {
        x: 0,
        y: 10,
        current_tick: 42,
        timestamp: 1_000,
    };
    store.set_spawner_timers("keep", &[record]).await.unwrap();
    assert_eq!(store.get_spawner_timers("keep").await.unwrap(), vec![record]);

    store.set_spawner_timers("keep", &[]).await.unwrap();
    assert!(store.get_spawner_timers("keep").await.unwrap().is_empty());

    store.flush_all().await.unwrap();
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance"]
async fn persistence_worker_writes_through_the_store() {
    let store = Arc::new(store().await);
    let (handle, rx) = PersistenceHandle::channel(8);
    let worker = spawn_worker(Arc::clone(&store), rx);

    let state = CharacterState::fresh(CharacterId::new(), "Bren", 30);
    assert!(handle.submit(PersistRequest::SaveCharacter(Box::new(state.clone()))));
    drop(handle);
    let stats = worker.await.unwrap();
    assert_eq!(stats.written, 1);

    assert_eq!(store.load_character(state.id).await.unwrap(), Some(state));
    store.flush_all().await.unwrap();
}
