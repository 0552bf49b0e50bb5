//! Fire-and-forget persistence.
//!
//! The tick loop never awaits storage. Saves are submitted to a bounded
//! channel with [`PersistenceHandle::submit`]; a background worker drains
//! the channel and calls the [`PersistenceBackend`]. A full channel drops
//! the request, and a failed write is logged and forgotten. The next
//! persistence tick writes the then-current state again. Shutdown saves
//! have no next tick, so they go through [`PersistenceHandle::send`] and
//! wait for room instead.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rair_types::{CharacterId, CharacterState, SpawnerTimerRecord};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Errors reported by a persistence backend.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// The storage service failed.
    #[error("storage backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// A record could not be encoded or decoded.
    #[error("serialization error: {source}")]
    Serialization {
        /// The underlying serde error.
        #[from]
        source: serde_json::Error,
    },
}

/// Storage for player state and boss timers.
pub trait PersistenceBackend: Send + Sync + 'static {
    /// Saved state of a player, if any.
    fn load_character(
        &self,
        id: CharacterId,
    ) -> impl Future<Output = Result<Option<CharacterState>, PersistError>> + Send;

    /// Overwrite a player's saved state.
    fn save_character(
        &self,
        state: &CharacterState,
    ) -> impl Future<Output = Result<(), PersistError>> + Send;

    /// Boss-timer records saved for a map.
    fn load_spawner_timers(
        &self,
        map: &str,
    ) -> impl Future<Output = Result<Vec<SpawnerTimerRecord>, PersistError>> + Send;

    /// Overwrite a map's boss-timer records.
    fn save_spawner_timers(
        &self,
        map: &str,
        records: &[SpawnerTimerRecord],
    ) -> impl Future<Output = Result<(), PersistError>> + Send;
}

/// A write waiting for the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistRequest {
    /// Save one player.
    SaveCharacter(Box<CharacterState>),
    /// Save a map's boss timers.
    SaveSpawnerTimers {
        /// Map name.
        map: String,
        /// Records to store.
        records: Vec<SpawnerTimerRecord>,
    },
}

/// Submitting end of the persistence channel.
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    tx: mpsc::Sender<PersistRequest>,
}

impl PersistenceHandle {
    /// A handle and the receiver a worker should drain.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PersistRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// A handle whose requests go nowhere.
    pub fn disconnected() -> Self {
        let (handle, _rx) = Self::channel(1);
        handle
    }

    /// Queue a write without waiting. Returns whether it was accepted.
    pub fn submit(&self, request: PersistRequest) -> bool {
        match self.tx.try_send(request) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(request = request_kind(&dropped), "Persistence channel full, request dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                debug!(request = request_kind(&dropped), "Persistence channel closed");
                false
            }
        }
    }

    /// Queue a write, waiting for room in the channel. Returns whether the
    /// worker is still there to take it.
    ///
    /// Used on shutdown, where a dropped request would not be retried.
    pub async fn send(&self, request: PersistRequest) -> bool {
        match self.tx.send(request).await {
            Ok(()) => true,
            Err(mpsc::error::SendError(dropped)) => {
                debug!(request = request_kind(&dropped), "Persistence channel closed");
                false
            }
        }
    }
}

const fn request_kind(request: &PersistRequest) -> &'static str {
    match request {
        PersistRequest::SaveCharacter(_) => "save_character",
        PersistRequest::SaveSpawnerTimers { .. } => "save_spawner_timers",
    }
}

/// Outcome counts of a finished worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Writes that succeeded.
    pub written: u64,
    /// Writes that failed.
    pub failed: u64,
}

/// Drain `rx` until every handle is dropped, writing each request.
pub async fn run_worker<B: PersistenceBackend>(
    backend: Arc<B>,
    mut rx: mpsc::Receiver<PersistRequest>,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    while let Some(request) = rx.recv().await {
        let result = match &request {
            PersistRequest::SaveCharacter(state) => backend.save_character(state).await,
            PersistRequest::SaveSpawnerTimers { map, records } => {
                backend.save_spawner_timers(map, records).await
            }
        };
        match result {
            Ok(()) => stats.written = stats.written.saturating_add(1),
            Err(e) => {
                stats.failed = stats.failed.saturating_add(1);
                warn!(request = request_kind(&request), error = %e, "Persistence write failed");
            }
        }
    }
    debug!(written = stats.written, failed = stats.failed, "Persistence worker stopped");
    stats
}

/// Spawn [`run_worker`] on the current runtime.
pub fn spawn_worker<B: PersistenceBackend>(
    backend: Arc<B>,
    rx: mpsc::Receiver<PersistRequest>,
) -> JoinHandle<WorkerStats> {
    tokio::spawn(run_worker(backend, rx))
}

/// In-process backend for tests and servers without storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    characters: Mutex<BTreeMap<CharacterId, CharacterState>>,
    timers: Mutex<BTreeMap<String, Vec<SpawnerTimerRecord>>>,
    failing: AtomicBool,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every save fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// Number of stored players.
    pub async fn character_count(&self) -> usize {
        self.characters.lock().await.len()
    }

    fn check(&self) -> Result<(), PersistError> {
        if self.failing.load(Ordering::Acquire) {
            return Err(PersistError::Backend {
                message: "memory store set to fail".to_owned(),
            });
        }
        Ok(())
    }
}

impl PersistenceBackend for MemoryStore {
    async fn load_character(&self, id: CharacterId) -> Result<Option<CharacterState>, PersistError> {
        Ok(self.characters.lock().await.get(&id).cloned())
    }

    async fn save_character(&self, state: &CharacterState) -> Result<(), PersistError> {
        self.check()?;
        self.characters.lock().await.insert(state.id, state.clone());
        Ok(())
    }

    async fn load_spawner_timers(&self, map: &str) -> Result<Vec<SpawnerTimerRecord>, PersistError> {
        Ok(self.timers.lock().await.get(map).cloned().unwrap_or_default())
    }

    async fn save_spawner_timers(
        &self,
        map: &str,
        records: &[SpawnerTimerRecord],
    ) -> Result<(), PersistError> {
        self.check()?;
        self.timers.lock().await.insert(map.to_owned(), records.to_vec());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn state(name: &str) -> CharacterState {
        CharacterState::fresh(CharacterId::new(), name, 20)
    }

    #[tokio::test]
    async fn worker_writes_submitted_requests() {
        let store = Arc::new(MemoryStore::new());
        let (handle, rx) = PersistenceHandle::channel(8);
        let worker = spawn_worker(Arc::clone(&store), rx);

        let saved = state("Ayla");
        assert!(handle.submit(PersistRequest::SaveCharacter(Box::new(saved.clone()))));
        assert!(handle.submit(PersistRequest::SaveSpawnerTimers {
            map: "cave".to_owned(),
            records: vec![SpawnerTimerRecord {
                x: 1,
                y: 2,
                current_tick: 3,
                timestamp: 4,
            }],
        }));
        drop(handle);

        let stats = worker.await.unwrap();
        assert_eq!(stats, WorkerStats { written: 2, failed: 0 });
        assert_eq!(store.load_character(saved.id).await.unwrap(), Some(saved));
        assert_eq!(store.load_spawner_timers("cave").await.unwrap().len(), 1);
    }

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (handle, _rx) = PersistenceHandle::channel(1);
        assert!(handle.submit(PersistRequest::SaveCharacter(Box::new(state("a")))));
        assert!(!handle.submit(PersistRequest::SaveCharacter(Box::new(state("b")))));
    }

    #[test]
    fn disconnected_handle_accepts_nothing() {
        let handle = PersistenceHandle::disconnected();
        assert!(!handle.submit(PersistRequest::SaveCharacter(Box::new(state("a")))));
    }

    #[tokio::test]
    async fn failed_writes_are_counted_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.set_failing(true);
        let (handle, rx) = PersistenceHandle::channel(8);
        let worker = spawn_worker(Arc::clone(&store), rx);
        assert!(handle.submit(PersistRequest::SaveCharacter(Box::new(state("a")))));
        drop(handle);
        let stats = worker.await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(store.character_count().await, 0);
    }
}
