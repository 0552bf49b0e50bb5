//! World loop runner with operator controls.
//!
//! [`run_world`] drives one world on a fixed period: each period it
//! drains the inbound queue, runs one tick, and reports the summary to a
//! [`TickCallback`]. It stops when asked through [`WorldControl`] or after
//! a bounded number of ticks, then saves everything through
//! [`World::shutdown`].
//!
//! Loading saved players happens off the loop in [`route_inbound`], so
//! the tick never waits on storage.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use rair_types::{CharacterState, InboundMessage};
use tokio::sync::{Notify, mpsc};
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{info, warn};

use crate::persistence::PersistenceBackend;
use crate::tick::{self, TickError, TickSummary};
use crate::world::{ShutdownReport, World, WorldInput};

/// Errors that can occur while running a world.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A tick execution failed.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: TickError,
    },
}

/// Shared control state for one running world.
///
/// Wrapped in [`Arc`] and shared between the world task and whoever
/// operates it (signal handlers, admin tooling).
#[derive(Debug, Default)]
pub struct WorldControl {
    paused: AtomicBool,
    resume_notify: Notify,
    stop_requested: AtomicBool,
    stop_notify: Notify,
}

impl WorldControl {
    /// A running, unpaused control.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether ticks are suspended.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Suspend ticking. Inbound traffic keeps queueing.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        info!("World paused by operator");
    }

    /// Resume ticking.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.resume_notify.notify_waiters();
        info!("World resumed by operator");
    }

    /// Ask the loop to stop after the current tick.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
        self.resume_notify.notify_waiters();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Resolves once a stop is requested.
    pub async fn stopped(&self) {
        loop {
            let notified = self.stop_notify.notified();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }

    async fn wait_if_paused(&self) {
        loop {
            let notified = self.resume_notify.notified();
            if !self.is_paused() || self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }
}

/// Callback invoked after each tick.
pub trait TickCallback: Send {
    /// Called after a tick completes.
    fn on_tick(&mut self, summary: &TickSummary, world: &World);
}

/// A callback that does nothing.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _summary: &TickSummary, _world: &World) {}
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Non-idle ticks executed.
    pub total_ticks: u64,
    /// The last summary, if any tick ran.
    pub final_summary: Option<TickSummary>,
    /// What the shutdown saved.
    pub shutdown: ShutdownReport,
}

/// Run `world` until stopped, or until `max_ticks` non-idle ticks have
/// run when it is not zero.
///
/// # Errors
///
/// Returns [`RunnerError`] if a tick fails unrecoverably. The world is
/// not shut down in that case.
pub async fn run_world(
    world: &mut World,
    inputs: &mut mpsc::Receiver<WorldInput>,
    control: &Arc<WorldControl>,
    callback: &mut dyn TickCallback,
    max_ticks: u64,
) -> Result<RunResult, RunnerError> {
    let period = Duration::from_millis(world.settings().tick_period_ms.max(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut total_ticks: u64 = 0;
    let mut final_summary = None;
    info!(map = %world.map(), tick_period_ms = world.settings().tick_period_ms, max_ticks, "World starting");

    loop {
        if control.is_paused() {
            control.wait_if_paused().await;
        }
        tokio::select! {
            biased;
            () = control.stopped() => {
                info!(map = %world.map(), "Operator stop requested");
                break;
            }
            _ = interval.tick() => {}
        }

        while let Ok(input) = inputs.try_recv() {
            world.handle_input(input);
        }

        let summary = tick::run_tick(world)?;
        if !summary.idle {
            total_ticks = total_ticks.saturating_add(1);
        }
        callback.on_tick(&summary, world);
        final_summary = Some(summary);

        if max_ticks > 0 && total_ticks >= max_ticks {
            info!(map = %world.map(), total_ticks, "Tick limit reached");
            break;
        }
    }

    let shutdown = world.shutdown(Utc::now().timestamp_millis()).await;
    info!(map = %world.map(), total_ticks, final_tick = world.tick(), "World stopped");
    Ok(RunResult {
        total_ticks,
        final_summary,
        shutdown,
    })
}

/// Turn transport messages into world inputs, loading saved players on
/// join. Players without saved state start fresh with `starting_hp`; a
/// failed load refuses the join rather than risk overwriting a save.
///
/// Returns the number of messages forwarded once `inbound` closes or the
/// world goes away.
pub async fn route_inbound<B: PersistenceBackend>(
    backend: Arc<B>,
    mut inbound: mpsc::Receiver<InboundMessage>,
    world: mpsc::Sender<WorldInput>,
    starting_hp: i64,
) -> u64 {
    let mut forwarded: u64 = 0;
    while let Some(message) = inbound.recv().await {
        let input = match message {
            InboundMessage::Join { character, name } => match backend.load_character(character).await {
                Ok(Some(state)) => WorldInput::Admit(Box::new(state)),
                Ok(None) => WorldInput::Admit(Box::new(CharacterState::fresh(character, &name, starting_hp))),
                Err(e) => {
                    warn!(character_id = %character, error = %e, "Player load failed, join refused");
                    continue;
                }
            },
            InboundMessage::Leave { character } => WorldInput::Depart { character },
            InboundMessage::Command { character, line } => WorldInput::Command { character, line },
        };
        if world.send(input).await.is_err() {
            break;
        }
        forwarded = forwarded.saturating_add(1);
    }
    forwarded
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rair_types::CharacterId;

    use super::*;
    use crate::persistence::{MemoryStore, PersistRequest, PersistenceHandle};
    use crate::world::{WorldServices, WorldSettings};

    struct Counting(u64);

    impl TickCallback for Counting {
        fn on_tick(&mut self, _summary: &TickSummary, _world: &World) {
            self.0 = self.0.saturating_add(1);
        }
    }

    fn world() -> World {
        World::new(WorldSettings::for_map("test"), WorldServices::standalone()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn runs_until_the_tick_limit() {
        let mut w = world();
        let (tx, mut rx) = mpsc::channel(8);
        let control = Arc::new(WorldControl::new());
        let id = CharacterId::new();
        tx.send(WorldInput::Admit(Box::new(CharacterState::fresh(id, "Ayla", 30))))
            .await
            .unwrap();

        let mut counting = Counting(0);
        let result = run_world(&mut w, &mut rx, &control, &mut counting, 3).await.unwrap();
        assert_eq!(result.total_ticks, 3);
        assert_eq!(counting.0, 3);
        assert_eq!(w.tick(), 3);
        assert!(w.character(id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_request_ends_the_loop() {
        let mut w = world();
        let (_tx, mut rx) = mpsc::channel(8);
        let control = Arc::new(WorldControl::new());
        control.request_stop();
        let result = run_world(&mut w, &mut rx, &control, &mut NoOpCallback, 0).await.unwrap();
        assert_eq!(result.total_ticks, 0);
        assert!(result.final_summary.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn paused_world_stops_cleanly() {
        let mut w = world();
        let (_tx, mut rx) = mpsc::channel(8);
        let control = Arc::new(WorldControl::new());
        control.pause();
        let stopper = Arc::clone(&control);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            stopper.request_stop();
        });
        let result = run_world(&mut w, &mut rx, &control, &mut NoOpCallback, 0).await.unwrap();
        assert!(result.final_summary.is_none());
    }

    #[tokio::test]
    async fn router_loads_saved_players_and_creates_new_ones() {
        let store = Arc::new(MemoryStore::new());
        let (handle, persist_rx) = PersistenceHandle::channel(4);
        let worker = crate::persistence::spawn_worker(Arc::clone(&store), persist_rx);
        let mut saved = CharacterState::fresh(CharacterId::new(), "Veteran", 80);
        saved.level = 7;
        handle.submit(PersistRequest::SaveCharacter(Box::new(saved.clone())));
        drop(handle);
        worker.await.unwrap();

        let (in_tx, in_rx) = mpsc::channel(8);
        let (world_tx, mut world_rx) = mpsc::channel(8);
        let newcomer = CharacterId::new();
        in_tx
            .send(InboundMessage::Join {
                character: saved.id,
                name: "ignored".to_owned(),
            })
            .await
            .unwrap();
        in_tx
            .send(InboundMessage::Join {
                character: newcomer,
                name: "Fresh".to_owned(),
            })
            .await
            .unwrap();
        in_tx
            .send(InboundMessage::Leave { character: newcomer })
            .await
            .unwrap();
        drop(in_tx);

        let forwarded = route_inbound(store, in_rx, world_tx, 25).await;
        assert_eq!(forwarded, 3);

        assert!(matches!(
            world_rx.recv().await,
            Some(WorldInput::Admit(first)) if first.level == 7
        ));
        assert!(matches!(
            world_rx.recv().await,
            Some(WorldInput::Admit(second)) if second.name == "Fresh" && second.hp == 25
        ));
        assert_eq!(
            world_rx.recv().await,
            Some(WorldInput::Depart { character: newcomer })
        );
    }
}
