//! World server binary for the Rair simulation.
//!
//! This is the main entry point that wires configuration, storage, the
//! NATS transport, and one world task per configured map. It runs until
//! interrupted, then stops every world and waits for their final saves.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `rair-config.yaml` (or `RAIR_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Connect storage: Dragonfly when configured, in-memory otherwise
//! 4. Build the effect and NPC catalogs
//! 5. Connect to NATS when configured
//! 6. Per map: build the world, restore boss timers, start its tasks
//! 7. Wait for Ctrl-C, stop every world, flush persistence

mod error;
mod nats_bridge;
mod status;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use rair_characters::effects::EffectCatalog;
use rair_core::config::{LogFormat, LoggingConfig, MapConfig, RairConfig};
use rair_core::content::ContentCatalog;
use rair_core::geometry;
use rair_core::notify::{ChannelSink, NotificationSink, TracingSink};
use rair_core::persistence::{MemoryStore, PersistenceBackend, PersistenceHandle, spawn_worker};
use rair_core::runner::{self, RunResult, RunnerError, WorldControl};
use rair_core::world::{World, WorldServices, WorldSettings};
use rair_db::DragonflyStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::status::StatusCallback;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "rair-config.yaml";

/// Capacity of each map's inbound and notification channels.
const TRAFFIC_CHANNEL_CAPACITY: usize = 1024;

/// A running map.
struct MapTask {
    name: String,
    control: Arc<WorldControl>,
    handle: JoinHandle<Result<RunResult, RunnerError>>,
}

/// Application entry point for the world server.
///
/// # Errors
///
/// Returns an error if any initialization step fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, config_path) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("rair-engine starting");
    match &config_path {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Config file not found, using defaults"),
    }
    info!(
        tick_period_ms = config.server.tick_period_ms,
        seed = config.server.seed,
        maps = config.maps.len(),
        npc_definitions = config.content.len(),
        "Server configuration"
    );

    // 3. Connect storage and serve.
    match config.infrastructure.dragonfly_url.clone() {
        Some(url) => {
            info!(dragonfly_url = %url, "Connecting to Dragonfly");
            let store = DragonflyStore::connect(&url).await.map_err(EngineError::from)?;
            serve(&config, &Arc::new(store)).await?;
        }
        None => {
            warn!("No Dragonfly configured, player saves last only as long as the process");
            serve(&config, &Arc::new(MemoryStore::new())).await?;
        }
    }

    info!("rair-engine shutdown complete");
    Ok(())
}

/// Run every configured map against `backend` until interrupted.
async fn serve<B: PersistenceBackend>(config: &RairConfig, backend: &Arc<B>) -> Result<(), EngineError> {
    // 4. Catalogs.
    let effects = Arc::new(EffectCatalog::standard());
    let content = Arc::new(ContentCatalog::new(config.content.clone(), &effects)?);
    info!(effects = effects.names().count(), npcs = content.len(), "Catalogs built");

    // 5. Transport.
    let nats = match &config.infrastructure.nats_url {
        Some(url) => {
            info!(nats_url = %url, "Connecting to NATS");
            let client = async_nats::connect(url.as_str())
                .await
                .map_err(|source| EngineError::NatsConnect {
                    url: url.clone(),
                    source,
                })?;
            Some(client)
        }
        None => {
            warn!("No NATS configured, worlds accept no players");
            None
        }
    };

    let (persistence, persist_rx) = PersistenceHandle::channel(config.persistence.channel_capacity);
    let worker = spawn_worker(Arc::clone(backend), persist_rx);

    // 6. One world per map.
    let mut tasks = Vec::with_capacity(config.maps.len());
    for map in &config.maps {
        let task = start_map(
            config,
            map,
            Arc::clone(&effects),
            Arc::clone(&content),
            nats.as_ref(),
            backend,
            persistence.clone(),
        )
        .await?;
        tasks.push(task);
    }
    drop(persistence);

    // 7. Wait for Ctrl-C.
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C, stopping now");
    }
    info!(maps = tasks.len(), "Stopping worlds");
    for task in &tasks {
        task.control.request_stop();
    }

    let mut failure = None;
    for task in tasks {
        match task.handle.await {
            Ok(Ok(result)) => {
                info!(
                    map = %task.name,
                    total_ticks = result.total_ticks,
                    players_saved = result.shutdown.players_saved,
                    timers_saved = result.shutdown.timers_saved,
                    "World finished"
                );
            }
            Ok(Err(e)) => {
                error!(map = %task.name, error = %e, "World failed");
                failure.get_or_insert(EngineError::from(e));
            }
            Err(e) => {
                error!(map = %task.name, error = %e, "World task aborted");
                failure.get_or_insert(EngineError::Task {
                    task: task.name,
                    source: e,
                });
            }
        }
    }

    let stats = worker.await.map_err(|source| EngineError::Task {
        task: "persistence".to_owned(),
        source,
    })?;
    info!(written = stats.written, failed = stats.failed, "Persistence flushed");

    failure.map_or(Ok(()), Err)
}

/// Build one map's world and start its loop, router, and transport tasks.
async fn start_map<B: PersistenceBackend>(
    config: &RairConfig,
    map: &MapConfig,
    effects: Arc<EffectCatalog>,
    content: Arc<ContentCatalog>,
    nats: Option<&async_nats::Client>,
    backend: &Arc<B>,
    persistence: PersistenceHandle,
) -> Result<MapTask, EngineError> {
    let sink: Box<dyn NotificationSink> = match nats {
        Some(client) => {
            let (sink, batches) = ChannelSink::channel(TRAFFIC_CHANNEL_CAPACITY);
            tokio::spawn(nats_bridge::publish_notifications(
                client.clone(),
                map.name.clone(),
                batches,
            ));
            Box::new(sink)
        }
        None => Box::new(TracingSink),
    };

    let mut world = World::new(
        WorldSettings::from_config(config, map),
        WorldServices {
            catalog: effects,
            content,
            geometry: geometry::for_map(map),
            sink,
            persistence,
        },
    )?;
    for definition in &map.spawners {
        world.add_spawner(&definition.name, definition.anchor, definition.config.clone())?;
    }

    match backend.load_spawner_timers(&map.name).await {
        Ok(records) => {
            let restored = world.restore_spawner_timers(&records, Utc::now().timestamp_millis());
            info!(map = %map.name, saved = records.len(), restored, "Boss timers loaded");
        }
        Err(e) => warn!(map = %map.name, error = %e, "Boss timers unavailable, starting fresh"),
    }

    let (inbound_tx, inbound_rx) = mpsc::channel(TRAFFIC_CHANNEL_CAPACITY);
    if let Some(client) = nats {
        let subscriber = nats_bridge::subscribe_inbound(client, &map.name).await?;
        tokio::spawn(nats_bridge::pump_inbound(subscriber, map.name.clone(), inbound_tx));
    } else {
        drop(inbound_tx);
    }

    let (world_tx, mut world_rx) = mpsc::channel(TRAFFIC_CHANNEL_CAPACITY);
    tokio::spawn(runner::route_inbound(
        Arc::clone(backend),
        inbound_rx,
        world_tx,
        config.characters.starting_hp,
    ));

    let control = Arc::new(WorldControl::new());
    let loop_control = Arc::clone(&control);
    let status_every = config.rates.persistence;
    let handle = tokio::spawn(async move {
        let mut status = StatusCallback::new(status_every);
        runner::run_world(&mut world, &mut world_rx, &loop_control, &mut status, 0).await
    });

    info!(map = %map.name, spawners = map.spawners.len(), "World started");
    Ok(MapTask {
        name: map.name.clone(),
        control,
        handle,
    })
}

/// Load the configuration from `RAIR_CONFIG` or `rair-config.yaml`.
///
/// A missing file yields the defaults. Returns the path that was read.
fn load_config() -> Result<(RairConfig, Option<PathBuf>), EngineError> {
    let path = std::env::var_os("RAIR_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        let config = RairConfig::from_file(&path)?;
        Ok((config, Some(path)))
    } else {
        Ok((RairConfig::parse("")?, None))
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured
/// level.
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}
