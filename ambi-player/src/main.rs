//! Ambient Music Player (ambi-player) - Main entry point
//!
//! Runs the unattended venue player: restores the persisted queue, starts
//! the playback engine and the prefetcher, and takes staff commands on stdin.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::{Pool, Sqlite};
use tokio::io::BufReader;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ambi_common::{AmbiEvent, EventBus};
use ambi_player::cache::{CacheManager, FolderOrigin, PrefetchWorker};
use ambi_player::config::TomlConfig;
use ambi_player::db::settings::{self, PlaybackPreferences};
use ambi_player::db::{CacheStore, MemoryStore, QueueStore, SqliteStore};
use ambi_player::playback::{AudioChannel, ClockChannel, PlaybackEngine};
use ambi_player::queue::QueueManager;

/// Command-line arguments for ambi-player
#[derive(Parser, Debug)]
#[command(name = "ambi-player")]
#[command(about = "Unattended ambient music player for venues")]
#[command(version)]
struct Args {
    /// Bootstrap configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, env = "AMBI_DATABASE")]
    database: Option<PathBuf>,

    /// Folder containing library music files
    #[arg(long, env = "AMBI_LIBRARY_ROOT")]
    library_root: Option<PathBuf>,

    /// Folder for cached track files
    #[arg(long, env = "AMBI_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Log filter, e.g. "ambi_player=debug"
    #[arg(long, env = "AMBI_LOG_LEVEL")]
    log_level: Option<String>,

    /// Keep queue, history and settings in memory only
    #[arg(long)]
    in_memory: bool,

    /// Do not read staff commands from stdin
    #[arg(long)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(path) = args.database {
        config.database_path = Some(path);
    }
    if args.in_memory {
        config.database_path = None;
    }
    if let Some(root) = args.library_root {
        config.library_root = root;
    }
    if let Some(dir) = args.cache_dir {
        config.cache_dir = dir;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ambi-player v{}", env!("CARGO_PKG_VERSION"));
    info!("Library root: {}", config.library_root.display());
    info!("Cache dir: {}", config.cache_dir.display());

    let events = Arc::new(EventBus::new(256));

    // Stores
    let queue_store: Arc<dyn QueueStore>;
    let cache_store: Arc<dyn CacheStore>;
    let mut pool: Option<Pool<Sqlite>> = None;
    let mut preferences = PlaybackPreferences::default();
    match &config.database_path {
        Some(path) => {
            info!("Database: {}", path.display());
            let store = Arc::new(
                SqliteStore::open(path)
                    .await
                    .context("Failed to open database")?,
            );
            preferences = settings::load_preferences(store.pool())
                .await
                .context("Failed to load playback settings")?;
            pool = Some(store.pool().clone());
            queue_store = store.clone();
            cache_store = store;
        }
        None => {
            info!("Database: none (in-memory state)");
            let store = Arc::new(MemoryStore::new());
            queue_store = store.clone();
            cache_store = store;
        }
    }

    // Queue and cache
    let queue = QueueManager::load(queue_store, Arc::clone(&events)).await;
    info!("Queue restored with {} entries", queue.len().await);

    let origin = FolderOrigin::new(
        config.library_root.clone(),
        config.cache_dir.clone(),
        config.stream_base_url.clone(),
        config.cache.budget_bytes,
    );
    origin
        .init()
        .await
        .context("Failed to prepare cache directory")?;

    let cache = Arc::new(CacheManager::new(
        cache_store,
        Arc::new(origin),
        Arc::clone(&events),
        config.cache.clone(),
        ambi_common::time::system_clock(),
    ));
    cache.load().await;

    let (prefetch, prefetch_task) =
        PrefetchWorker::spawn(Arc::clone(&cache), config.cache.prefetch_debounce());

    // Background event consumers
    let logger_task = tokio::spawn(log_events(Arc::clone(&events)));
    let persister_task = pool.map(|pool| tokio::spawn(persist_settings(pool, Arc::clone(&events))));

    // Playback engine
    let channels: [Arc<dyn AudioChannel>; 2] =
        [Arc::new(ClockChannel::new()), Arc::new(ClockChannel::new())];
    let engine = PlaybackEngine::new(
        channels,
        queue.clone(),
        Arc::clone(&cache),
        Some(prefetch),
        Arc::clone(&events),
        config.playback.clone(),
        preferences,
    );
    engine
        .start()
        .await
        .context("Failed to start playback engine")?;
    if let Err(e) = engine.restore().await {
        warn!("Could not restore the previous session: {}", e);
    }
    info!("Playback engine ready");

    if args.no_console {
        shutdown_signal().await;
    } else {
        println!("{}", ambi_player::console::HELP);
        let stdin = BufReader::new(tokio::io::stdin());
        tokio::select! {
            _ = ambi_player::console::run(&engine, stdin) => {
                info!("Console closed, shutting down");
            }
            _ = shutdown_signal() => {}
        }
    }

    // Graceful shutdown
    engine.shutdown().await;
    if !queue.flush().await {
        warn!("🛑 Queue changes could not be written before shutdown");
    }
    prefetch_task.abort();
    logger_task.abort();
    if let Some(task) = persister_task {
        task.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

/// Write volume and mode changes to the settings table as they happen
async fn persist_settings(pool: Pool<Sqlite>, events: Arc<EventBus>) {
    let mut rx = events.subscribe();
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Settings persister lagged by {} events", skipped);
                continue;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        };
        let result = match event {
            AmbiEvent::VolumeChanged { volume, .. } => settings::set_volume(&pool, volume).await,
            AmbiEvent::PlaybackModeChanged {
                shuffle, repeat, ..
            } => match settings::set_shuffle(&pool, shuffle).await {
                Ok(()) => settings::set_repeat_mode(&pool, repeat).await,
                Err(e) => Err(e),
            },
            _ => continue,
        };
        if let Err(e) = result {
            warn!("Failed to persist playback setting: {}", e);
        }
    }
}

/// Mirror every controller event into the debug log
async fn log_events(events: Arc<EventBus>) {
    let mut rx = events.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => debug!(event = event.event_type(), "{}", json),
                Err(e) => warn!("Unserializable {} event: {}", event.event_type(), e),
            },
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Event logger lagged by {} events", skipped);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
