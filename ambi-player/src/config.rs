//! Configuration management for ambi-player
//!
//! Two tiers:
//! 1. **TOML bootstrap**: paths, playback timing, cache budget, logging
//!    (read once at startup)
//! 2. **Database runtime**: volume, shuffle and repeat in the `settings` table
//!    (see [`crate::db::settings`])
//!
//! Settings sources priority: command-line arguments, environment variables,
//! TOML file, built-in defaults.

use ambi_common::config::{default_data_dir, load_toml, resolve_config_file};
use ambi_common::FadeCurve;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{Error, Result};

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// SQLite database file; `None` keeps queue and cache history in memory
    pub database_path: Option<PathBuf>,

    /// Folder the media origin reads library files from
    pub library_root: PathBuf,

    /// Folder holding cached track files
    pub cache_dir: PathBuf,

    /// Base URL for remote streaming locators
    pub stream_base_url: String,

    pub playback: PlaybackConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            database_path: Some(data_dir.join("ambi.db")),
            library_root: data_dir.join("library"),
            cache_dir: data_dir.join("cache"),
            stream_base_url: "http://localhost:3001/music/stream".to_string(),
            playback: PlaybackConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Playback engine tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Crossfade ramp length in seconds
    pub crossfade_seconds: f64,
    /// Number of discrete volume steps per ramp
    pub crossfade_steps: u32,
    pub fade_curve: FadeCurve,
    /// Upper bound on waiting for a loaded source to become ready
    pub ready_timeout_ms: u64,
    /// Auto-advance monitor sampling interval
    pub position_interval_ms: u64,
    /// Skips before this fraction of the track count as early skips
    pub early_skip_fraction: f64,
    /// `previous` restarts the current track once this much has played
    pub restart_threshold_secs: f64,
    /// Random picks tried in shuffle mode before falling back to a scan
    pub shuffle_attempts: u32,
    /// Resume playback of the restored current track at startup
    pub autoplay: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            crossfade_seconds: 4.0,
            crossfade_steps: 60,
            fade_curve: FadeCurve::Quadratic,
            ready_timeout_ms: 800,
            position_interval_ms: 250,
            early_skip_fraction: 0.3,
            restart_threshold_secs: 3.0,
            shuffle_attempts: 10,
            autoplay: false,
        }
    }
}

impl PlaybackConfig {
    pub fn crossfade_duration(&self) -> Duration {
        ambi_common::time::secs_to_duration(self.crossfade_seconds)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn position_interval(&self) -> Duration {
        Duration::from_millis(self.position_interval_ms.max(10))
    }

    /// Ramp length divided into `crossfade_steps` equal intervals
    pub fn step_interval(&self) -> Duration {
        self.crossfade_duration() / self.crossfade_steps.max(1)
    }

    pub fn restart_threshold(&self) -> Duration {
        ambi_common::time::secs_to_duration(self.restart_threshold_secs)
    }
}

/// Cache budget and prefetch tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Hard ceiling on bytes held in the cache directory
    pub budget_bytes: u64,
    /// Maximum upcoming entries considered per prefetch pass
    pub prefetch_limit: usize,
    /// Size assumed for a track whose file size is not yet known
    pub default_estimate_bytes: u64,
    /// Quiet period before a prefetch request is acted on
    pub prefetch_debounce_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 10 * 1024 * 1024 * 1024,
            prefetch_limit: 200,
            default_estimate_bytes: 10 * 1024 * 1024,
            prefetch_debounce_ms: 500,
        }
    }
}

impl CacheConfig {
    pub fn prefetch_debounce(&self) -> Duration {
        Duration::from_millis(self.prefetch_debounce_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "ambi_player=info,ambi_common=info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Load bootstrap configuration
    ///
    /// Uses the file resolved from `cli_path` / `AMBI_CONFIG` / platform
    /// locations, or built-in defaults when none exists.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_file(cli_path)? {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                let config: TomlConfig = load_toml(&path)?;
                config.validate()?;
                Ok(config)
            }
            None => {
                info!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let playback = &self.playback;
        if !playback.crossfade_seconds.is_finite() || playback.crossfade_seconds < 0.0 {
            return Err(Error::Config(format!(
                "playback.crossfade_seconds must be >= 0, got {}",
                playback.crossfade_seconds
            )));
        }
        if playback.crossfade_steps == 0 {
            return Err(Error::Config(
                "playback.crossfade_steps must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&playback.early_skip_fraction) {
            return Err(Error::Config(format!(
                "playback.early_skip_fraction must be within 0..=1, got {}",
                playback.early_skip_fraction
            )));
        }
        if self.cache.budget_bytes == 0 {
            return Err(Error::Config("cache.budget_bytes must be > 0".to_string()));
        }
        Ok(())
    }
}
