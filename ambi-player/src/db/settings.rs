//! Settings database access
//!
//! Runtime settings live in the `settings` key/value table. Reads of a
//! missing key write the built-in default back so the table always reflects
//! what the player is running with.

use crate::error::{Error, Result};
use ambi_common::RepeatMode;
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

pub const VOLUME_KEY: &str = "volume_level";
pub const SHUFFLE_KEY: &str = "shuffle";
pub const REPEAT_KEY: &str = "repeat_mode";

pub const DEFAULT_VOLUME: f32 = 0.7;

/// Get volume setting (0.0-1.0)
pub async fn get_volume(db: &Pool<Sqlite>) -> Result<f32> {
    match get_setting::<f32>(db, VOLUME_KEY).await? {
        Some(vol) => Ok(vol.clamp(0.0, 1.0)),
        None => {
            set_volume(db, DEFAULT_VOLUME).await?;
            Ok(DEFAULT_VOLUME)
        }
    }
}

/// Set volume setting (0.0-1.0)
pub async fn set_volume(db: &Pool<Sqlite>, volume: f32) -> Result<()> {
    let clamped = volume.clamp(0.0, 1.0);
    set_setting(db, VOLUME_KEY, clamped).await
}

pub async fn get_shuffle(db: &Pool<Sqlite>) -> Result<bool> {
    match get_setting::<bool>(db, SHUFFLE_KEY).await? {
        Some(shuffle) => Ok(shuffle),
        None => {
            set_shuffle(db, false).await?;
            Ok(false)
        }
    }
}

pub async fn set_shuffle(db: &Pool<Sqlite>, shuffle: bool) -> Result<()> {
    set_setting(db, SHUFFLE_KEY, shuffle).await
}

pub async fn get_repeat_mode(db: &Pool<Sqlite>) -> Result<RepeatMode> {
    match get_setting::<RepeatMode>(db, REPEAT_KEY).await? {
        Some(mode) => Ok(mode),
        None => {
            set_repeat_mode(db, RepeatMode::None).await?;
            Ok(RepeatMode::None)
        }
    }
}

pub async fn set_repeat_mode(db: &Pool<Sqlite>, mode: RepeatMode) -> Result<()> {
    set_setting(db, REPEAT_KEY, mode).await
}

/// Playback preferences restored at startup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackPreferences {
    pub volume: f32,
    pub shuffle: bool,
    pub repeat: RepeatMode,
}

impl Default for PlaybackPreferences {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            shuffle: false,
            repeat: RepeatMode::None,
        }
    }
}

/// Load all playback preferences, initializing missing ones
pub async fn load_preferences(db: &Pool<Sqlite>) -> Result<PlaybackPreferences> {
    Ok(PlaybackPreferences {
        volume: get_volume(db).await?,
        shuffle: get_shuffle(db).await?,
        repeat: get_repeat_mode(db).await?,
    })
}

/// Generic setting getter
///
/// Returns None if key doesn't exist in database.
/// Parses value from string using FromStr trait.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter
///
/// Inserts or updates setting in database.
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    let value_str = value.to_string();

    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value_str)
    .execute(db)
    .await?;

    Ok(())
}
