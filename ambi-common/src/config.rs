//! Configuration file lookup and data folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "AMBI_CONFIG";

/// Locate the bootstrap config file
///
/// Priority order:
/// 1. Command-line argument (highest priority, must exist)
/// 2. `AMBI_CONFIG` environment variable (must exist)
/// 3. `~/.config/ambi/config.toml`, then `/etc/ambi/config.toml` on Linux
///
/// Returns `Ok(None)` when nothing is configured so callers fall back to
/// compiled defaults.
pub fn resolve_config_file(cli_arg: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = cli_arg {
        return require_existing(path.to_path_buf()).map(Some);
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return require_existing(PathBuf::from(path)).map(Some);
        }
    }

    Ok(default_config_candidates().into_iter().find(|p| p.exists()))
}

fn require_existing(path: PathBuf) -> Result<PathBuf> {
    if path.exists() {
        Ok(path)
    } else {
        Err(Error::Config(format!("Config file not found: {:?}", path)))
    }
}

/// Platform config file locations, most specific first
fn default_config_candidates() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = dirs::config_dir()
        .map(|d| d.join("ambi").join("config.toml"))
        .into_iter()
        .collect();
    if cfg!(target_os = "linux") {
        candidates.push(PathBuf::from("/etc/ambi/config.toml"));
    }
    candidates
}

/// Parse a TOML config file into `T`
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {:?}: {}", path, e)))
}

/// Get OS-dependent default data folder (database and cache live below it)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("ambi"))
        .unwrap_or_else(|| {
            if cfg!(target_os = "windows") {
                PathBuf::from("C:\\ProgramData\\ambi")
            } else {
                PathBuf::from("./ambi_data")
            }
        })
}
