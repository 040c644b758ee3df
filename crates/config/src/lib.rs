//! Configuration loading for ScrapIt services
//!
//! Provides utilities for locating and loading configuration files from the
//! shared ScrapIt config directory. The directory defaults to
//! `~/.config/scrapit/` and can be overridden with the `SCRAPIT_CONFIG_DIR`
//! environment variable for server deployments.
//!
//! Call [`init`] at startup to bootstrap the config directory.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the config directory location
pub const CONFIG_DIR_ENV: &str = "SCRAPIT_CONFIG_DIR";

/// Initialize the ScrapIt config directory.
///
/// Creates the directory if it doesn't exist.
/// Call this once at service startup.
pub fn init() -> Result<PathBuf> {
    ensure_config_dir()
}

/// Get the ScrapIt config directory.
///
/// `SCRAPIT_CONFIG_DIR` takes priority; otherwise `~/.config/scrapit/`.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|p| p.join("scrapit"))
}

/// Get the path to a config file within the ScrapIt config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Load and parse a JSON config file from the ScrapIt config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Check if a config file exists in the ScrapIt config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

/// Ensure the ScrapIt config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().context("Could not determine config directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}
