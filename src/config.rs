// src/config.rs

//! Configuration loading utilities.

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::Config;

/// Config file name inside the storage directory.
pub const CONFIG_FILE: &str = "config.toml";

pub fn config_path(storage_dir: &Path) -> PathBuf {
    storage_dir.join(CONFIG_FILE)
}

/// Load configuration from a TOML file and validate it.
///
/// Falls back to defaults only when the file is missing. Malformed files
/// are configuration errors.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load_or_default(path)
        .map_err(|e| AppError::config(format!("Cannot load {path:?}: {e}")))?;
    config
        .validate()
        .map_err(|e| AppError::config(format!("Invalid configuration in {path:?}: {e}")))?;
    Ok(config)
}

/// Write a config file holding every default value.
///
/// Returns false without touching the file when it already exists.
pub fn write_default_config(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(&Config::default())
        .map_err(|e| AppError::config(format!("Cannot render default config: {e}")))?;
    std::fs::write(path, content)?;
    Ok(true)
}
