//! Cross-Platform Path Utilities
//!
//! Resolves the Bunyan data directory (~/.bunyan/) and the files in it.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the Bunyan directory (~/.bunyan/)
pub fn bunyan_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".bunyan"))
}

/// Get the config file path (~/.bunyan/config.json)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(bunyan_dir()?.join("config.json"))
}

/// Get the default database file path (~/.bunyan/data.db)
pub fn database_path() -> AppResult<PathBuf> {
    Ok(bunyan_dir()?.join("data.db"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Get the Bunyan directory, creating if it doesn't exist
pub fn ensure_bunyan_dir() -> AppResult<PathBuf> {
    let path = bunyan_dir()?;
    ensure_dir(&path)?;
    Ok(path)
}
