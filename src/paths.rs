//! Where Skyloft keeps its files
//!
//! Everything lives under `~/.config/skyloft/` on every platform:
//! - config.toml - user configuration
//! - credentials.enc - encrypted app passwords
//! - skyloft.sqlite - accounts, drafts and the offline post cache

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// The Skyloft directory, created on first use
pub fn skyloft_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let dir = home.join(".config").join("skyloft");
    fs::create_dir_all(&dir).context("Failed to create skyloft directory")?;
    Ok(dir)
}

/// `~/.config/skyloft/config.toml`
pub fn config_path() -> Result<PathBuf> {
    Ok(skyloft_dir()?.join("config.toml"))
}

/// `~/.config/skyloft/skyloft.sqlite`
pub fn database_path() -> Result<PathBuf> {
    Ok(skyloft_dir()?.join("skyloft.sqlite"))
}

/// `~/.config/skyloft/credentials.enc`
pub fn credentials_path() -> Result<PathBuf> {
    Ok(skyloft_dir()?.join("credentials.enc"))
}
