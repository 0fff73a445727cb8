//! Centralized path resolution for flotilla
//!
//! # Environment Variables
//!
//! - `FLOTILLA_CONFIG_DIR` - Override config directory
//! - `FLOTILLA_STATE_DIR` - Override state directory (run logs, reports)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `FLOTILLA_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/flotilla` (if set)
//! 3. `~/.config/flotilla`
//!
//! For state_dir():
//! 1. `FLOTILLA_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/flotilla` (if set)
//! 3. `~/.local/state/flotilla`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "FLOTILLA_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "FLOTILLA_STATE_DIR";

const APP_DIR: &str = "flotilla";

/// Get the flotilla config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME")
        && !xdg_config.is_empty()
    {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the flotilla state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME")
        && !xdg_state.is_empty()
    {
        let path = PathBuf::from(xdg_state).join(APP_DIR);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP_DIR);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Path of the config file
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Root under which each run gets its own log directory
pub fn runs_dir() -> Result<PathBuf> {
    Ok(state_dir()?.join("runs"))
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables leave the input untouched.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
