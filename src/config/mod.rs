//! Runtime configuration
//!
//! Holds the tunables for session plumbing (write queue sizing, output
//! buffering) and store behavior. Loaded once into a global `RwLock` so
//! session threads can read settings without re-parsing the file.

mod loader;

pub use loader::ConfigLoader;

use crate::log_warn;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt, io, path::PathBuf, sync::RwLock};

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(String),
    NotFound(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "I/O error: {}", err),
            ConfigError::Parse(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::NotFound(msg) => write!(f, "Config not found: {}", msg),
        }
    }
}

impl Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Enable debug logging without passing -d
    #[serde(default)]
    pub debug_mode: bool,
    /// Shell spawned for local sessions; falls back to $SHELL, then `sh`
    #[serde(default)]
    pub default_shell: Option<String>,
    /// Capacity of the per-session bounded write queue
    #[serde(default = "default_write_queue_capacity")]
    pub write_queue_capacity: usize,
    /// How long a write may wait on a full queue before failing
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Cap on buffered, unconsumed session output per session
    #[serde(default = "default_output_buffer_limit")]
    pub output_buffer_limit: usize,
    /// Watch the profiles file for external edits and hot-reload
    #[serde(default = "default_watch_profiles")]
    pub watch_profiles: bool,
}

fn default_write_queue_capacity() -> usize {
    256
}

fn default_write_timeout_ms() -> u64 {
    2_000
}

fn default_output_buffer_limit() -> usize {
    1024 * 1024
}

fn default_watch_profiles() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug_mode: false,
            default_shell: None,
            write_queue_capacity: default_write_queue_capacity(),
            write_timeout_ms: default_write_timeout_ms(),
            output_buffer_limit: default_output_buffer_limit(),
            watch_profiles: default_watch_profiles(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub config_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(skip)]
    pub metadata: Metadata,
}

static GLOBAL_CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| {
    let config = match ConfigLoader::new().and_then(|loader| loader.load_config()) {
        Ok(config) => config,
        Err(err) => {
            log_warn!("Falling back to default configuration: {}", err);
            Config::default()
        }
    };
    RwLock::new(config)
});

/// Access the process-wide configuration
pub fn get_config() -> &'static RwLock<Config> {
    &GLOBAL_CONFIG
}

#[cfg(test)]
#[path = "../test/config/settings.rs"]
mod tests;
