//! Configuration file loading
//!
//! Handles:
//! - Searching for config files in standard locations
//! - Creating a default configuration if none exists
//! - Parsing YAML configuration

use super::{Config, ConfigError};
use crate::{log_debug, log_info, log_warn};
use std::{
    env, fs,
    path::PathBuf,
};

pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::find_config_path()?;
        Ok(Self { config_path })
    }

    /// Find the configuration file in standard locations
    fn find_config_path() -> Result<PathBuf, ConfigError> {
        log_debug!("Searching for configuration file...");

        // First possible location: ~/.shellmux/config.yaml
        if let Some(home_dir) = dirs::home_dir() {
            let app_dir_path = home_dir.join(".shellmux").join("config.yaml");
            log_debug!("Checking: {:?}", app_dir_path);
            if app_dir_path.exists() {
                log_info!("Found config at: {:?}", app_dir_path);
                return Ok(app_dir_path);
            }
        }

        // Second possible location: ~/.shellmux.yaml
        if let Some(home_dir) = dirs::home_dir() {
            let home_dir_path = home_dir.join(".shellmux.yaml");
            log_debug!("Checking: {:?}", home_dir_path);
            if home_dir_path.exists() {
                log_info!("Found config at: {:?}", home_dir_path);
                return Ok(home_dir_path);
            }
        }

        // Third possible location: current working directory
        if let Ok(current_dir) = env::current_dir() {
            let current_dir_path = current_dir.join("shellmux.yaml");
            log_debug!("Checking: {:?}", current_dir_path);
            if current_dir_path.exists() {
                log_info!("Found config at: {:?}", current_dir_path);
                return Ok(current_dir_path);
            }
        }

        // No config files exist; try to create a default configuration.
        log_warn!("No config file found, creating default configuration");
        Self::create_default_config()
    }

    /// Create a default configuration file if none exists
    fn create_default_config() -> Result<PathBuf, ConfigError> {
        let home_dir = dirs::home_dir().ok_or_else(|| ConfigError::NotFound("Failed to get home directory".to_string()))?;
        let app_dir = home_dir.join(".shellmux");
        let config_path = app_dir.join("config.yaml");

        if !app_dir.exists() {
            log_debug!("Creating directory: {:?}", app_dir);
            fs::create_dir_all(&app_dir)?;
        }

        let config_content = include_str!("../../templates/default-config.yaml");
        fs::write(&config_path, config_content)?;
        log_info!("Default configuration file created at: {:?}", config_path);

        Ok(config_path)
    }

    /// Load the configuration from the config file
    pub fn load_config(self) -> Result<Config, ConfigError> {
        log_info!("Loading configuration from: {:?}", self.config_path);

        let config_content = fs::read_to_string(&self.config_path).map_err(|err| {
            log_warn!("Failed to read config file: {}", err);
            err
        })?;

        match serde_yml::from_str::<Config>(&config_content) {
            Ok(mut config) => {
                config.metadata.config_path = self.config_path;
                log_debug!("Parsed configuration successfully");
                Ok(config)
            }
            Err(err) => {
                log_warn!("Error parsing configuration file: {:?}", err);
                Err(ConfigError::Parse(err.to_string()))
            }
        }
    }
}
