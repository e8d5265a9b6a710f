//! JSON file configuration adapter.
//!
//! Implements [`ConfigPort`] over a single human-editable JSON file.  Any
//! field missing from the file takes its default, so a file holding only
//! `{"thresholds": {"co2_threshold": 4.5}}` is a valid configuration.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::app::ports::ConfigPort;
use crate::config::ChamberConfig;
use crate::error::ConfigError;

pub struct JsonFileConfig {
    path: PathBuf,
}

impl JsonFileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigPort for JsonFileConfig {
    fn load(&self) -> Result<ChamberConfig, ConfigError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("No config at {}, using defaults", self.path.display());
                return Ok(ChamberConfig::default());
            }
            Err(_) => return Err(ConfigError::IoError),
        };
        let config: ChamberConfig =
            serde_json::from_str(&text).map_err(|_| ConfigError::Corrupted)?;
        config.validate()?;
        info!("Loaded config from {}", self.path.display());
        Ok(config)
    }

    fn save(&self, config: &ChamberConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let text = serde_json::to_string_pretty(config).map_err(|_| ConfigError::IoError)?;
        fs::write(&self.path, text).map_err(|_| ConfigError::IoError)?;
        info!("Saved config to {}", self.path.display());
        Ok(())
    }
}
