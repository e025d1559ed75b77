use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde_json::Error as SerdeError;
use tracing::{debug, info};

use crate::domain::{EngineConfig, InvalidConfig};

const APP_QUALIFIER: &str = "com";
const APP_ORG: &str = "BookflipEvaluator";
const APP_NAME: &str = "BookflipEvaluator";
const CONFIG_FILENAME: &str = "engine.json";

fn config_file() -> Option<PathBuf> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .map(|dirs| dirs.config_dir().join(CONFIG_FILENAME))
}

/// Loads `engine.json` from the platform config directory. A missing file
/// (or no resolvable config directory) yields the defaults.
pub fn load_engine_config() -> Result<EngineConfig, ConfigError> {
    match config_file() {
        Some(path) => load_engine_config_from(&path),
        None => Ok(EngineConfig::default()),
    }
}

pub fn load_engine_config_from(path: &Path) -> Result<EngineConfig, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "no engine config; using defaults");
        return Ok(EngineConfig::default());
    }
    let data = fs::read_to_string(path)?;
    let config: EngineConfig = serde_json::from_str(&data)?;
    config.validate()?;
    info!(path = %path.display(), "loaded engine config");
    Ok(config)
}

pub fn save_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    let path = config_file().ok_or(ConfigError::StorageUnavailable)?;
    save_engine_config_to(config, &path)
}

pub fn save_engine_config_to(config: &EngineConfig, path: &Path) -> Result<(), ConfigError> {
    config.validate()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("storage directory unavailable")]
    StorageUnavailable,
    #[error("invalid engine config: {0}")]
    Invalid(#[from] InvalidConfig),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serde(#[from] SerdeError),
}
