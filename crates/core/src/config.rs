// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::watch_target::WatchTarget;

/// Raw YAML-shaped configuration, deserialized before validation.
///
/// Recognized keys mirror the shape described in the external interface
/// spec: `source.uri`, `target.uri`, `watch.collections`,
/// `state.persist_interval`, `logging.level`.
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub source: SourceConfig,
    pub target: TargetConfig,
    pub watch: WatchConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub struct WatchConfig {
    pub collections: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_persist_interval")]
    pub persist_interval: u32,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            persist_interval: default_persist_interval(),
        }
    }
}

fn default_persist_interval() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "INFO".to_string()
}

/// Validated, ready-to-use configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub source_uri: String,
    pub target_uri: String,
    pub watch_targets: Vec<WatchTarget>,
    pub persist_interval: u32,
    pub logging_level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(std::path::PathBuf),
    #[error("failed to read config file {0}: {1}")]
    Read(std::path::PathBuf, #[source] std::io::Error),
    #[error("failed to parse config as YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("watch.collections must be non-empty")]
    EmptyWatchList,
    #[error("invalid entry in watch.collections: {0}")]
    InvalidWatchTarget(#[from] crate::watch_target::WatchTargetParseError),
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        Self::parse(&text)
    }

    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(yaml)?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.watch.collections.is_empty() {
            return Err(ConfigError::EmptyWatchList);
        }
        let watch_targets = raw
            .watch
            .collections
            .iter()
            .map(|spec| spec.parse())
            .collect::<Result<Vec<WatchTarget>, _>>()?;

        Ok(Config {
            source_uri: raw.source.uri,
            target_uri: raw.target.uri,
            watch_targets,
            persist_interval: raw.state.persist_interval,
            logging_level: raw.logging.level,
        })
    }
}
