//! stageflow configuration
//!
//! One RON file holds everything a run needs. Every section and field is
//! optional; missing values fall back to their defaults.
//!
//! ```text
//! (
//!     log: (level: debug),
//!     scheduler: (max_live_tasks: 256),
//!     stage5: (seed: 7, boss_altitude: 300.0),
//! )
//! ```
//!
//! # Usage
//!
//! ```rust
//! use stageflow::util::config::parse_config;
//!
//! let config = parse_config("(stage5: (seed: 7))").unwrap();
//! assert_eq!(config.stage5.seed, 7);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::scheduler::SchedulerConfig;
use crate::stage::stage5::{InvalidValue, Stage5Config};
use crate::util::logger::LogLevel;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Logging settings
    pub log: LogConfig,
    /// Scheduler settings, shared by every stage
    pub scheduler: SchedulerConfig,
    /// Stage 5 tuning
    pub stage5: Stage5Config,
}

/// Logging configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
}

impl AppConfig {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.max_live_tasks == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.max_live_tasks",
                reason: "must allow at least one task".to_string(),
            });
        }
        self.stage5
            .validate()
            .map_err(|InvalidValue { field, reason }| ConfigError::Invalid { field, reason })
    }
}

/// Parse and validate a RON configuration string
pub fn parse_config(source: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = ron::from_str(source).map_err(ConfigError::Parse)?;
    config.validate()?;
    Ok(config)
}

/// Load and validate a RON configuration file
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Load `path` if given, otherwise the defaults
pub fn load_or_default(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => Ok(AppConfig::default()),
    }
}

/// Render a configuration as pretty RON
pub fn to_ron(config: &AppConfig) -> Result<String, ConfigError> {
    ron::ser::to_string_pretty(config, ron::ser::PrettyConfig::default()).map_err(ConfigError::Serialize)
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error: {0}")]
    Parse(#[source] ron::error::SpannedError),

    #[error("Config serialize error: {0}")]
    Serialize(#[source] ron::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
