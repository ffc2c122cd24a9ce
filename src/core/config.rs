//! Configuration - session bounds, artefact paths and replay settings.
//!
//! Loads from `config.toml`. Every section is optional; missing values fall
//! back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::{Error, Result};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub replay: ReplayConfig,
}

/// Session time bounds, seconds relative to market open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session start; state before this is the opening snapshot
    #[serde(default = "default_init")]
    pub init: i32,
    /// Last trading second
    #[serde(default = "default_stop")]
    pub stop: i32,
    /// Reaching this after a batch ends the session
    #[serde(default = "default_end")]
    pub end: i32,
    /// How often the reference balance is refreshed
    #[serde(default = "default_reference_refresh")]
    pub reference_refresh_secs: i32,
}

fn default_init() -> i32 {
    -600
}
fn default_stop() -> i32 {
    22_800
}
fn default_end() -> i32 {
    23_400
}
fn default_reference_refresh() -> i32 {
    3600
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            init: default_init(),
            stop: default_stop(),
            end: default_end(),
            reference_refresh_secs: default_reference_refresh(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory for state snapshot files
    pub state_dir: Option<PathBuf>,
    /// Directory for msg_in.log / vec_out.log
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Seconds a replay record is withheld after its timestamp
    #[serde(default)]
    pub delay: i32,
}

impl Config {
    /// Load from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, falling back to built-in defaults.
    pub fn load_default() -> Self {
        let candidates = [
            "config.toml",
            concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml"),
        ];

        for path in &candidates {
            match Self::load(Path::new(path)) {
                Ok(cfg) => {
                    tracing::info!("Loaded config from {}", path);
                    return cfg;
                }
                Err(e) if Path::new(path).exists() => {
                    tracing::warn!("Ignoring {}: {}", path, e);
                }
                Err(_) => {}
            }
        }

        tracing::warn!("No config.toml found, using defaults");
        Self::default()
    }

    fn validate(&self) -> Result<()> {
        let s = &self.session;
        if s.init >= s.end {
            return Err(Error::Config(format!(
                "session.init ({}) must be before session.end ({})",
                s.init, s.end
            )));
        }
        if s.reference_refresh_secs <= 0 {
            return Err(Error::Config(
                "session.reference_refresh_secs must be positive".into(),
            ));
        }
        if self.replay.delay < 0 {
            return Err(Error::Config("replay.delay must not be negative".into()));
        }
        Ok(())
    }
}
