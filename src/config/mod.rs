//! nanmgr Configuration System
//!
//! Loads configuration from YAML files with a cascading priority system:
//! 1. `./nanmgr.yaml` (current directory - highest priority)
//! 2. `~/.nanmgr.yaml` (home directory)
//! 3. `~/.config/nanmgr/nanmgr.yaml` (user config directory)
//! 4. `/etc/nanmgr/nanmgr.yaml` (system - lowest priority)
//!
//! Values from higher priority files override those from lower priority files.
//!
//! # YAML Structure
//!
//! ```yaml
//! limits:
//!   max_ndp_instances: 8
//! interface:
//!   nmi: "02:11:22:33:44:55"
//! watchdog:
//!   ndp_setup_timeout_secs: 10
//! ```

mod limits;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use limits::{InterfaceConfig, LimitsConfig, WatchdogConfig};

/// Default config filename.
const CONFIG_FILENAME: &str = "nanmgr.yaml";

/// Largest id space any pool may cover (ids travel as one byte).
const MAX_ID_SPACE: u16 = 255;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Identifier space sizes (`limits.*`).
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Management interface settings (`interface.*`).
    #[serde(default)]
    pub interface: InterfaceConfig,

    /// Event loop and watchdog settings (`watchdog.*`).
    #[serde(default)]
    pub watchdog: WatchdogConfig,
}

impl Config {
    /// Create a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the standard search paths.
    ///
    /// Returns a tuple of (config, paths_loaded) where paths_loaded contains
    /// the paths that were successfully loaded.
    pub fn load() -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let search_paths = Self::search_paths();
        Self::load_from_paths(&search_paths)
    }

    /// Load configuration from specific paths.
    ///
    /// Paths are processed in order, with later paths overriding earlier ones.
    pub fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let mut config = Config::default();
        let mut loaded_paths = Vec::new();

        for path in paths {
            if path.exists() {
                let file_config = Self::load_file(path)?;
                config.merge(file_config);
                loaded_paths.push(path.clone());
            }
        }

        Ok((config, loaded_paths))
    }

    /// Load configuration from a single file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the standard search paths in priority order (lowest to highest).
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // System config (lowest priority)
        paths.push(PathBuf::from("/etc/nanmgr").join(CONFIG_FILENAME));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("nanmgr").join(CONFIG_FILENAME));
        }

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".nanmgr.yaml"));
        }

        // Current directory (highest priority)
        paths.push(PathBuf::from(".").join(CONFIG_FILENAME));

        paths
    }

    /// Merge another configuration into this one.
    ///
    /// Values set in `other` override values in `self`.
    pub fn merge(&mut self, other: Config) {
        self.limits.merge(other.limits);
        self.interface.merge(other.interface);
        self.watchdog.merge(other.watchdog);
    }

    /// Reject values the manager cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pools = [
            ("limits.max_services", self.limits.max_services()),
            ("limits.max_ndp_instances", self.limits.max_ndp_instances()),
            ("limits.max_ndl_slots", self.limits.max_ndl_slots()),
            ("limits.max_pairing_instances", self.limits.max_pairing_instances()),
            (
                "limits.max_bootstrapping_instances",
                self.limits.max_bootstrapping_instances(),
            ),
        ];
        for (field, value) in pools {
            if value == 0 || value > MAX_ID_SPACE {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{} not in 1..={}", value, MAX_ID_SPACE),
                });
            }
        }

        if self.limits.max_followups() == 0 {
            return Err(invalid("limits.max_followups", "must be at least 1"));
        }

        let vif_base = self.interface.ndl_vif_base();
        if vif_base == 0 || vif_base.checked_add(self.limits.max_ndl_slots()).is_none() {
            return Err(invalid(
                "interface.ndl_vif_base",
                "must be non-zero and leave room for every ndl slot",
            ));
        }

        if let Some(nmi) = self.interface.nmi {
            if nmi.is_zero() || nmi.is_multicast() {
                return Err(invalid("interface.nmi", "must be a unicast address"));
            }
        }

        if self.watchdog.tick_interval().is_zero() {
            return Err(invalid("watchdog.tick_interval_secs", "must be at least 1"));
        }
        if self.watchdog.event_buffer() == 0 {
            return Err(invalid("watchdog.event_buffer", "must be at least 1"));
        }
        Ok(())
    }

    /// Serialize this configuration to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
