//! Node configuration.
//!
//! Loaded from a TOML file; every key is optional.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Master node settings.
    #[serde(default)]
    pub master: MasterConfig,
    /// Slave node settings.
    #[serde(default)]
    pub slave: SlaveConfig,
}

/// Master node configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MasterConfig {
    /// Topic the master itself listens on (default: SYSUNIT.MASTERS).
    #[serde(default = "default_group")]
    pub group: String,
    /// Topic slaves listen on (default: SYSUNIT.SLAVES).
    #[serde(default = "default_slave_group")]
    pub slave_group: String,
    /// How long to collect `ADD_MEMBER` replies, in milliseconds (default: 2000).
    #[serde(default = "default_registration_window_ms")]
    pub registration_window_ms: u64,
    /// Script sent with every work item (default: fooSystemTest).
    #[serde(default = "default_script")]
    pub script: String,
    /// Work items to spread over the slaves (default: a, b, c).
    #[serde(default = "default_nodes")]
    pub nodes: Vec<String>,
}

/// Slave node configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SlaveConfig {
    /// Watchdog timeout for launched test cases in milliseconds.
    /// Zero waits for every bean (default: 0).
    #[serde(default = "default_watchdog_timeout_ms")]
    pub watchdog_timeout_ms: u64,
}

fn default_group() -> String {
    "SYSUNIT.MASTERS".to_string()
}

fn default_slave_group() -> String {
    "SYSUNIT.SLAVES".to_string()
}

fn default_registration_window_ms() -> u64 {
    2000
}

fn default_script() -> String {
    "fooSystemTest".to_string()
}

fn default_nodes() -> Vec<String> {
    vec!["a".to_string(), "b".to_string(), "c".to_string()]
}

fn default_watchdog_timeout_ms() -> u64 {
    0
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            group: default_group(),
            slave_group: default_slave_group(),
            registration_window_ms: default_registration_window_ms(),
            script: default_script(),
            nodes: default_nodes(),
        }
    }
}

impl MasterConfig {
    /// The registration window as a [`Duration`].
    pub fn registration_window(&self) -> Duration {
        Duration::from_millis(self.registration_window_ms)
    }
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout_ms: default_watchdog_timeout_ms(),
        }
    }
}

impl SlaveConfig {
    /// The watchdog timeout as a [`Duration`].
    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
