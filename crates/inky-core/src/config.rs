//! Configuration management for inky.
//!
//! Loads configuration from ${INKY_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Returns the default config template with comments.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for inky configuration and data.
    //!
    //! INKY_HOME resolution order:
    //! 1. INKY_HOME environment variable (if set)
    //! 2. ~/.config/inky (default)
    //! 3. ./.inky when no home directory can be determined

    use std::path::PathBuf;

    /// Returns the inky home directory.
    pub fn inky_home() -> PathBuf {
        if let Ok(home) = std::env::var("INKY_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".inky"),
            |home| home.join(".config").join("inky"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        inky_home().join("config.toml")
    }

    /// Returns the default panel image path.
    pub fn panel_output_path() -> PathBuf {
        inky_home().join("panel.png")
    }
}

/// Remote-call server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:5000".to_string(),
        }
    }
}

/// Panel geometry and fixed messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    /// Panel image path; `None` means `${INKY_HOME}/panel.png`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    pub startup_message: String,
    pub offline_message: String,
}

impl DisplayConfig {
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(paths::panel_output_path)
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 212,
            height: 104,
            output: None,
            startup_message: "starting".to_string(),
            offline_message: "offline".to_string(),
        }
    }
}

/// Timings for the snapshot pipeline and shutdown coordination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tick_interval_secs: u64,
    pub device_poll_ms: u64,
    pub shutdown_poll_ms: u64,
    pub retry_backoff_ms: u64,
    pub max_signals: u32,
    pub shutdown_grace_secs: u64,
}

impl PipelineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn device_poll(&self) -> Duration {
        Duration::from_millis(self.device_poll_ms.max(1))
    }

    pub fn shutdown_poll(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_ms.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 10,
            device_poll_ms: 200,
            shutdown_poll_ms: 100,
            retry_backoff_ms: 1000,
            max_signals: 3,
            shutdown_grace_secs: 10,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter used when INKY_LOG is unset.
    pub level: String,
    /// Optional log file, written in addition to stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub display: DisplayConfig,
    pub pipeline: PipelineConfig,
    pub log: LogConfig,
}

impl Config {
    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if the file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Writes the commented default config to `path`, creating parent dirs.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("Config file already exists at {}", path.display());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}
