//! Global configuration parsing, defaulting, and validation.
//!
//! The configuration file is TOML with three sections (`[server]`,
//! `[bot]`, `[system]`). Every key has a fallback default, so an empty
//! file is a valid configuration. A missing file is replaced by a
//! freshly written default file on first start.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{AppError, Result};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/bot_supervisor/config.toml";

/// Control-plane connectivity settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Base URL of the control plane (HTTP API and persistent channel).
    #[serde(default = "default_server_url")]
    pub url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
        }
    }
}

/// Worker discovery and lifecycle settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BotConfig {
    /// Root directory holding one subdirectory per worker.
    #[serde(default = "default_bots_directory")]
    pub directory: PathBuf,
    /// Restart workers automatically when the monitor finds them crashed.
    #[serde(default = "default_true")]
    pub auto_restart: bool,
    /// Start every discovered worker right after the initial discovery.
    #[serde(default)]
    pub start_on_boot: bool,
    /// Program used to run a worker's entry point.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Extension (without the dot) of worker entry points and watched scripts.
    #[serde(default = "default_script_extension")]
    pub script_extension: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            directory: default_bots_directory(),
            auto_restart: true,
            start_on_boot: false,
            interpreter: default_interpreter(),
            script_extension: default_script_extension(),
        }
    }
}

/// Host identity and heartbeat settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SystemConfig {
    /// Seconds between heartbeats.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// Display name this host registers under.
    #[serde(default = "default_host_name")]
    pub name: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            name: default_host_name(),
        }
    }
}

fn default_server_url() -> String {
    "http://localhost:3001".into()
}

fn default_bots_directory() -> PathBuf {
    PathBuf::from("/home/pi/bots")
}

fn default_true() -> bool {
    true
}

fn default_interpreter() -> String {
    "node".into()
}

fn default_script_extension() -> String {
    "js".into()
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_host_name() -> String {
    "RaspberryPi-01".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Control-plane settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Worker settings.
    #[serde(default)]
    pub bot: BotConfig,
    /// Host settings.
    #[serde(default)]
    pub system: SystemConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Load the configuration at `path`, writing a default file first when
    /// none exists.
    ///
    /// Failing to write the default file is not fatal; the defaults are
    /// used in memory either way.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if an existing file is unreadable or
    /// invalid.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load_from_path(path);
        }

        let config = Self::default();
        match config.write_default_file(path) {
            Ok(()) => info!(path = %path.display(), "wrote default configuration"),
            Err(err) => warn!(%err, path = %path.display(), "could not write default configuration"),
        }
        Ok(config)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Heartbeat period as a [`Duration`].
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.system.heartbeat_interval)
    }

    fn write_default_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(self)
            .map_err(|err| AppError::Config(format!("failed to render default config: {err}")))?;
        fs::write(path, rendered)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.server.url)
            .map_err(|err| AppError::Config(format!("server.url invalid: {err}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "server.url must use http or https, got {}",
                url.scheme()
            )));
        }

        if self.system.heartbeat_interval == 0 {
            return Err(AppError::Config(
                "system.heartbeat_interval must be greater than zero".into(),
            ));
        }

        if self.system.name.trim().is_empty() {
            return Err(AppError::Config("system.name must not be empty".into()));
        }

        if self.bot.interpreter.trim().is_empty() {
            return Err(AppError::Config("bot.interpreter must not be empty".into()));
        }

        let ext = self.bot.script_extension.trim();
        if ext.is_empty() || ext.starts_with('.') {
            return Err(AppError::Config(
                "bot.script_extension must be a bare extension such as \"js\"".into(),
            ));
        }

        Ok(())
    }
}
