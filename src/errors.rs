//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The OS refused to launch a worker process.
    Spawn(String),
    /// Delivering a signal to a worker process group failed.
    Signal(String),
    /// HTTP request to the control plane failed or returned a bad status.
    Http(String),
    /// Persistent control-plane channel failure (connect, framing, emit).
    Channel(String),
    /// Artifact synchronization failure.
    Sync(String),
    /// File-system watcher setup failure.
    Watcher(String),
    /// File system path failed validation against a worker directory.
    PathViolation(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// A control command named an action outside start/stop/restart.
    UnsupportedAction(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// A launch was refused because the supervisor is shutting down.
    ShuttingDown(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Signal(msg) => write!(f, "signal: {msg}"),
            Self::Http(msg) => write!(f, "http: {msg}"),
            Self::Channel(msg) => write!(f, "channel: {msg}"),
            Self::Sync(msg) => write!(f, "sync: {msg}"),
            Self::Watcher(msg) => write!(f, "watcher: {msg}"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::UnsupportedAction(msg) => write!(f, "unsupported action: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::ShuttingDown(msg) => write!(f, "shutting down: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
