#![forbid(unsafe_code)]

//! Process supervisor for script workers managed by a remote control plane.

pub mod config;
pub mod control;
pub mod errors;
pub mod host;
pub mod models;
pub mod supervisor;
pub mod sync;
pub mod watcher;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
