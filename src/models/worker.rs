//! Worker lifecycle state and status snapshot.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AppError;

/// Lifecycle state of a supervised worker.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// No process, or cleanly stopped.
    #[default]
    Stopped,
    /// Process launched and presumed alive.
    Running,
    /// Was running; a liveness check found the process gone.
    Crashed,
    /// The last launch attempt failed before a process existed.
    Failed,
}

impl WorkerState {
    /// Wire representation used in status reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Crashed => "crashed",
            Self::Failed => "failed",
        }
    }
}

impl Display for WorkerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle action a control command may request for a worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    /// Launch the worker if it is not already live.
    Start,
    /// Stop the worker's process group.
    Stop,
    /// Stop, settle, then start.
    Restart,
}

impl ControlAction {
    /// Wire representation used by the control plane.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

impl Display for ControlAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlAction {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            other => Err(AppError::UnsupportedAction(other.to_owned())),
        }
    }
}

/// Point-in-time view of one worker, as reported upstream and to the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerStatus {
    /// Worker name (its directory name).
    pub name: String,
    /// Reconciled lifecycle state.
    pub status: WorkerState,
    /// OS process id while live.
    pub pid: Option<u32>,
    /// Most recent successful launch.
    pub last_start: Option<DateTime<Utc>>,
    /// Number of successful launches so far.
    pub restart_count: u32,
    /// Seconds since `last_start` while live, otherwise zero.
    pub uptime: f64,
}
