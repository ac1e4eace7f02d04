//! Host status snapshot sent with every heartbeat.

use serde::{Deserialize, Serialize};

/// Host and worker health, recomputed for each heartbeat.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct HostStatus {
    /// Configured host display name.
    pub name: String,
    /// Primary local IPv4 address, or `Unknown`.
    pub ip_address: String,
    /// Global CPU utilization in percent.
    pub cpu_usage: f32,
    /// Memory utilization in percent.
    pub memory_usage: f64,
    /// Root filesystem utilization in percent.
    pub disk_usage: f64,
    /// Names of workers whose process is currently live.
    pub running_bots: Vec<String>,
    /// Number of registered workers.
    pub total_bots: usize,
    /// Host uptime in seconds.
    pub uptime: u64,
}
