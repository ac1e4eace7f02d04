//! Host resource sampling for heartbeats.

use std::net::UdpSocket;

use sysinfo::{Disks, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tracing::warn;

use crate::models::host::HostStatus;

/// Reported when the local address cannot be determined.
pub const UNKNOWN_IP: &str = "Unknown";

/// Raw host measurements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostSample {
    /// Primary local IPv4 address.
    pub ip_address: String,
    /// Global CPU utilization in percent.
    pub cpu_usage: f32,
    /// Memory utilization in percent.
    pub memory_usage: f64,
    /// Root filesystem utilization in percent.
    pub disk_usage: f64,
    /// Host uptime in seconds.
    pub uptime: u64,
}

/// Build a heartbeat snapshot for this host.
///
/// Sampling blocks for the CPU measurement window, so it runs on the
/// blocking pool. A failed sample is logged and reported as zeros.
pub async fn collect(name: &str, running_bots: Vec<String>, total_bots: usize) -> HostStatus {
    let sample = tokio::task::spawn_blocking(sample_host)
        .await
        .unwrap_or_else(|err| {
            warn!(%err, "host sampling task failed");
            HostSample {
                ip_address: UNKNOWN_IP.into(),
                ..HostSample::default()
            }
        });

    HostStatus {
        name: name.to_owned(),
        ip_address: sample.ip_address,
        cpu_usage: sample.cpu_usage,
        memory_usage: sample.memory_usage,
        disk_usage: sample.disk_usage,
        running_bots,
        total_bots,
        uptime: sample.uptime,
    }
}

/// Sample CPU, memory, disk and uptime. Blocks for
/// [`MINIMUM_CPU_UPDATE_INTERVAL`].
#[must_use]
#[allow(clippy::cast_precision_loss)] // Byte counts far below 2^52.
pub fn sample_host() -> HostSample {
    let mut sys = System::new();
    sys.refresh_cpu_usage();
    std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu_usage();
    sys.refresh_memory();

    let memory_usage = percent(sys.used_memory() as f64, sys.total_memory() as f64);

    let disks = Disks::new_with_refreshed_list();
    let root_disk = disks
        .list()
        .iter()
        .find(|disk| disk.mount_point() == std::path::Path::new("/"))
        .or_else(|| disks.list().iter().max_by_key(|disk| disk.total_space()));
    let disk_usage = root_disk.map_or(0.0, |disk| {
        let total = disk.total_space();
        let used = total.saturating_sub(disk.available_space());
        percent(used as f64, total as f64)
    });

    HostSample {
        ip_address: local_ip(),
        cpu_usage: sys.global_cpu_usage(),
        memory_usage,
        disk_usage,
        uptime: System::uptime(),
    }
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}

/// Address of the interface used for outbound traffic. No packet is sent.
fn local_ip() -> String {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map_or_else(|_| UNKNOWN_IP.to_owned(), |addr| addr.ip().to_string())
}
