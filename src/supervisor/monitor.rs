//! Crash monitor: periodic liveness reconciliation of every worker.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::supervisor::Supervisor;

/// Spawn the crash-monitor loop.
///
/// Every `monitor_interval` the supervisor checks each worker; crashed
/// workers are restarted when auto-restart is enabled. The loop ends when
/// the supervisor's cancellation token fires.
#[must_use]
pub fn spawn_crash_monitor(supervisor: Arc<Supervisor>) -> JoinHandle<()> {
    let interval = supervisor.timings().monitor_interval;
    let cancel = supervisor.cancellation_token();
    tokio::spawn(async move {
        info!(?interval, "crash monitor started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("crash monitor shutting down");
                    break;
                }
                () = tokio::time::sleep(interval) => {}
            }

            let crashed = supervisor.check_workers().await;
            if !crashed.is_empty() {
                warn!(?crashed, "crashed workers detected");
            }
        }
    })
}
