//! Consumers of control-plane commands and watcher restart triggers.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::models::command::ControlCommand;
use crate::supervisor::Supervisor;
use crate::sync::ArtifactSynchronizer;

/// Spawn the task that applies inbound control commands.
///
/// Each command runs on its own task so a slow restart or sync of one
/// worker never delays commands for another. Per-worker ordering is
/// provided by the worker locks.
#[must_use]
pub fn spawn_command_loop(
    supervisor: Arc<Supervisor>,
    synchronizer: Arc<ArtifactSynchronizer>,
    mut rx: mpsc::Receiver<ControlCommand>,
) -> JoinHandle<()> {
    let cancel = supervisor.cancellation_token();
    tokio::spawn(async move {
        loop {
            let command = tokio::select! {
                () = cancel.cancelled() => {
                    info!("command loop shutting down");
                    break;
                }
                maybe_command = rx.recv() => {
                    if let Some(command) = maybe_command { command } else {
                        info!("command channel closed");
                        break;
                    }
                }
            };

            let supervisor = Arc::clone(&supervisor);
            let synchronizer = Arc::clone(&synchronizer);
            tokio::spawn(async move {
                match command {
                    ControlCommand::Worker { name, action } => {
                        supervisor.dispatch(&name, action).await;
                    }
                    ControlCommand::FileUpdate { bot_id } => {
                        match synchronizer.sync(&bot_id).await {
                            Ok(report) => info!(
                                bot_id,
                                worker = %report.worker,
                                written = report.written.len(),
                                action = ?report.action,
                                "artifact sync complete"
                            ),
                            Err(err) => warn!(bot_id, %err, "artifact sync failed"),
                        }
                    }
                }
            });
        }
    })
}

/// Spawn the task that restarts workers whose scripts changed.
///
/// Names already queued when a batch is drained are restarted once.
/// Names of unregistered workers are ignored.
#[must_use]
pub fn spawn_restart_consumer(
    supervisor: Arc<Supervisor>,
    mut rx: mpsc::UnboundedReceiver<String>,
) -> JoinHandle<()> {
    let cancel = supervisor.cancellation_token();
    tokio::spawn(async move {
        loop {
            let first = tokio::select! {
                () = cancel.cancelled() => {
                    info!("restart consumer shutting down");
                    break;
                }
                maybe_name = rx.recv() => {
                    if let Some(name) = maybe_name { name } else {
                        info!("change channel closed");
                        break;
                    }
                }
            };

            let mut batch = BTreeSet::from([first]);
            while let Ok(name) = rx.try_recv() {
                batch.insert(name);
            }

            for name in batch {
                if !supervisor.contains(&name).await {
                    info!(worker = %name, "change for unregistered worker ignored");
                    continue;
                }
                info!(worker = %name, "restarting worker after file change");
                if let Err(err) = supervisor.restart(&name).await {
                    warn!(worker = %name, %err, "restart after file change failed");
                }
            }
        }
    })
}
