//! The supervisor core: worker registry and lifecycle operations.
//!
//! The registry maps worker names to handles, each behind its own async
//! mutex. Callers never see a handle directly: every operation clones the
//! worker's slot out of the registry, releases the registry lock, and then
//! holds the worker lock for the whole lifecycle operation. Operations on
//! one worker are therefore serialized while different workers proceed in
//! parallel.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::control::Uplink;
use crate::host;
use crate::models::command::OutboundEvent;
use crate::models::host::HostStatus;
use crate::models::worker::{ControlAction, WorkerStatus};
use crate::supervisor::discovery;
use crate::supervisor::handle::{StartOutcome, StopOutcome, Timings, WorkerHandle};
use crate::watcher::ChangeWatcher;
use crate::{AppError, Result};

type Slot = Arc<Mutex<WorkerHandle>>;

/// Static supervisor settings derived from the configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Directory holding one subdirectory per worker.
    pub workers_root: PathBuf,
    /// Program that runs entry points.
    pub interpreter: String,
    /// Entry-point extension, without the dot.
    pub script_extension: String,
    /// Restart crashed workers from the monitor loop.
    pub auto_restart: bool,
    /// Name reported in heartbeats.
    pub host_name: String,
}

impl SupervisorSettings {
    /// Extract the supervisor settings from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            workers_root: config.bot.directory.clone(),
            interpreter: config.bot.interpreter.clone(),
            script_extension: config.bot.script_extension.clone(),
            auto_restart: config.bot.auto_restart,
            host_name: config.system.name.clone(),
        }
    }
}

/// Outcome of one discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Workers registered by this pass.
    pub added: Vec<String>,
    /// Vanished, non-live workers removed by this pass.
    pub pruned: Vec<String>,
    /// Registry size after the pass.
    pub total: usize,
}

/// Owns the worker registry and every operation on it.
pub struct Supervisor {
    settings: SupervisorSettings,
    timings: Timings,
    registry: RwLock<BTreeMap<String, Slot>>,
    uplink: Arc<dyn Uplink>,
    running: AtomicBool,
    cancel: CancellationToken,
    watcher: std::sync::Mutex<Option<ChangeWatcher>>,
}

impl Supervisor {
    /// Create a supervisor with an empty registry.
    #[must_use]
    pub fn new(settings: SupervisorSettings, timings: Timings, uplink: Arc<dyn Uplink>) -> Self {
        Self {
            settings,
            timings,
            registry: RwLock::new(BTreeMap::new()),
            uplink,
            running: AtomicBool::new(true),
            cancel: CancellationToken::new(),
            watcher: std::sync::Mutex::new(None),
        }
    }

    /// Token cancelled when shutdown begins; background loops select on it.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// `false` once shutdown has begun.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Settings this supervisor was built with.
    #[must_use]
    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Lifecycle delays applied to every worker.
    #[must_use]
    pub fn timings(&self) -> Timings {
        self.timings
    }

    /// Control-plane reporting surface.
    #[must_use]
    pub fn uplink(&self) -> &Arc<dyn Uplink> {
        &self.uplink
    }

    /// Hand the change watcher to the supervisor so shutdown can stop it.
    pub fn attach_watcher(&self, watcher: ChangeWatcher) {
        *self
            .watcher
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(watcher);
    }

    /// Scan the workers root and reconcile the registry with it.
    ///
    /// New directories are registered in the `stopped` state. Registered
    /// workers whose directory or entry point vanished are removed unless
    /// they still have a live process or are busy with another operation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the workers root does not exist and
    /// `AppError::Io` if it cannot be read.
    pub async fn discover(&self) -> Result<DiscoveryReport> {
        let span = info_span!("discover", root = %self.settings.workers_root.display());
        async {
            let found =
                discovery::scan(&self.settings.workers_root, &self.settings.script_extension)?;
            let mut report = DiscoveryReport::default();
            let mut registry = self.registry.write().await;

            let vanished: Vec<(String, Slot)> = registry
                .iter()
                .filter(|(name, _)| !found.iter().any(|worker| &worker.name == *name))
                .map(|(name, slot)| (name.clone(), Arc::clone(slot)))
                .collect();
            for (name, slot) in vanished {
                let Ok(mut handle) = slot.try_lock() else {
                    debug!(worker = %name, "vanished worker is busy; keeping it for now");
                    continue;
                };
                if handle.is_running() {
                    warn!(worker = %name, "worker directory vanished but process is live; keeping it");
                    continue;
                }
                drop(handle);
                registry.remove(&name);
                info!(worker = %name, "pruned vanished worker");
                report.pruned.push(name);
            }

            for worker in found {
                if registry.contains_key(&worker.name) {
                    continue;
                }
                info!(worker = %worker.name, entry_point = %worker.entry_point.display(), "worker discovered");
                let handle = WorkerHandle::new(
                    worker.name.clone(),
                    worker.entry_point,
                    worker.working_dir,
                    self.settings.interpreter.clone(),
                    self.timings,
                );
                registry.insert(worker.name.clone(), Arc::new(Mutex::new(handle)));
                report.added.push(worker.name);
            }

            report.total = registry.len();
            info!(
                added = report.added.len(),
                pruned = report.pruned.len(),
                total = report.total,
                "discovery complete"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Whether a worker with this name is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.registry.read().await.contains_key(name)
    }

    /// Registered worker names, sorted.
    pub async fn worker_names(&self) -> Vec<String> {
        self.registry.read().await.keys().cloned().collect()
    }

    /// Number of registered workers.
    pub async fn len(&self) -> usize {
        self.registry.read().await.len()
    }

    /// Whether no worker is registered.
    pub async fn is_empty(&self) -> bool {
        self.registry.read().await.is_empty()
    }

    async fn slot(&self, name: &str) -> Result<Slot> {
        self.registry
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("worker {name}")))
    }

    async fn slots(&self) -> Vec<Slot> {
        self.registry.read().await.values().cloned().collect()
    }

    /// Refuse new launches once shutdown has begun. Checked with the
    /// worker lock held, so a launch either precedes the shutdown stop
    /// pass on that worker or never happens.
    fn ensure_accepting(&self, name: &str) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(AppError::ShuttingDown(format!("not launching worker {name}")))
        }
    }

    /// Start a registered worker.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown names, `AppError::ShuttingDown`
    /// after shutdown has begun, and `AppError::Spawn` if the launch fails.
    pub async fn start(&self, name: &str) -> Result<StartOutcome> {
        let slot = self.slot(name).await?;
        let mut handle = slot.lock().await;
        self.ensure_accepting(name)?;
        handle.start()
    }

    /// Stop a registered worker.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown names and the handle's stop
    /// error otherwise.
    pub async fn stop(&self, name: &str) -> Result<StopOutcome> {
        let slot = self.slot(name).await?;
        let mut handle = slot.lock().await;
        handle.stop().await
    }

    /// Restart a registered worker.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown names, `AppError::ShuttingDown`
    /// after shutdown has begun, and `AppError::Spawn` if the relaunch fails.
    pub async fn restart(&self, name: &str) -> Result<StartOutcome> {
        let slot = self.slot(name).await?;
        let mut handle = slot.lock().await;
        self.ensure_accepting(name)?;
        handle.restart().await
    }

    /// Apply a control action and report whether it succeeded.
    ///
    /// Failures, including unknown workers, are logged rather than returned.
    pub async fn dispatch(&self, name: &str, action: ControlAction) -> bool {
        let span = info_span!("dispatch", worker = name, %action);
        async {
            let result = match action {
                ControlAction::Start => self.start(name).await.map(StartOutcome::is_started),
                ControlAction::Stop => self.stop(name).await.map(|_| true),
                ControlAction::Restart => self.restart(name).await.map(StartOutcome::is_started),
            };
            match result {
                Ok(done) => {
                    info!(done, "control action applied");
                    done
                }
                Err(err) => {
                    warn!(%err, "control action failed");
                    false
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Status snapshot of one worker, reconciled with the OS.
    pub async fn status(&self, name: &str) -> Option<WorkerStatus> {
        let slot = self.slot(name).await.ok()?;
        let mut handle = slot.lock().await;
        Some(handle.status_snapshot())
    }

    /// Status snapshots of every worker, sorted by name.
    pub async fn statuses(&self) -> Vec<WorkerStatus> {
        let mut out = Vec::new();
        for slot in self.slots().await {
            out.push(slot.lock().await.status_snapshot());
        }
        out
    }

    /// Names of workers with a live process, sorted.
    pub async fn running_workers(&self) -> Vec<String> {
        let mut out = Vec::new();
        for slot in self.slots().await {
            let mut handle = slot.lock().await;
            if handle.is_running() {
                out.push(handle.name().to_owned());
            }
        }
        out
    }

    /// Start every registered worker, returning how many were launched.
    /// Individual failures are logged.
    pub async fn start_all(&self) -> usize {
        let mut started = 0;
        for slot in self.slots().await {
            let mut handle = slot.lock().await;
            if !self.is_running() {
                debug!("shutdown begun; start_all abandoned");
                break;
            }
            match handle.start() {
                Ok(outcome) if outcome.is_started() => started += 1,
                Ok(_) => {}
                Err(err) => warn!(worker = %handle.name(), %err, "failed to start worker"),
            }
        }
        started
    }

    /// One crash-monitor pass over every worker.
    ///
    /// A worker that is logically running but whose process is gone is
    /// marked `crashed`. With auto-restart enabled it is restarted and a
    /// crash event is reported when the persistent channel is up. Returns
    /// the names of workers found crashed.
    pub async fn check_workers(&self) -> Vec<String> {
        let checks = self.slots().await.into_iter().map(|slot| async move {
            let mut handle = slot.lock().await;
            if !handle.detect_crash() {
                return None;
            }
            let name = handle.name().to_owned();
            if !self.settings.auto_restart {
                return Some(name);
            }
            if !self.is_running() {
                debug!(worker = %name, "shutdown begun; auto-restart skipped");
                return Some(name);
            }

            info!(worker = %name, "auto-restarting crashed worker");
            if let Err(err) = handle.restart().await {
                error!(worker = %name, %err, "auto-restart failed");
            }
            drop(handle);

            if self.uplink.is_connected() {
                let event = OutboundEvent::BotCrashed {
                    bot_name: name.clone(),
                    timestamp: Utc::now(),
                };
                if let Err(err) = self.uplink.emit(event).await {
                    warn!(worker = %name, %err, "failed to report crash");
                }
            }
            Some(name)
        });

        join_all(checks).await.into_iter().flatten().collect()
    }

    /// Build the heartbeat snapshot for this host.
    pub async fn host_snapshot(&self) -> HostStatus {
        let running = self.running_workers().await;
        let total = self.len().await;
        host::collect(&self.settings.host_name, running, total).await
    }

    /// Stop everything: background loops, live workers, the watcher and
    /// the control-plane channel. Only the first call does any work.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("shutdown already in progress");
            return;
        }
        info!("supervisor shutting down");
        self.cancel.cancel();

        let stops = self.slots().await.into_iter().map(|slot| async move {
            let mut handle = slot.lock().await;
            if !handle.is_running() {
                return;
            }
            if let Err(err) = handle.stop().await {
                warn!(worker = %handle.name(), %err, "failed to stop worker during shutdown");
            }
        });
        join_all(stops).await;

        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if watcher.is_some() {
            drop(watcher);
            info!("change watcher stopped");
        }

        self.uplink.close().await;
        info!("supervisor stopped");
    }
}
