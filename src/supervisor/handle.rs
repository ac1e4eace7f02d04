//! Worker handle: one managed process and its OS-level control.
//!
//! Each worker runs `<interpreter> <entry point>` in its own process
//! group so that stop signals reach every descendant the script forks.
//! Stopping is a two-phase state machine: the group receives `SIGTERM`,
//! and if the leader has not exited when the grace period elapses the
//! group receives `SIGKILL`.
//!
//! A handle is never shared directly. The supervisor keeps each one
//! behind its own mutex, so every method here runs with exclusive access
//! to the worker.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::models::worker::{WorkerState, WorkerStatus};
use crate::{AppError, Result};

/// Fixed lifecycle delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// How long a stopping worker may take to exit after `SIGTERM`.
    pub stop_grace: Duration,
    /// Pause between the stop and start halves of a restart.
    pub restart_settle: Duration,
    /// Period of the crash-monitor loop.
    pub monitor_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            stop_grace: Duration::from_secs(5),
            restart_settle: Duration::from_secs(2),
            monitor_interval: Duration::from_secs(10),
        }
    }
}

/// Result of a [`WorkerHandle::start`] call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new process was launched.
    Started {
        /// OS process id of the new group leader.
        pid: u32,
    },
    /// The worker already had a live process; nothing was spawned.
    AlreadyRunning,
}

impl StartOutcome {
    /// Boolean outcome as reported for control commands.
    #[must_use]
    pub fn is_started(self) -> bool {
        matches!(self, Self::Started { .. })
    }
}

/// Result of a [`WorkerHandle::stop`] call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No live process existed.
    AlreadyStopped,
    /// The process group exited within the grace period after `SIGTERM`.
    Graceful,
    /// The grace period elapsed and the group was killed.
    Forced,
}

/// Phases of the stop state machine.
#[derive(Debug)]
enum StopPhase {
    Terminating,
    Killing,
    Exited(StopOutcome),
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

/// Lifecycle state and process handle for one worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    entry_point: PathBuf,
    working_dir: PathBuf,
    interpreter: String,
    timings: Timings,
    state: WorkerState,
    child: Option<Child>,
    last_start: Option<DateTime<Utc>>,
    started_at: Option<Instant>,
    restart_count: u32,
    crash_pending: bool,
}

impl WorkerHandle {
    /// Create a handle in the `stopped` state.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        entry_point: PathBuf,
        working_dir: PathBuf,
        interpreter: impl Into<String>,
        timings: Timings,
    ) -> Self {
        Self {
            name: name.into(),
            entry_point,
            working_dir,
            interpreter: interpreter.into(),
            timings,
            state: WorkerState::Stopped,
            child: None,
            last_start: None,
            started_at: None,
            restart_count: 0,
            crash_pending: false,
        }
    }

    /// Worker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical lifecycle state, without reconciling against the OS.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Number of successful launches.
    #[must_use]
    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    /// Process id of the current process, if one was launched and not yet reaped.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Whether the OS process exists and has not exited. Never fails.
    pub fn is_running(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) => false,
            Err(err) => {
                warn!(worker = %self.name, %err, "failed to poll worker process");
                false
            }
        }
    }

    /// Launch the worker unless it is already live.
    ///
    /// Must be called from within a Tokio runtime; the worker's output is
    /// forwarded to the log by background tasks.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the OS refuses to create the process;
    /// the worker is left in the `failed` state.
    pub fn start(&mut self) -> Result<StartOutcome> {
        let span = info_span!("worker_start", worker = %self.name);
        let _guard = span.enter();

        if self.is_running() {
            warn!("worker already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(&self.entry_point)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                self.child = None;
                self.started_at = None;
                self.state = WorkerState::Failed;
                error!(%err, interpreter = %self.interpreter, "worker launch failed");
                return Err(AppError::Spawn(format!(
                    "failed to launch {}: {err}",
                    self.entry_point.display()
                )));
            }
        };

        let pid = child.id().unwrap_or_default();
        if let Some(stdout) = child.stdout.take() {
            forward_output(self.name.clone(), "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(self.name.clone(), "stderr", stderr);
        }

        self.child = Some(child);
        self.last_start = Some(Utc::now());
        self.started_at = Some(Instant::now());
        self.restart_count += 1;
        self.state = WorkerState::Running;
        self.crash_pending = false;

        info!(pid, restart_count = self.restart_count, "worker started");
        Ok(StartOutcome::Started { pid })
    }

    /// Stop the worker's process group, escalating to a kill after the
    /// grace period. Always leaves the worker `stopped` on success.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Signal` if the group cannot be signalled or does
    /// not exit even after `SIGKILL`, and `AppError::Io` if waiting on the
    /// process fails. The worker state is unchanged in those cases.
    pub async fn stop(&mut self) -> Result<StopOutcome> {
        let span = info_span!("worker_stop", worker = %self.name);
        self.stop_inner().instrument(span).await
    }

    async fn stop_inner(&mut self) -> Result<StopOutcome> {
        if !self.is_running() {
            self.child = None;
            self.started_at = None;
            self.state = WorkerState::Stopped;
            self.crash_pending = false;
            debug!("worker already stopped");
            return Ok(StopOutcome::AlreadyStopped);
        }

        let grace = self.timings.stop_grace;
        let Some(child) = self.child.as_mut() else {
            return Ok(StopOutcome::AlreadyStopped);
        };

        let mut phase = StopPhase::Terminating;
        let outcome = loop {
            phase = match phase {
                StopPhase::Terminating => {
                    signal_group(child, GroupSignal::Terminate)?;
                    match tokio::time::timeout(grace, child.wait()).await {
                        Ok(Ok(status)) => {
                            debug!(?status, "worker exited after SIGTERM");
                            StopPhase::Exited(StopOutcome::Graceful)
                        }
                        Ok(Err(err)) => {
                            return Err(AppError::Io(format!("failed to wait for worker: {err}")))
                        }
                        Err(_elapsed) => {
                            warn!(?grace, "worker ignored SIGTERM, escalating to SIGKILL");
                            StopPhase::Killing
                        }
                    }
                }
                StopPhase::Killing => {
                    signal_group(child, GroupSignal::Kill)?;
                    match tokio::time::timeout(grace, child.wait()).await {
                        Ok(Ok(status)) => {
                            debug!(?status, "worker exited after SIGKILL");
                            StopPhase::Exited(StopOutcome::Forced)
                        }
                        Ok(Err(err)) => {
                            return Err(AppError::Io(format!("failed to wait for worker: {err}")))
                        }
                        Err(_elapsed) => {
                            return Err(AppError::Signal(
                                "worker did not exit after SIGKILL".into(),
                            ))
                        }
                    }
                }
                StopPhase::Exited(outcome) => break outcome,
            };
        };

        self.child = None;
        self.started_at = None;
        self.state = WorkerState::Stopped;
        self.crash_pending = false;
        info!(?outcome, "worker stopped");
        Ok(outcome)
    }

    /// Stop, wait for the settle delay, then start.
    ///
    /// A failed stop is logged and the start is still attempted; if the
    /// old process survived, the start reports
    /// [`StartOutcome::AlreadyRunning`].
    ///
    /// # Errors
    ///
    /// Returns the error of the start half.
    pub async fn restart(&mut self) -> Result<StartOutcome> {
        info!(worker = %self.name, "restarting worker");
        if let Err(err) = self.stop().await {
            warn!(worker = %self.name, %err, "stop before restart failed");
        }
        tokio::time::sleep(self.timings.restart_settle).await;
        self.start()
    }

    /// Move a logically running worker whose process is gone to `crashed`.
    /// Returns whether the process is live.
    fn reconcile(&mut self) -> bool {
        let live = self.is_running();
        if !live && self.state == WorkerState::Running {
            let exit = self
                .child
                .as_mut()
                .and_then(|child| child.try_wait().ok().flatten());
            self.state = WorkerState::Crashed;
            self.started_at = None;
            self.crash_pending = true;
            warn!(worker = %self.name, ?exit, "worker crashed");
        }
        live
    }

    /// Report a crash not yet handled by a previous call.
    ///
    /// Each crash is reported once, whether it was first observed here or
    /// by [`status_snapshot`](Self::status_snapshot).
    pub fn detect_crash(&mut self) -> bool {
        self.reconcile();
        std::mem::take(&mut self.crash_pending)
    }

    /// Reconcile the logical state with the OS and return a snapshot.
    pub fn status_snapshot(&mut self) -> WorkerStatus {
        let live = self.reconcile();

        WorkerStatus {
            name: self.name.clone(),
            status: self.state,
            pid: if live { self.pid() } else { None },
            last_start: self.last_start,
            restart_count: self.restart_count,
            uptime: match (live, self.started_at) {
                (true, Some(started)) => started.elapsed().as_secs_f64(),
                _ => 0.0,
            },
        }
    }
}

/// Forward each line of a worker's output stream to the log.
fn forward_output<R>(worker: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if stream == "stderr" => warn!(worker = %worker, stream, "{line}"),
                Ok(Some(line)) => info!(worker = %worker, stream, "{line}"),
                Ok(None) => break,
                Err(err) => {
                    debug!(worker = %worker, stream, %err, "worker output stream closed");
                    break;
                }
            }
        }
    });
}

#[cfg(unix)]
fn signal_group(child: &mut Child, signal: GroupSignal) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    // The leader was reaped already; nothing left to signal.
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pgid = i32::try_from(pid)
        .map_err(|_| AppError::Signal(format!("pid {pid} out of range")))?;
    let sig = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };

    match killpg(Pid::from_raw(pgid), sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(AppError::Signal(format!(
            "failed to send {sig} to group {pgid}: {err}"
        ))),
    }
}

#[cfg(not(unix))]
fn signal_group(child: &mut Child, _signal: GroupSignal) -> Result<()> {
    child
        .start_kill()
        .map_err(|err| AppError::Signal(format!("failed to kill worker: {err}")))
}
