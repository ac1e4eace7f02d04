//! Artifact synchronization.
//!
//! A sync pulls a worker's declared file set from an [`ArtifactSource`],
//! writes the files whose local content hash differs from the declared
//! hash, and then brings the worker up to date: a registered worker is
//! restarted only when at least one file was written, and a worker that
//! was not registered yet is discovered and started.

pub mod path_safety;
pub mod writer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, info_span, Instrument};

use crate::control::ArtifactSource;
use crate::models::artifact::ArtifactFile;
use crate::supervisor::Supervisor;
use crate::{AppError, Result};

/// What a sync did to the worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Registered worker restarted because files changed.
    Restarted,
    /// Previously unregistered worker discovered and started.
    Started,
    /// Registered worker left alone; nothing changed on disk.
    Unchanged,
    /// Files were written but no entry point exists, so nothing runs.
    NotStartable,
}

/// Result of one sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Worker the files belong to.
    pub worker: String,
    /// Files written by this sync.
    pub written: Vec<PathBuf>,
    /// Files whose local content already matched.
    pub unchanged: usize,
    /// Effect on the worker process.
    pub action: SyncAction,
}

/// Reconciles local worker directories with the control plane.
pub struct ArtifactSynchronizer {
    source: Arc<dyn ArtifactSource>,
    supervisor: Arc<Supervisor>,
}

impl ArtifactSynchronizer {
    /// Create a synchronizer that writes below the supervisor's workers root.
    #[must_use]
    pub fn new(source: Arc<dyn ArtifactSource>, supervisor: Arc<Supervisor>) -> Self {
        Self { source, supervisor }
    }

    /// Synchronize the worker with control-plane id `bot_id`.
    ///
    /// # Errors
    ///
    /// Returns the fetch error, `AppError::Sync` for an empty file set or a
    /// failed write, `AppError::PathViolation` for names escaping the
    /// worker directory, and the restart or start error of the worker.
    /// Files written before a failure stay written.
    pub async fn sync(&self, bot_id: &str) -> Result<SyncReport> {
        let span = info_span!("artifact_sync", bot_id);
        self.sync_inner(bot_id).instrument(span).await
    }

    async fn sync_inner(&self, bot_id: &str) -> Result<SyncReport> {
        let bundle = self.source.fetch(bot_id).await?;
        let worker = bundle.bot.name;
        path_safety::validate_worker_name(&worker)?;
        if bundle.files.is_empty() {
            return Err(AppError::Sync(format!("no files declared for {worker}")));
        }

        let dir = self.supervisor.settings().workers_root.join(&worker);
        let files = bundle.files;
        let (written, unchanged) = tokio::task::spawn_blocking(move || reconcile(&dir, &files))
            .await
            .map_err(|err| AppError::Sync(format!("file reconciliation task failed: {err}")))??;

        info!(
            worker = %worker,
            written = written.len(),
            unchanged,
            "artifact files reconciled"
        );

        let action = if self.supervisor.contains(&worker).await {
            if written.is_empty() {
                debug!(worker = %worker, "no file changed; restart skipped");
                SyncAction::Unchanged
            } else {
                self.supervisor.restart(&worker).await?;
                SyncAction::Restarted
            }
        } else {
            self.supervisor.discover().await?;
            if self.supervisor.contains(&worker).await {
                self.supervisor.start(&worker).await?;
                SyncAction::Started
            } else {
                info!(worker = %worker, "synced worker has no entry point yet");
                SyncAction::NotStartable
            }
        };

        Ok(SyncReport {
            worker,
            written,
            unchanged,
            action,
        })
    }
}

/// Write every file whose local hash differs from its declared hash.
///
/// A file without a declared hash is compared against the hash of its
/// supplied content. Returns the written paths and the unchanged count.
fn reconcile(dir: &Path, files: &[ArtifactFile]) -> Result<(Vec<PathBuf>, usize)> {
    std::fs::create_dir_all(dir).map_err(|err| {
        AppError::Sync(format!("failed to create {}: {err}", dir.display()))
    })?;

    let mut written = Vec::new();
    let mut unchanged = 0;
    for file in files {
        let target = path_safety::resolve_in(dir, &file.file_name)?;
        let expected = file
            .file_hash
            .clone()
            .unwrap_or_else(|| writer::sha256_hex(file.file_content.as_bytes()));

        match writer::local_hash(&target) {
            Some(local) if local.eq_ignore_ascii_case(expected.trim()) => {
                debug!(file = %file.file_name, "file unchanged");
                unchanged += 1;
            }
            _ => {
                writer::write_atomic(&target, file.file_content.as_bytes())?;
                info!(file = %file.file_name, "file updated");
                written.push(target);
            }
        }
    }
    Ok((written, unchanged))
}
