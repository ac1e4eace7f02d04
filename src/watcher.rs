//! Change watcher for worker scripts.
//!
//! [`ChangeWatcher`] watches the workers root recursively with the
//! `notify` crate. A content modification of a file carrying the worker
//! script extension produces the owning worker's name on an unbounded
//! channel; the supervisor's restart consumer decides whether the name
//! is registered and restarts it.
//!
//! Rapid repeated edits are not debounced here.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Path segment that conventionally holds the worker directories.
pub const BOTS_SEGMENT: &str = "bots";

/// Watches the workers root and reports which worker a change belongs to.
///
/// Dropping the watcher stops the underlying OS watch.
pub struct ChangeWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl ChangeWatcher {
    /// Start watching `root` recursively.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Watcher` if `root` does not exist or the OS watch
    /// cannot be created.
    pub fn start(root: &Path, extension: &str, changes: mpsc::UnboundedSender<String>) -> Result<Self> {
        if !root.is_dir() {
            return Err(AppError::Watcher(format!(
                "workers directory {} does not exist",
                root.display()
            )));
        }

        let root_for_callback = root.to_path_buf();
        let extension = extension.to_owned();

        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) if is_content_change(&event) => {
                    for path in event
                        .paths
                        .iter()
                        .filter(|path| path.extension() == Some(OsStr::new(&extension)))
                    {
                        let Some(owner) = owner_of(&root_for_callback, path) else {
                            debug!(path = %path.display(), "changed script has no owning worker");
                            continue;
                        };
                        info!(path = %path.display(), worker = %owner, "worker script changed");
                        if changes.send(owner).is_err() {
                            debug!("restart consumer gone; dropping change");
                        }
                    }
                }
                Ok(_) => {}
                Err(err) => warn!(%err, "worker file watcher error"),
            },
        )
        .map_err(|err| AppError::Watcher(format!("failed to create watcher: {err}")))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|err| {
                AppError::Watcher(format!("failed to watch {}: {err}", root.display()))
            })?;

        info!(root = %root.display(), "change watcher started");
        Ok(Self {
            _watcher: watcher,
            root: root.to_path_buf(),
        })
    }

    /// Directory being watched.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Modifications other than metadata-only changes.
fn is_content_change(event: &Event) -> bool {
    matches!(event.kind, EventKind::Modify(kind) if !matches!(kind, ModifyKind::Metadata(_)))
}

/// Name of the worker that owns `path`.
///
/// For paths under `root` this is the first component below it. Other
/// paths fall back to the component after the last `bots` segment.
#[must_use]
pub fn owner_of(root: &Path, path: &Path) -> Option<String> {
    if let Ok(relative) = path.strip_prefix(root) {
        let mut components = relative.components();
        let first = components.next()?;
        // A file directly in the root belongs to no worker.
        components.next()?;
        return normal_name(first);
    }

    let components: Vec<Component<'_>> = path.components().collect();
    let bots = components
        .iter()
        .rposition(|c| c.as_os_str() == OsStr::new(BOTS_SEGMENT))?;
    // The owner must be a directory, not the changed file itself.
    if bots + 2 >= components.len() {
        return None;
    }
    normal_name(components[bots + 1])
}

fn normal_name(component: Component<'_>) -> Option<String> {
    match component {
        Component::Normal(name) => name.to_str().map(str::to_owned),
        _ => None,
    }
}
