//! Worker discovery on the local filesystem.
//!
//! Every immediate subdirectory of the workers root is a candidate. Its
//! entry point is the first existing file among `index.<ext>`,
//! `main.<ext>`, `bot.<ext>` and `<dirname>.<ext>`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{AppError, Result};

/// Entry-point file stems, in precedence order, tried before `<dirname>`.
pub const ENTRY_POINT_STEMS: [&str; 3] = ["index", "main", "bot"];

/// A worker directory with a recognised entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredWorker {
    /// Directory name, used as the worker name.
    pub name: String,
    /// Entry-point script.
    pub entry_point: PathBuf,
    /// The worker directory itself.
    pub working_dir: PathBuf,
}

/// Find the entry point of a worker directory.
#[must_use]
pub fn find_entry_point(dir: &Path, extension: &str) -> Option<PathBuf> {
    let dir_name = dir.file_name()?.to_str()?;
    ENTRY_POINT_STEMS
        .iter()
        .copied()
        .chain(std::iter::once(dir_name))
        .map(|stem| dir.join(format!("{stem}.{extension}")))
        .find(|candidate| candidate.is_file())
}

/// Scan `root` for worker directories, sorted by name.
///
/// Directories without an entry point, names that are not valid UTF-8 and
/// entries that cannot be read are skipped.
///
/// # Errors
///
/// Returns `AppError::NotFound` if `root` is not a directory and
/// `AppError::Io` if it cannot be listed.
pub fn scan(root: &Path, extension: &str) -> Result<Vec<DiscoveredWorker>> {
    if !root.is_dir() {
        return Err(AppError::NotFound(format!(
            "workers directory {}",
            root.display()
        )));
    }

    let entries = fs::read_dir(root)?.map(|entry| entry.map(|entry| entry.path()));
    Ok(collect_workers(entries, extension))
}

/// Turn directory listing results into discovered workers, sorted by name.
///
/// A failed entry is logged and skipped; the rest of the listing is still
/// used.
pub fn collect_workers<I>(entries: I, extension: &str) -> Vec<DiscoveredWorker>
where
    I: IntoIterator<Item = io::Result<PathBuf>>,
{
    let mut found = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(err) => {
                warn!(%err, "skipping unreadable directory entry");
                continue;
            }
        };
        if !path.is_dir() {
            continue;
        }

        let Some(name) = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
        else {
            warn!(path = %path.display(), "skipping worker directory with non-UTF-8 name");
            continue;
        };

        match find_entry_point(&path, extension) {
            Some(entry_point) => found.push(DiscoveredWorker {
                name,
                entry_point,
                working_dir: path,
            }),
            None => debug!(worker = %name, "no entry point found"),
        }
    }

    found.sort_by(|a, b| a.name.cmp(&b.name));
    found
}
