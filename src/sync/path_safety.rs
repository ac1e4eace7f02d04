//! Confinement of artifact file names to their worker directory.
//!
//! Control-plane file names are untrusted. A name is accepted only if it
//! is relative, never climbs above the worker directory, and does not
//! resolve through a symlink to somewhere outside it.

use std::path::{Component, Path, PathBuf};

use crate::{AppError, Result};

/// Validate a worker name for use as a directory below the workers root.
///
/// # Errors
///
/// Returns `AppError::PathViolation` unless `name` is exactly one normal
/// path component.
pub fn validate_worker_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(AppError::PathViolation(format!(
            "invalid worker name {name:?}"
        ))),
    }
}

/// Resolve `file_name` inside `worker_dir`.
///
/// Returns the absolute target path. `worker_dir` must already exist.
///
/// # Errors
///
/// Returns `AppError::PathViolation` if:
/// - `worker_dir` cannot be canonicalized.
/// - `file_name` is absolute, empty, or `..` segments escape the directory.
/// - The target exists and resolves (through symlinks) outside the directory.
pub fn resolve_in(worker_dir: &Path, file_name: &str) -> Result<PathBuf> {
    let root = worker_dir
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("worker directory invalid: {err}")))?;

    let mut normalized = PathBuf::new();
    for component in Path::new(file_name).components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(AppError::PathViolation(format!(
                        "{file_name} escapes the worker directory"
                    )));
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::PathViolation(format!(
                    "{file_name} is not a relative path"
                )));
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(AppError::PathViolation(format!(
            "{file_name:?} does not name a file"
        )));
    }

    let target = root.join(normalized);

    // Existing targets and parents may be symlinks; follow them.
    let anchor = target
        .ancestors()
        .find(|candidate| candidate.exists())
        .unwrap_or(root.as_path());
    let resolved = anchor
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("cannot resolve {file_name}: {err}")))?;
    if !resolved.starts_with(&root) {
        return Err(AppError::PathViolation(format!(
            "{file_name} resolves outside the worker directory"
        )));
    }

    Ok(target)
}
