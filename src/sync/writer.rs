//! Atomic artifact writes and content hashing.

use std::io::Write;
use std::path::Path;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::{AppError, Result};

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Hash of the file at `path`, or `None` if it cannot be read.
#[must_use]
pub fn local_hash(path: &Path) -> Option<String> {
    std::fs::read(path).ok().map(|bytes| sha256_hex(&bytes))
}

/// Write `content` to `target` through a temporary file in the same
/// directory, creating parent directories as needed.
///
/// Readers see either the old content or the new content, never a mix.
///
/// # Errors
///
/// Returns `AppError::Sync` on directory creation, write, or rename failure.
pub fn write_atomic(target: &Path, content: &[u8]) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| AppError::Sync(format!("{} has no parent directory", target.display())))?;

    std::fs::create_dir_all(parent).map_err(|err| {
        AppError::Sync(format!(
            "failed to create parent directories for {}: {err}",
            target.display()
        ))
    })?;

    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|err| AppError::Sync(format!("failed to create temporary file: {err}")))?;
    tmp.write_all(content)
        .map_err(|err| AppError::Sync(format!("failed to write temporary file: {err}")))?;

    tmp.persist(target).map_err(|err| {
        AppError::Sync(format!("failed to persist {}: {err}", target.display()))
    })?;
    Ok(())
}
