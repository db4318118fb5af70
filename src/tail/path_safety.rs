//! Transcript path validation.
//!
//! Transcript paths arrive in hook payloads and must stay inside the
//! allow-listed log root. Symlinked and non-regular targets are refused
//! outright rather than followed.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::{AppError, Result};

/// Validate that `candidate` is a regular file inside `log_root`.
///
/// Relative candidates are resolved against the root. Returns the canonical
/// path on success.
///
/// # Errors
///
/// Returns `AppError::PathViolation` if:
/// - The log root cannot be canonicalized.
/// - The candidate contains `..` segments that escape the root.
/// - The candidate is a symlink, is missing, or is not a regular file.
/// - The resolved path does not start with the canonical root.
pub fn validate_log_path(log_root: &Path, candidate: impl AsRef<Path>) -> Result<PathBuf> {
    let root = log_root
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("log root invalid: {err}")))?;

    let mut normalized = PathBuf::new();
    for component in candidate.as_ref().components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(AppError::PathViolation(
                        "path attempts to escape log root".into(),
                    ));
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                normalized.push(component.as_os_str());
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    let absolute = if normalized.is_absolute() {
        normalized
    } else {
        root.join(normalized)
    };

    ensure_regular_file(&absolute)?;

    let canonical = absolute
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("cannot resolve path: {err}")))?;

    if !canonical.starts_with(&root) {
        return Err(AppError::PathViolation("path outside log root".into()));
    }

    Ok(canonical)
}

/// Refuse anything that is not a plain file, without following symlinks.
///
/// # Errors
///
/// Returns `AppError::PathViolation` for symlinks, directories and other
/// special files, or if the path cannot be inspected.
pub fn ensure_regular_file(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path)
        .map_err(|err| AppError::PathViolation(format!("cannot inspect path: {err}")))?;

    if metadata.file_type().is_symlink() {
        return Err(AppError::PathViolation("symlinked transcript refused".into()));
    }
    if !metadata.is_file() {
        return Err(AppError::PathViolation("transcript is not a regular file".into()));
    }
    Ok(())
}
