//! Pointing Blender's bundled python at a conda environment.
//!
//! `<root>/python` is moved aside to `<root>/_old_python` and replaced with a
//! symlink to the environment prefix. Restoring reverses the move.

use crate::error::{InstallerError, Result};
use crate::utils::fs::{is_empty_dir, path_present, remove_path, symlink_dir};
use std::fs;
use std::path::{Path, PathBuf};

pub const PYTHON_DIR: &str = "python";
pub const BACKUP_DIR: &str = "_old_python";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The bundled python was moved aside and linked
    Linked { prefix: PathBuf },
    /// A link from an earlier install was pointed at `prefix`
    Relinked { prefix: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    NothingToRestore,
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.is_dir())
}

/// Replace `<root>/python` with a link to `prefix`
pub fn link_prefix(root: &Path, prefix: &Path) -> Result<LinkOutcome> {
    let prefix = prefix
        .canonicalize()
        .map_err(|_| InstallerError::not_found(prefix, "CONDA_PREFIX does not exist"))?;
    if !prefix.is_dir() {
        return Err(InstallerError::InvalidState(format!(
            "CONDA_PREFIX {} is not a directory",
            prefix.display()
        )));
    }

    let python = root.join(PYTHON_DIR);
    let backup = root.join(BACKUP_DIR);

    if path_present(&backup) {
        // Earlier conda install; the bundled python is already safe
        if !is_real_dir(&backup) || is_empty_dir(&backup)? {
            return Err(InstallerError::InvalidState(format!(
                "backup of Blender's python at {} is corrupt, replace it with a copy",
                backup.display()
            )));
        }
        if is_real_dir(&python) {
            return Err(InstallerError::InvalidState(format!(
                "both {} and {} are directories, move one of them away",
                python.display(),
                backup.display()
            )));
        }
        remove_path(&python)?;
        symlink_dir(&prefix, &python)?;
        tracing::info!("relinked {} -> {}", python.display(), prefix.display());
        return Ok(LinkOutcome::Relinked { prefix });
    }

    if !is_real_dir(&python) {
        return Err(InstallerError::not_found(
            python,
            "Blender's bundled python directory is missing",
        ));
    }

    fs::rename(&python, &backup).map_err(|e| InstallerError::io_at(&python, e))?;
    if let Err(e) = symlink_dir(&prefix, &python) {
        if let Err(undo) = fs::rename(&backup, &python) {
            tracing::error!("could not move {} back: {}", backup.display(), undo);
        }
        return Err(e);
    }
    tracing::info!("linked {} -> {}", python.display(), prefix.display());

    Ok(LinkOutcome::Linked { prefix })
}

/// Put the bundled python back. A real, non-empty `python` directory is
/// never deleted; that is reported as an error instead.
pub fn restore(root: &Path) -> Result<RestoreOutcome> {
    let python = root.join(PYTHON_DIR);
    let backup = root.join(BACKUP_DIR);

    if !path_present(&backup) {
        return Ok(RestoreOutcome::NothingToRestore);
    }

    if is_symlink(&python) || !is_real_dir(&python) {
        remove_path(&python)?;
    } else if is_empty_dir(&python)? {
        fs::remove_dir(&python).map_err(|e| InstallerError::io_at(&python, e))?;
    } else {
        return Err(InstallerError::InvalidState(format!(
            "{} is a real directory, not a link; back up its content, remove it and retry",
            python.display()
        )));
    }

    fs::rename(&backup, &python).map_err(|e| InstallerError::io_at(&backup, e))?;
    tracing::info!("restored {}", python.display());
    Ok(RestoreOutcome::Restored)
}

/// Is `<root>/python` currently a link made by [`link_prefix`]?
pub fn is_linked(root: &Path) -> bool {
    path_present(&root.join(BACKUP_DIR)) && is_symlink(&root.join(PYTHON_DIR))
}
