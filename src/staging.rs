//! Stage-then-rename replacement of the installed add-on.
//!
//! The new tree is built in a hidden sibling of the target and moved into
//! place with a single rename, so the target is never seen half-written.

use crate::error::{InstallerError, Result, Step};
use crate::utils::fs::{copy_tree, is_sibling_of, path_present, remove_path, sibling_path, symlink_dir};
use std::fs;
use std::path::{Path, PathBuf};

pub const STAGING_TAG: &str = "staging";
pub const BACKUP_TAG: &str = "backup";

/// Remove staging and backup siblings left behind by an interrupted run.
///
/// Returns the removed paths.
pub fn clean_leftovers(addons_dir: &Path, name: &str) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(addons_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(InstallerError::io_at(addons_dir, e)),
    };

    let mut removed = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| InstallerError::io_at(addons_dir, e))?;
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if is_sibling_of(&file_name, name, STAGING_TAG) || is_sibling_of(&file_name, name, BACKUP_TAG) {
            let path = entry.path();
            tracing::info!("removing leftover {}", path.display());
            remove_path(&path)?;
            removed.push(path);
        }
    }
    Ok(removed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing was installed before
    Installed,
    /// A previous install was swapped out
    Replaced,
}

/// A staged add-on waiting to be committed. Dropping it uncommitted removes
/// the staging directory.
#[derive(Debug)]
pub struct StagedCopy {
    staging: Option<PathBuf>,
    target: PathBuf,
    files: usize,
}

impl StagedCopy {
    /// Copy `source` into a fresh staging sibling of `target`
    pub fn copy(source: &Path, target: &Path) -> Result<Self> {
        let mut staged = Self::empty(target)?;
        if let Some(staging) = &staged.staging {
            tracing::debug!("staging {} in {}", source.display(), staging.display());
            staged.files = copy_tree(source, staging)?;
        }
        Ok(staged)
    }

    /// Stage a symlink to `source` instead of a copy
    pub fn link(source: &Path, target: &Path) -> Result<Self> {
        let staged = Self::empty(target)?;
        if let Some(staging) = &staged.staging {
            let source = source
                .canonicalize()
                .map_err(|e| InstallerError::io_at(source, e))?;
            symlink_dir(&source, staging)?;
        }
        Ok(staged)
    }

    fn empty(target: &Path) -> Result<Self> {
        Ok(Self {
            staging: Some(sibling_path(target, STAGING_TAG)?),
            target: target.to_path_buf(),
            files: 0,
        })
    }

    pub fn staging_path(&self) -> Option<&Path> {
        self.staging.as_deref()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Number of files copied, zero for a symlink
    pub fn files(&self) -> usize {
        self.files
    }

    /// Swap the staged tree into place.
    ///
    /// An existing target is renamed to a backup first and deleted once the
    /// staged tree has taken its name. If that rename fails the backup is
    /// moved back.
    pub fn commit(mut self) -> Result<CommitOutcome> {
        let Some(staging) = self.staging.take() else {
            return Err(InstallerError::InvalidState("staged copy already committed".into()));
        };
        let target = self.target.clone();

        let backup = if path_present(&target) {
            let backup = sibling_path(&target, BACKUP_TAG)?;
            if let Err(e) = fs::rename(&target, &backup) {
                self.staging = Some(staging);
                return Err(InstallerError::io_at(&target, e));
            }
            Some(backup)
        } else {
            None
        };

        if let Err(e) = fs::rename(&staging, &target) {
            self.staging = Some(staging);
            let err = InstallerError::io_at(&target, e);
            if let Some(backup) = &backup {
                if let Err(restore) = fs::rename(backup, &target) {
                    tracing::error!(
                        "could not restore {} from {}: {}",
                        target.display(),
                        backup.display(),
                        restore
                    );
                    return Err(InstallerError::StepFailed {
                        step: Step::Commit,
                        partial_state: true,
                        source: Box::new(err),
                    });
                }
            }
            return Err(err);
        }

        match backup {
            Some(backup) => {
                // A stale backup is harmless and removed on the next run
                if let Err(e) = remove_path(&backup) {
                    tracing::warn!("could not remove {}: {}", backup.display(), e);
                }
                Ok(CommitOutcome::Replaced)
            }
            None => Ok(CommitOutcome::Installed),
        }
    }
}

impl Drop for StagedCopy {
    fn drop(&mut self) {
        if let Some(staging) = self.staging.take() {
            tracing::debug!("discarding {}", staging.display());
            if let Err(e) = remove_path(&staging) {
                tracing::warn!("could not remove {}: {}", staging.display(), e);
            }
        }
    }
}
