use crate::error::{InstallerError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

/// Unique-enough suffix for sibling paths created by one run
pub fn nonce() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_millis(0))
        .as_nanos();
    format!("{}-{}", std::process::id(), nanos)
}

/// `<parent>/.<name>.<tag>-<nonce>` next to `dest`
pub fn sibling_path(dest: &Path, tag: &str) -> Result<PathBuf> {
    let parent = dest
        .parent()
        .ok_or_else(|| InstallerError::InvalidState(format!("{} has no parent", dest.display())))?;
    let name = dest
        .file_name()
        .ok_or_else(|| InstallerError::InvalidState(format!("{} has no file name", dest.display())))?
        .to_string_lossy();
    Ok(parent.join(format!(".{}.{}-{}", name, tag, nonce())))
}

/// Does `entry_name` look like a sibling created by [`sibling_path`] for `name`?
pub fn is_sibling_of(entry_name: &str, name: &str, tag: &str) -> bool {
    entry_name
        .strip_prefix('.')
        .and_then(|rest| rest.strip_prefix(name))
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|rest| rest.strip_prefix(tag))
        .is_some_and(|rest| rest.starts_with('-'))
}

/// True for a path that exists or is a dangling symlink
pub fn path_present(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Remove a file, symlink or directory tree without following symlinks.
///
/// Returns `Ok(false)` when nothing was there.
pub fn remove_path(path: &Path) -> Result<bool> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(InstallerError::io_at(path, e)),
    };

    let result = if meta.file_type().is_symlink() {
        remove_symlink(path)
    } else if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|e| InstallerError::io_at(path, e))?;
    Ok(true)
}

#[cfg(windows)]
fn remove_symlink(path: &Path) -> std::io::Result<()> {
    // Directory symlinks on Windows are removed like directories
    fs::remove_dir(path).or_else(|_| fs::remove_file(path))
}

#[cfg(not(windows))]
fn remove_symlink(path: &Path) -> std::io::Result<()> {
    fs::remove_file(path)
}

pub fn is_empty_dir(path: &Path) -> Result<bool> {
    let mut entries = fs::read_dir(path).map_err(|e| InstallerError::io_at(path, e))?;
    Ok(entries.next().is_none())
}

/// Recursively copy `src` into `dest`, which must not exist yet.
///
/// Symlinks inside the tree are copied as the files they point to. Returns
/// the number of files copied.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<usize> {
    let mut files = 0;

    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            let io = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
            InstallerError::io_at(&path, io)
        })?;

        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| InstallerError::InvalidState(format!("{} escaped {}", entry.path().display(), src.display())))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| InstallerError::io_at(&target, e))?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| InstallerError::io_at(&target, e))?;
            files += 1;
        }
    }

    Ok(files)
}

/// Create a directory symlink, using the platform's flavour
pub fn symlink_dir(original: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    let result = std::os::unix::fs::symlink(original, link);
    #[cfg(windows)]
    let result = std::os::windows::fs::symlink_dir(original, link);
    #[cfg(not(any(unix, windows)))]
    let result: std::io::Result<()> = Err(std::io::Error::other("symlinks are not supported"));

    result.map_err(|e| InstallerError::io_at(link, e))
}

/// Write `bytes` to a temporary sibling and rename it over `dest`
pub fn write_bytes_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = sibling_path(dest, "tmp")?;
    fs::write(&tmp, bytes).map_err(|e| InstallerError::io_at(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        return Err(InstallerError::io_at(dest, e));
    }
    Ok(())
}
