//! Tracking of files written into the user's Blender config directory.
//!
//! Startup and preferences files are overwritten only when this tool wrote
//! them and nobody changed them since. The ledger remembers the digest of
//! every file written.

use crate::error::{InstallerError, Result};
use crate::utils::fs::write_bytes_atomic;
use crate::version::{PKG_NAME, VERSION};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const LEDGER_FILE: &str = "batoms-install.provenance.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvenanceEntry {
    pub file: String,
    pub md5: String,
    pub tool: String,
    pub tool_version: String,
    /// RFC 3339 timestamp
    pub written_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    entries: Vec<ProvenanceEntry>,
}

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: Vec<ProvenanceEntry>,
}

impl Ledger {
    /// Load the ledger of `dir`. A missing ledger is empty; an unreadable
    /// one is treated as empty so nothing gets overwritten.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(LEDGER_FILE);
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<LedgerFile>(&content) {
                Ok(ledger) => ledger.entries,
                Err(e) => {
                    tracing::warn!("ignoring corrupt {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(InstallerError::io_at(&path, e)),
        };
        Ok(Self { path, entries })
    }

    pub fn entry(&self, file: &str) -> Option<&ProvenanceEntry> {
        self.entries.iter().find(|e| e.file == file)
    }

    /// Was `file` last written by us with exactly this digest?
    pub fn is_ours(&self, file: &str, md5: &str) -> bool {
        self.entry(file).is_some_and(|e| e.md5 == md5)
    }

    pub fn record(&mut self, file: &str, md5: String) {
        let entry = ProvenanceEntry {
            file: file.to_string(),
            md5,
            tool: PKG_NAME.to_string(),
            tool_version: VERSION.to_string(),
            written_at: chrono::Utc::now().to_rfc3339(),
        };
        match self.entries.iter_mut().find(|e| e.file == file) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn save(&self) -> Result<()> {
        let ledger = LedgerFile {
            entries: self.entries.clone(),
        };
        let content = serde_json::to_string_pretty(&ledger)?;
        write_bytes_atomic(&self.path, content.as_bytes())
    }
}

pub fn digest(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOutcome {
    Written,
    Replaced,
    SkippedUserAuthored,
}

impl fmt::Display for ArtifactOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactOutcome::Written => "written",
            ArtifactOutcome::Replaced => "replaced",
            ArtifactOutcome::SkippedUserAuthored => "kept (modified by user)",
        })
    }
}

/// Write `bytes` as `dir/file_name` unless the current file belongs to the user
pub fn write_tracked(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<ArtifactOutcome> {
    fs::create_dir_all(dir).map_err(|e| InstallerError::io_at(dir, e))?;
    let mut ledger = Ledger::load(dir)?;
    let dest = dir.join(file_name);
    let new_digest = digest(bytes);

    let outcome = match fs::read(&dest) {
        Ok(current) => {
            let current = digest(&current);
            // Identical content can be taken over, nothing would be lost
            if ledger.is_ours(file_name, &current) || current == new_digest {
                ArtifactOutcome::Replaced
            } else {
                tracing::info!("{} was not written by {}, leaving it alone", dest.display(), PKG_NAME);
                return Ok(ArtifactOutcome::SkippedUserAuthored);
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ArtifactOutcome::Written,
        Err(e) => return Err(InstallerError::io_at(&dest, e)),
    };

    write_bytes_atomic(&dest, bytes)?;
    ledger.record(file_name, new_digest);
    ledger.save()?;
    tracing::debug!("{} {}", outcome, dest.display());

    Ok(outcome)
}
