use crate::error::{InstallerError, Result};
use std::path::{Path, PathBuf};

/// Add-on sources in the repository. Only ever read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonPackage {
    name: String,
    source: PathBuf,
}

impl AddonPackage {
    /// Check that `source` is an existing directory
    pub fn open(name: &str, source: impl Into<PathBuf>) -> Result<Self> {
        let source = source.into();
        let metadata = match std::fs::metadata(&source) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(InstallerError::not_found(
                    source,
                    format!("add-on package '{}' is missing; pass --local-repo-path", name),
                ))
            }
            Err(e) => return Err(InstallerError::io_at(&source, e)),
        };

        if !metadata.is_dir() {
            return Err(InstallerError::InvalidPackage(format!(
                "{} is not a directory",
                source.display()
            )));
        }

        Ok(Self {
            name: name.to_string(),
            source,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// A template file shipped inside the package
    pub fn template(&self, relative: &str) -> Result<PathBuf> {
        let path = relative
            .split(['/', '\\'])
            .filter(|part| !part.is_empty())
            .fold(self.source.clone(), |acc, part| acc.join(part));
        if path.is_file() {
            Ok(path)
        } else {
            Err(InstallerError::not_found(
                path,
                format!("template missing from the {} package", self.name),
            ))
        }
    }
}
