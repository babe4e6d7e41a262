use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Installer step a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Resolve,
    Prepare,
    Stage,
    PythonLink,
    Dependencies,
    Commit,
    Startup,
    Preferences,
    Uninstall,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Resolve => "resolve",
            Step::Prepare => "prepare",
            Step::Stage => "stage",
            Step::PythonLink => "python-link",
            Step::Dependencies => "dependencies",
            Step::Commit => "commit",
            Step::Startup => "startup",
            Step::Preferences => "preferences",
            Step::Uninstall => "uninstall",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum InstallerError {
    #[error("Path not found: {path} ({reason})")]
    PathNotFound { path: PathBuf, reason: String },

    #[error("Multiple Blender installations found, select one explicitly:\n{}", list_paths(.0))]
    AmbiguousInstallation(Vec<PathBuf>),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Copy failed at {path}: {source}")]
    CopyFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install dependency {package}: {reason}")]
    DependencyInstallFailed { package: String, reason: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("Invalid add-on package: {0}")]
    InvalidPackage(String),

    #[error("Unexpected filesystem state: {0}")]
    InvalidState(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Provenance ledger error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{step} step failed: {source}{}", partial_note(.partial_state))]
    StepFailed {
        step: Step,
        partial_state: bool,
        #[source]
        source: Box<InstallerError>,
    },
}

fn partial_note(partial_state: &bool) -> &'static str {
    if *partial_state {
        " (earlier changes were left in place)"
    } else {
        ""
    }
}

fn list_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .enumerate()
        .map(|(i, p)| format!("  {}: {}", i, p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

impl InstallerError {
    /// Wrap an I/O error, keeping permission problems distinct from the rest.
    pub fn io_at(path: &Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            InstallerError::PermissionDenied(path.to_path_buf())
        } else {
            InstallerError::CopyFailed {
                path: path.to_path_buf(),
                source: err,
            }
        }
    }

    pub fn not_found(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        InstallerError::PathNotFound {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// The step a failure happened in, if it was attributed to one.
    pub fn step(&self) -> Option<Step> {
        match self {
            InstallerError::StepFailed { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Innermost error, skipping step attribution.
    pub fn root_cause(&self) -> &InstallerError {
        match self {
            InstallerError::StepFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Attribute errors to an installer step.
pub trait StepContext<T> {
    fn in_step(self, step: Step) -> Result<T>;
}

impl<T> StepContext<T> for Result<T> {
    fn in_step(self, step: Step) -> Result<T> {
        self.map_err(|err| match err {
            already @ InstallerError::StepFailed { .. } => already,
            other => InstallerError::StepFailed {
                step,
                partial_state: false,
                source: Box::new(other),
            },
        })
    }
}

pub type Result<T> = std::result::Result<T, InstallerError>;
