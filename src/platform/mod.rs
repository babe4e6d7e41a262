//! Operating-system specific knowledge about where Blender lives.
//!
//! Everything that differs between Linux, macOS and Windows sits behind the
//! [`HostPlatform`] trait. The resolver and installer only talk to the trait,
//! and [`detect`] picks the implementation once at startup.

mod linux;
mod macos;
mod windows;

pub use linux::Linux;
pub use macos::MacOs;
pub use windows::Windows;

use crate::error::{InstallerError, Result};
use crate::utils::env::HostEnv;
use crate::version::HostVersion;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable Blender itself honours for the user config directory
pub const USER_CONFIG_ENV: &str = "BLENDER_USER_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformTag {
    Linux,
    MacOs,
    Windows,
}

impl PlatformTag {
    /// Map an `std::env::consts::OS` value to a tag
    pub fn from_os(os: &str) -> Result<Self> {
        match os {
            "linux" => Ok(PlatformTag::Linux),
            "macos" => Ok(PlatformTag::MacOs),
            "windows" => Ok(PlatformTag::Windows),
            other => Err(InstallerError::UnsupportedPlatform(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformTag::Linux => "linux",
            PlatformTag::MacOs => "macos",
            PlatformTag::Windows => "windows",
        }
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait HostPlatform: fmt::Debug {
    fn tag(&self) -> PlatformTag;

    /// File name of the Blender executable looked up on `PATH`
    fn binary_name(&self) -> &'static str;

    /// Standard install locations, in priority order. Each entry is a *base*:
    /// a directory holding `<major.minor>` resource trees.
    fn default_search_bases(&self, env: &HostEnv) -> Vec<PathBuf>;

    /// Bases implied by a Blender executable found on `PATH`
    fn bases_for_binary(&self, binary: &Path) -> Vec<PathBuf>;

    /// Platform default for the per-user config directory of `version`
    fn user_config_dir(&self, env: &HostEnv, version: &HostVersion) -> Option<PathBuf>;

    /// Interpreter bundled inside an installation root
    fn embedded_python(&self, root: &Path) -> Option<PathBuf>;

    /// Whether the bundled python may be replaced by a symlinked conda prefix
    fn supports_python_link(&self) -> bool {
        true
    }

    /// Per-user config directory, honouring [`USER_CONFIG_ENV`]
    fn locate_user_config_dir(&self, env: &HostEnv, version: &HostVersion) -> Option<PathBuf> {
        env.path(USER_CONFIG_ENV)
            .or_else(|| self.user_config_dir(env, version))
    }
}

/// Pick the implementation for an OS tag
pub fn for_tag(tag: PlatformTag) -> Box<dyn HostPlatform> {
    match tag {
        PlatformTag::Linux => Box::new(Linux),
        PlatformTag::MacOs => Box::new(MacOs),
        PlatformTag::Windows => Box::new(Windows),
    }
}

/// Detect the platform this binary runs on
pub fn detect() -> Result<Box<dyn HostPlatform>> {
    PlatformTag::from_os(std::env::consts::OS).map(for_tag)
}

/// Newest `python3.X` executable in `<root>/python/bin`, shared by Linux and
/// macOS. A bare `python3` is only used when nothing versioned is there.
fn unix_embedded_python(root: &Path) -> Option<PathBuf> {
    let bin = root.join("python").join("bin");
    std::fs::read_dir(&bin)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let rest = name.strip_prefix("python3")?;
            if name.ends_with("-config") {
                return None;
            }
            Some((python_minor(rest), path))
        })
        .max_by(|(a, pa), (b, pb)| a.cmp(b).then_with(|| pa.cmp(pb)))
        .map(|(_, path)| path)
}

/// `.10` in `python3.10` or `python3.10m`
fn python_minor(suffix: &str) -> Option<u32> {
    let digits: String = suffix
        .strip_prefix('.')?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}
