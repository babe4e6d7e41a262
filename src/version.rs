use crate::error::{InstallerError, Result};
use semver::{Version, VersionReq};
use std::fmt;

// Compile-time constants from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Blender release line such as `3.1`, as used for resource directory names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostVersion(Version);

impl HostVersion {
    /// Parse `major.minor` (a trailing `.patch` is accepted and dropped)
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('.');
        let (Some(major), Some(minor)) = (parts.next(), parts.next()) else {
            return Err(InstallerError::InvalidConfig(format!(
                "'{}' is not a Blender version (expected MAJOR.MINOR)",
                s
            )));
        };
        let patch_ok = match parts.next() {
            None => true,
            Some(patch) => patch.parse::<u64>().is_ok() && parts.next().is_none(),
        };
        match (major.parse::<u64>(), minor.parse::<u64>()) {
            (Ok(major), Ok(minor)) if patch_ok => Ok(Self(Version::new(major, minor, 0))),
            _ => Err(InstallerError::InvalidConfig(format!(
                "'{}' is not a Blender version (expected MAJOR.MINOR)",
                s
            ))),
        }
    }

    /// Parse a directory name, returning `None` for anything that isn't a version
    pub fn from_dir_name(name: &str) -> Option<Self> {
        if name.chars().filter(|c| *c == '.').count() != 1 {
            return None;
        }
        Self::parse(name).ok()
    }

    pub fn semver(&self) -> &Version {
        &self.0
    }

    pub fn matches(&self, req: &VersionReq) -> bool {
        req.matches(&self.0)
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0.major, self.0.minor)
    }
}

/// Parse a `host.versions` requirement string
pub fn parse_requirement(s: &str) -> Result<VersionReq> {
    VersionReq::parse(s).map_err(|e| {
        InstallerError::InvalidConfig(format!("invalid host version requirement '{}': {}", s, e))
    })
}
