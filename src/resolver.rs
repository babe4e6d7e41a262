//! Installation-root discovery.
//!
//! An installation root is Blender's versioned resource tree
//! (`<app>/<major.minor>/`), recognised by its `scripts/` directory. Roots are
//! either given explicitly or discovered by probing, in order, the platform's
//! default locations, the `blender` executable on `PATH`, and `BLENDER_ROOT`.

use crate::config::HostConfig;
use crate::error::{InstallerError, Result};
use crate::platform::HostPlatform;
use crate::utils::env::HostEnv;
use crate::utils::path::expand_user_path;
use crate::version::{parse_requirement, HostVersion};
use semver::VersionReq;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable naming a root or a directory of roots
pub const ROOT_ENV: &str = "BLENDER_ROOT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationRoot {
    path: PathBuf,
    version: Option<HostVersion>,
}

impl InstallationRoot {
    /// Wrap a path without checking it; the version comes from its name
    pub fn unchecked(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let version = version_of(&path);
        Self { path, version }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> Option<&HostVersion> {
        self.version.as_ref()
    }

    /// Directory that holds add-ons below this root
    pub fn addons_dir(&self, subdir: &str) -> PathBuf {
        subdir
            .split(['/', '\\'])
            .filter(|part| !part.is_empty())
            .fold(self.path.clone(), |acc, part| acc.join(part))
    }

    /// A root is structurally valid when it is a directory with `scripts/`
    pub fn is_structurally_valid(path: &Path) -> bool {
        path.join("scripts").is_dir()
    }
}

impl fmt::Display for InstallationRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} (Blender {})", self.path.display(), version),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

fn version_of(path: &Path) -> Option<HostVersion> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(HostVersion::from_dir_name)
}

/// Sources of candidate roots, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    DefaultLocations,
    SearchPath,
    Environment,
}

impl Tier {
    const ALL: [Tier; 3] = [Tier::DefaultLocations, Tier::SearchPath, Tier::Environment];

    fn describe(&self) -> &'static str {
        match self {
            Tier::DefaultLocations => "default install locations",
            Tier::SearchPath => "PATH",
            Tier::Environment => ROOT_ENV,
        }
    }
}

pub struct Resolver<'a> {
    platform: &'a dyn HostPlatform,
    env: &'a HostEnv,
    requirement: VersionReq,
    selected: Option<HostVersion>,
}

impl<'a> Resolver<'a> {
    pub fn new(platform: &'a dyn HostPlatform, env: &'a HostEnv, host: &HostConfig) -> Result<Self> {
        let requirement = parse_requirement(&host.versions)?;
        let selected = host.version.as_deref().map(HostVersion::parse).transpose()?;
        Ok(Self {
            platform,
            env,
            requirement,
            selected,
        })
    }

    /// Resolve the root to install into
    pub fn resolve(&self, explicit: Option<&str>) -> Result<InstallationRoot> {
        match explicit {
            Some(raw) => self.resolve_explicit(raw),
            None => self.locate_default_root(),
        }
    }

    /// Resolve the root to uninstall from.
    ///
    /// Returns `Ok(None)` when nothing could be found, since there is then
    /// nothing to remove. An explicit root that doesn't look like Blender is
    /// used as given.
    pub fn resolve_for_uninstall(&self, explicit: Option<&str>) -> Result<Option<InstallationRoot>> {
        match explicit {
            Some(raw) => match self.resolve_explicit(raw) {
                Ok(root) => Ok(Some(root)),
                Err(InstallerError::PathNotFound { .. }) => {
                    Ok(Some(InstallationRoot::unchecked(expand_user_path(raw, self.env))))
                }
                Err(e) => Err(e),
            },
            None => match self.locate_default_root() {
                Ok(root) => Ok(Some(root)),
                Err(InstallerError::PathNotFound { .. }) => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    /// Validate a user-supplied root. A directory of version directories is
    /// accepted when it holds exactly one matching installation.
    pub fn resolve_explicit(&self, raw: &str) -> Result<InstallationRoot> {
        let path = expand_user_path(raw, self.env);
        let path = std::path::absolute(&path).unwrap_or(path);

        if !path.exists() {
            return Err(InstallerError::not_found(path, "does not exist"));
        }

        if InstallationRoot::is_structurally_valid(&path) {
            let root = InstallationRoot::unchecked(path);
            if let Some(version) = root.version() {
                if !version.matches(&self.requirement) {
                    tracing::warn!(
                        "Blender {} at {} is outside the supported range {}",
                        version,
                        root.path().display(),
                        self.requirement
                    );
                }
            }
            return Ok(root);
        }

        single(dedup(self.scan_base(&path)))?.ok_or_else(|| {
            InstallerError::not_found(
                path,
                "not a Blender installation root (expected a scripts/ directory or a <major.minor> subdirectory)",
            )
        })
    }

    /// Probe each tier in priority order; the first tier with candidates decides.
    pub fn locate_default_root(&self) -> Result<InstallationRoot> {
        for tier in Tier::ALL {
            let candidates = dedup(
                self.bases(tier)
                    .iter()
                    .flat_map(|base| self.scan_tier_entry(tier, base))
                    .collect(),
            );
            tracing::debug!("{} yielded {} candidate(s)", tier.describe(), candidates.len());

            if let Some(root) = single(candidates)? {
                return Ok(root);
            }
        }

        Err(InstallerError::not_found(
            PathBuf::from("<auto>"),
            format!(
                "no Blender {} found in default locations, on PATH or in {}; pass the installation root explicitly",
                self.requirement, ROOT_ENV
            ),
        ))
    }

    fn bases(&self, tier: Tier) -> Vec<PathBuf> {
        match tier {
            Tier::DefaultLocations => self.platform.default_search_bases(self.env),
            Tier::SearchPath => {
                let cwd = std::env::current_dir().unwrap_or_default();
                match which::which_in(self.platform.binary_name(), self.env.search_path(), cwd) {
                    Ok(binary) => {
                        tracing::debug!("found {} on PATH", binary.display());
                        let mut bases = self.platform.bases_for_binary(&binary);
                        if let Ok(real) = binary.canonicalize() {
                            if real != binary {
                                bases.extend(self.platform.bases_for_binary(&real));
                            }
                        }
                        bases
                    }
                    Err(_) => Vec::new(),
                }
            }
            Tier::Environment => self
                .env
                .var(ROOT_ENV)
                .map(|raw| vec![expand_user_path(raw, self.env)])
                .unwrap_or_default(),
        }
    }

    fn scan_tier_entry(&self, tier: Tier, entry: &Path) -> Vec<InstallationRoot> {
        // BLENDER_ROOT may name the versioned root itself
        if tier == Tier::Environment && InstallationRoot::is_structurally_valid(entry) {
            let root = InstallationRoot::unchecked(entry);
            if self.accepts(root.version()) {
                return vec![root];
            }
            return Vec::new();
        }
        self.scan_base(entry)
    }

    /// Version directories directly below `base` that match the requirements
    fn scan_base(&self, base: &Path) -> Vec<InstallationRoot> {
        let Ok(entries) = std::fs::read_dir(base) else {
            return Vec::new();
        };

        let mut roots: Vec<InstallationRoot> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| InstallationRoot::is_structurally_valid(path))
            .filter_map(|path| {
                let version = version_of(&path)?;
                Some(InstallationRoot {
                    path,
                    version: Some(version),
                })
            })
            .filter(|root| self.accepts(root.version()))
            .collect();

        // Newest first, for stable listings
        roots.sort_by(|a, b| b.version.cmp(&a.version));
        roots
    }

    fn accepts(&self, version: Option<&HostVersion>) -> bool {
        match version {
            Some(version) => {
                version.matches(&self.requirement)
                    && self.selected.as_ref().map_or(true, |s| s == version)
            }
            // Unversioned roots only come from BLENDER_ROOT; keep them unless
            // a specific version was asked for
            None => self.selected.is_none(),
        }
    }
}

/// The only candidate, `None` for no candidates, an error for several
fn single(candidates: Vec<InstallationRoot>) -> Result<Option<InstallationRoot>> {
    let mut iter = candidates.into_iter();
    match (iter.next(), iter.next()) {
        (None, _) => Ok(None),
        (Some(only), None) => Ok(Some(only)),
        (Some(first), Some(second)) => Err(InstallerError::AmbiguousInstallation(
            [first, second].into_iter().chain(iter).map(|c| c.path).collect(),
        )),
    }
}

/// Drop candidates that point at the same directory, keeping the first
fn dedup(candidates: Vec<InstallationRoot>) -> Vec<InstallationRoot> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|root| {
            let key = root
                .path
                .canonicalize()
                .unwrap_or_else(|_| root.path.clone());
            seen.insert(key)
        })
        .collect()
}
