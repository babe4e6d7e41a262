use crate::cli::Cli;
use crate::error::{InstallerError, Result};
use crate::utils::env::HostEnv;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = ".batoms-install.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub addon: AddonConfig,

    #[serde(default)]
    pub host: HostConfig,

    #[serde(default)]
    pub dependencies: DependenciesConfig,

    #[serde(default)]
    pub python: PythonConfig,

    /// Debug logging (not stored in config file)
    #[serde(skip)]
    pub verbose: bool,

    /// Conda environment receiving dependencies (not stored in config file)
    #[serde(skip)]
    pub conda_env_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddonConfig {
    #[serde(default = "default_addon_name")]
    pub name: String,

    /// Package directory relative to the repository, defaults to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Add-ons directory relative to the installation root
    #[serde(default = "default_addon_subdir")]
    pub subdir: String,

    /// Startup template relative to the package directory
    #[serde(default = "default_startup_template")]
    pub startup_template: String,

    /// Preferences template relative to the package directory
    #[serde(default = "default_preferences_template")]
    pub preferences_template: String,
}

impl Default for AddonConfig {
    fn default() -> Self {
        Self {
            name: default_addon_name(),
            source: None,
            subdir: default_addon_subdir(),
            startup_template: default_startup_template(),
            preferences_template: default_preferences_template(),
        }
    }
}

fn default_addon_name() -> String {
    "batoms".to_string()
}

fn default_addon_subdir() -> String {
    "scripts/addons".to_string()
}

fn default_startup_template() -> String {
    "data/startup.blend".to_string()
}

fn default_preferences_template() -> String {
    "data/userpref.blend".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Requirement every auto-discovered installation must satisfy
    #[serde(default = "default_host_versions")]
    pub versions: String,

    /// Pick this `major.minor` when several installations are found
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            versions: default_host_versions(),
            version: None,
        }
    }
}

fn default_host_versions() -> String {
    ">=3.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependenciesConfig {
    #[serde(default = "default_policy")]
    pub policy: DependencyPolicy,

    /// Extra attempts after a failed package-manager command
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// First backoff delay, doubled after each retry
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Per-attempt timeout for package-manager commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default = "default_conda_channel")]
    pub conda_channel: String,

    /// Replaces the built-in package list when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packages: Option<Vec<PackageSpec>>,
}

impl Default for DependenciesConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            retries: default_retries(),
            backoff_ms: default_backoff_ms(),
            timeout_secs: None,
            conda_channel: default_conda_channel(),
            packages: None,
        }
    }
}

impl DependenciesConfig {
    /// Configured packages, or the built-in list
    pub fn packages(&self) -> Vec<PackageSpec> {
        self.packages.clone().unwrap_or_else(default_packages)
    }
}

fn default_policy() -> DependencyPolicy {
    DependencyPolicy::AbortOnRequired
}

fn default_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_conda_channel() -> String {
    "conda-forge".to_string()
}

/// What a failed dependency does to the rest of the run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyPolicy {
    /// Stop at the first required package that fails
    AbortOnRequired,
    /// Try every package, fail at the end if a required one failed
    Continue,
}

impl DependencyPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyPolicy::AbortOnRequired => "abort-on-required",
            DependencyPolicy::Continue => "continue",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,

    /// Requirement passed to the package manager, defaults to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,

    #[serde(default = "default_true")]
    pub required: bool,

    /// Only available from PyPI, installed with pip even in conda mode
    #[serde(default)]
    pub pip_only: bool,
}

impl PackageSpec {
    pub fn new(name: &str, spec: Option<&str>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            spec: spec.map(str::to_string),
            required,
            pip_only: false,
        }
    }

    pub fn requirement(&self) -> &str {
        self.spec.as_deref().unwrap_or(&self.name)
    }
}

fn default_true() -> bool {
    true
}

/// Dependencies of the batoms add-on
fn default_packages() -> Vec<PackageSpec> {
    vec![
        PackageSpec::new("spglib", None, true),
        PackageSpec::new("ase", Some("ase>=3.21.0"), true),
        PackageSpec::new("pymatgen", Some("pymatgen>=2020.12"), true),
        PackageSpec::new("scikit-image", None, true),
        PackageSpec::new("openbabel", Some("openbabel>=3.1.1"), false),
        PackageSpec {
            pip_only: true,
            ..PackageSpec::new("batoms-api", None, true)
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythonConfig {
    /// In conda mode, replace the bundled python with a link to $CONDA_PREFIX
    #[serde(default = "default_true")]
    pub link_conda_prefix: bool,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            link_conda_prefix: true,
        }
    }
}

impl Config {
    /// Load configuration with precedence:
    /// 1. CLI flags (applied later via with_cli_overrides)
    /// 2. Environment variables
    /// 3. Explicit --config file
    /// 4. Repository config (.batoms-install.toml in the repository)
    /// 5. Global config (~/.batoms-install.toml)
    /// 6. Built-in defaults
    pub fn load(repo_root: &Path, env: &HostEnv, extra: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = env.home() {
            let global_config = home.join(CONFIG_FILE_NAME);
            if global_config.exists() {
                config = config.merge(Self::from_file(&global_config)?);
            }
        }

        let repo_config = repo_root.join(CONFIG_FILE_NAME);
        if repo_config.exists() {
            config = config.merge(Self::from_file(&repo_config)?);
        }

        if let Some(path) = extra {
            if !path.exists() {
                return Err(InstallerError::InvalidConfig(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            config = config.merge(Self::from_file(path)?);
        }

        config = config.merge_env(env);
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    fn from_file(path: &Path) -> Result<Self> {
        tracing::debug!("loading config from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(mut self, other: Self) -> Self {
        // Add-on
        if other.addon.name != default_addon_name() {
            self.addon.name = other.addon.name;
        }
        if other.addon.source.is_some() {
            self.addon.source = other.addon.source;
        }
        if other.addon.subdir != default_addon_subdir() {
            self.addon.subdir = other.addon.subdir;
        }
        if other.addon.startup_template != default_startup_template() {
            self.addon.startup_template = other.addon.startup_template;
        }
        if other.addon.preferences_template != default_preferences_template() {
            self.addon.preferences_template = other.addon.preferences_template;
        }

        // Host
        if other.host.versions != default_host_versions() {
            self.host.versions = other.host.versions;
        }
        if other.host.version.is_some() {
            self.host.version = other.host.version;
        }

        // Dependencies
        if other.dependencies.policy != default_policy() {
            self.dependencies.policy = other.dependencies.policy;
        }
        if other.dependencies.retries != default_retries() {
            self.dependencies.retries = other.dependencies.retries;
        }
        if other.dependencies.backoff_ms != default_backoff_ms() {
            self.dependencies.backoff_ms = other.dependencies.backoff_ms;
        }
        if other.dependencies.timeout_secs.is_some() {
            self.dependencies.timeout_secs = other.dependencies.timeout_secs;
        }
        if other.dependencies.conda_channel != default_conda_channel() {
            self.dependencies.conda_channel = other.dependencies.conda_channel;
        }
        // Package lists replace rather than append
        if other.dependencies.packages.is_some() {
            self.dependencies.packages = other.dependencies.packages;
        }

        // Python link can only be switched off
        if !other.python.link_conda_prefix {
            self.python.link_conda_prefix = false;
        }

        self
    }

    /// Apply environment variable overrides
    fn merge_env(mut self, env: &HostEnv) -> Self {
        if let Some(retries) = env.var("BATOMS_INSTALL_RETRIES") {
            match retries.parse::<u32>() {
                Ok(retries) => self.dependencies.retries = retries,
                Err(_) => tracing::warn!("ignoring invalid BATOMS_INSTALL_RETRIES={}", retries),
            }
        }

        if let Some(timeout) = env.var("BATOMS_INSTALL_TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(timeout) => self.dependencies.timeout_secs = Some(timeout),
                Err(_) => tracing::warn!("ignoring invalid BATOMS_INSTALL_TIMEOUT_SECS={}", timeout),
            }
        }

        if let Some(name) = env.var("BATOMS_ADDON_NAME") {
            self.addon.name = name.to_string();
        }

        self
    }

    fn validate(&self) -> Result<()> {
        let name = &self.addon.name;
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\'])
        {
            return Err(InstallerError::InvalidConfig(format!(
                "addon.name '{}' must be a plain directory name",
                name
            )));
        }

        crate::version::parse_requirement(&self.host.versions)?;
        if let Some(version) = &self.host.version {
            crate::version::HostVersion::parse(version)?;
        }

        Ok(())
    }

    /// Apply CLI overrides (highest precedence)
    pub fn with_cli_overrides(mut self, cli: &Cli) -> Result<Self> {
        self.verbose = cli.verbose;

        if cli.conda_env_name.is_some() {
            self.conda_env_name = cli.conda_env_name.clone();
        }

        if let Some(version) = &cli.host_version {
            crate::version::HostVersion::parse(version)?;
            self.host.version = Some(version.clone());
        }

        Ok(self)
    }

    /// Directory holding the add-on sources inside the repository
    pub fn package_source(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(self.addon.source.as_deref().unwrap_or(&self.addon.name))
    }
}
