use super::runner::CommandSpec;
use crate::config::PackageSpec;
use crate::error::{InstallerError, Result};
use crate::platform::HostPlatform;
use crate::utils::env::HostEnv;
use std::fmt;
use std::path::{Path, PathBuf};

/// How dependencies get into the Python that Blender runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageManager {
    /// Blender's bundled interpreter and its pip
    Pip { python: PathBuf },
    /// An activated conda environment
    Conda {
        exe: PathBuf,
        env_name: String,
        channel: String,
    },
}

impl PackageManager {
    /// pip mode, through the interpreter bundled in `root`
    pub fn pip(platform: &dyn HostPlatform, root: &Path) -> Result<Self> {
        let python = platform.embedded_python(root).ok_or_else(|| {
            InstallerError::not_found(
                root.join("python"),
                "Blender's bundled python interpreter is missing",
            )
        })?;
        Ok(PackageManager::Pip { python })
    }

    /// conda mode. The executable comes from `$CONDA_EXE` or `PATH`, the
    /// environment from `env_name` or `$CONDA_DEFAULT_ENV`.
    pub fn conda(env: &HostEnv, env_name: Option<&str>, channel: &str) -> Result<Self> {
        let exe = match env.path("CONDA_EXE") {
            Some(exe) => exe,
            None => {
                let cwd = std::env::current_dir().unwrap_or_default();
                which::which_in("conda", env.search_path(), cwd).map_err(|_| {
                    InstallerError::DependencyInstallFailed {
                        package: "conda".to_string(),
                        reason: "conda not found; activate a conda environment or pass --use-pip".to_string(),
                    }
                })?
            }
        };

        let env_name = env_name
            .map(str::to_string)
            .or_else(|| env.var("CONDA_DEFAULT_ENV").map(str::to_string))
            .ok_or_else(|| InstallerError::DependencyInstallFailed {
                package: "conda".to_string(),
                reason: "no conda environment; activate one or pass --conda-env-name".to_string(),
            })?;

        Ok(PackageManager::Conda {
            exe,
            env_name,
            channel: channel.to_string(),
        })
    }

    /// `python -m pip --version`; `None` for conda
    pub fn pip_check(&self) -> Option<CommandSpec> {
        match self {
            PackageManager::Pip { python } => {
                Some(CommandSpec::new(python).args(["-m", "pip", "--version"]))
            }
            PackageManager::Conda { .. } => None,
        }
    }

    /// Bootstraps pip into the bundled interpreter
    pub fn pip_bootstrap(&self) -> Option<CommandSpec> {
        match self {
            PackageManager::Pip { python } => {
                Some(CommandSpec::new(python).args(["-m", "ensurepip", "--upgrade"]))
            }
            PackageManager::Conda { .. } => None,
        }
    }

    pub fn install_command(&self, package: &PackageSpec) -> CommandSpec {
        let requirement = package.requirement();
        match self {
            PackageManager::Pip { python } => CommandSpec::new(python)
                .args(["-m", "pip", "install", "--no-input"])
                .arg(requirement),
            PackageManager::Conda { exe, env_name, .. } if package.pip_only => CommandSpec::new(exe)
                .args(["run", "-n"])
                .arg(env_name.as_str())
                .args(["python", "-m", "pip", "install", "--no-input"])
                .arg(requirement),
            PackageManager::Conda {
                exe,
                env_name,
                channel,
            } => CommandSpec::new(exe)
                .args(["install", "-y", "-n"])
                .arg(env_name.as_str())
                .arg("-c")
                .arg(channel.as_str())
                .arg(requirement),
        }
    }

    /// `pip uninstall -y` for the given packages; conda environments are
    /// not ours to clean up
    pub fn uninstall_command(&self, packages: &[PackageSpec]) -> Option<CommandSpec> {
        match self {
            PackageManager::Pip { python } if !packages.is_empty() => Some(
                CommandSpec::new(python)
                    .args(["-m", "pip", "uninstall", "-y"])
                    .args(packages.iter().map(|p| p.name.clone())),
            ),
            _ => None,
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageManager::Pip { python } => write!(f, "pip ({})", python.display()),
            PackageManager::Conda { env_name, .. } => write!(f, "conda (env {})", env_name),
        }
    }
}
