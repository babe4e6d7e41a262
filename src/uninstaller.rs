//! Removing the add-on again. Running it twice is the same as running it once.

use crate::config::Config;
use crate::deps::{CommandRunner, PackageManager};
use crate::error::{InstallerError, Result, Step, StepContext};
use crate::platform::HostPlatform;
use crate::python_link::{restore, RestoreOutcome};
use crate::resolver::InstallationRoot;
use crate::staging::clean_leftovers;
use crate::utils::fs::remove_path;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UninstallOptions {
    /// Also `pip uninstall` the dependencies from the bundled python
    pub use_pip: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UninstallReport {
    /// `None` when no installation was found
    pub root: Option<PathBuf>,
    pub target: Option<PathBuf>,
    /// Whether the add-on directory existed and was removed
    pub removed: bool,
    pub leftovers_removed: Vec<PathBuf>,
    pub python_restored: bool,
    /// `Some(success)` when a pip uninstall was attempted
    pub pip_uninstalled: Option<bool>,
}

impl UninstallReport {
    pub fn nothing_found() -> Self {
        Self::default()
    }

    /// Nothing needed doing
    pub fn is_noop(&self) -> bool {
        !self.removed && self.leftovers_removed.is_empty() && !self.python_restored
    }
}

pub struct Uninstaller<'a> {
    platform: &'a dyn HostPlatform,
    config: &'a Config,
    runner: &'a dyn CommandRunner,
}

impl<'a> Uninstaller<'a> {
    pub fn new(platform: &'a dyn HostPlatform, config: &'a Config, runner: &'a dyn CommandRunner) -> Self {
        Self {
            platform,
            config,
            runner,
        }
    }

    pub fn uninstall(&self, root: &InstallationRoot, options: &UninstallOptions) -> Result<UninstallReport> {
        let name = &self.config.addon.name;
        let addons_dir = root.addons_dir(&self.config.addon.subdir);
        let target = addons_dir.join(name);
        tracing::info!("uninstalling {} from {}", name, root);

        let leftovers_removed = clean_leftovers(&addons_dir, name).in_step(Step::Uninstall)?;
        let removed = remove_path(&target).in_step(Step::Uninstall)?;
        if !removed {
            tracing::debug!("{} is not installed", target.display());
        }

        let python_restored = match restore(root.path()).in_step(Step::PythonLink) {
            Ok(outcome) => outcome == RestoreOutcome::Restored,
            Err(InstallerError::StepFailed { step, source, .. }) => {
                return Err(InstallerError::StepFailed {
                    step,
                    partial_state: removed,
                    source,
                })
            }
            Err(e) => return Err(e),
        };

        let pip_uninstalled = if options.use_pip {
            Some(self.pip_uninstall(root))
        } else {
            None
        };

        Ok(UninstallReport {
            root: Some(root.path().to_path_buf()),
            target: Some(target),
            removed,
            leftovers_removed,
            python_restored,
            pip_uninstalled,
        })
    }

    /// Best effort; failures are logged and reported, never fatal
    fn pip_uninstall(&self, root: &InstallationRoot) -> bool {
        let manager = match PackageManager::pip(self.platform, root.path()) {
            Ok(manager) => manager,
            Err(e) => {
                tracing::warn!("skipping pip uninstall: {}", e);
                return false;
            }
        };
        let packages = self.config.dependencies.packages();
        let Some(spec) = manager.uninstall_command(&packages) else {
            return true;
        };

        match self.runner.run(&spec) {
            Ok(output) if output.success => true,
            Ok(output) => {
                tracing::warn!("{} failed: {}", spec.display(), output.failure_reason());
                false
            }
            Err(e) => {
                tracing::warn!("{}", e);
                false
            }
        }
    }
}
