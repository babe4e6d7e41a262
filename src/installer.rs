//! Installing the add-on into a resolved Blender root.
//!
//! Steps run in a fixed order: prepare, stage, python link, dependencies,
//! commit, startup, preferences. The add-on only replaces the installed copy
//! at commit, so a failure in any earlier step leaves the previous install
//! as it was.

use crate::config::Config;
use crate::deps::{CommandRunner, DependencyInstaller, DependencyOutcome, PackageManager};
use crate::error::{InstallerError, Result, Step, StepContext};
use crate::package::AddonPackage;
use crate::platform::{HostPlatform, USER_CONFIG_ENV};
use crate::provenance::{write_tracked, ArtifactOutcome};
use crate::python_link::{link_prefix, LinkOutcome};
use crate::resolver::InstallationRoot;
use crate::staging::{clean_leftovers, CommitOutcome, StagedCopy};
use crate::utils::env::HostEnv;
use std::path::PathBuf;

pub const STARTUP_FILE: &str = "startup.blend";
pub const PREFERENCES_FILE: &str = "userpref.blend";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    pub use_startup: bool,
    pub use_preferences: bool,
    pub use_pip: bool,
    pub dependency_only: bool,
    pub symlink: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonOutcome {
    pub commit: CommitOutcome,
    /// Files copied, zero for a symlinked install
    pub files: usize,
    pub symlink: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReport {
    pub path: PathBuf,
    pub outcome: ArtifactOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub root: PathBuf,
    pub target: PathBuf,
    pub leftovers_removed: Vec<PathBuf>,
    /// `None` for a dependency-only run
    pub addon: Option<AddonOutcome>,
    pub python_link: Option<LinkOutcome>,
    pub dependencies: Vec<DependencyOutcome>,
    pub startup: Option<ArtifactReport>,
    pub preferences: Option<ArtifactReport>,
}

pub struct Installer<'a> {
    platform: &'a dyn HostPlatform,
    env: &'a HostEnv,
    config: &'a Config,
    runner: &'a dyn CommandRunner,
}

impl<'a> Installer<'a> {
    pub fn new(
        platform: &'a dyn HostPlatform,
        env: &'a HostEnv,
        config: &'a Config,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            platform,
            env,
            config,
            runner,
        }
    }

    pub fn install(
        &self,
        root: &InstallationRoot,
        package: &AddonPackage,
        options: &InstallOptions,
    ) -> Result<InstallReport> {
        tracing::info!("installing {} into {}", package.name(), root);

        // Prepare
        let addons_dir = root.addons_dir(&self.config.addon.subdir);
        let target = addons_dir.join(package.name());
        let leftovers_removed = std::fs::create_dir_all(&addons_dir)
            .map_err(|e| InstallerError::io_at(&addons_dir, e))
            .and_then(|_| clean_leftovers(&addons_dir, package.name()))
            .in_step(Step::Prepare)?;

        // Stage
        let staged = if options.dependency_only {
            None
        } else if options.symlink {
            Some(StagedCopy::link(package.source(), &target).in_step(Step::Stage)?)
        } else {
            Some(StagedCopy::copy(package.source(), &target).in_step(Step::Stage)?)
        };

        // Python link
        let python_link = if !options.use_pip && self.config.python.link_conda_prefix {
            Some(self.link_python(root).in_step(Step::PythonLink)?)
        } else {
            None
        };

        // Dependencies; the python link stays in place if they fail
        let dependencies = self
            .install_dependencies(root, options)
            .in_step(Step::Dependencies)
            .map_err(|e| if python_link.is_some() { mark_partial(e) } else { e })?;

        // Commit
        let addon = match staged {
            Some(staged) => {
                let files = staged.files();
                let commit = staged
                    .commit()
                    .in_step(Step::Commit)
                    .map_err(|e| if python_link.is_some() { mark_partial(e) } else { e })?;
                tracing::info!("committed {}", target.display());
                Some(AddonOutcome {
                    commit,
                    files,
                    symlink: options.symlink,
                })
            }
            None => None,
        };

        // Startup and preferences come after the add-on is in place
        let mut report = InstallReport {
            root: root.path().to_path_buf(),
            target,
            leftovers_removed,
            addon,
            python_link,
            dependencies,
            startup: None,
            preferences: None,
        };

        if options.dependency_only {
            return Ok(report);
        }

        if options.use_startup {
            report.startup = Some(
                self.write_artifact(root, package, &self.config.addon.startup_template, STARTUP_FILE)
                    .in_step(Step::Startup)
                    .map_err(mark_partial)?,
            );
        }

        if options.use_preferences {
            report.preferences = Some(
                self.write_artifact(
                    root,
                    package,
                    &self.config.addon.preferences_template,
                    PREFERENCES_FILE,
                )
                .in_step(Step::Preferences)
                .map_err(mark_partial)?,
            );
        }

        Ok(report)
    }

    fn link_python(&self, root: &InstallationRoot) -> Result<LinkOutcome> {
        if !self.platform.supports_python_link() {
            return Err(InstallerError::UnsupportedPlatform(format!(
                "linking a conda environment into Blender is not supported on {}, use --use-pip",
                self.platform.tag()
            )));
        }
        let prefix = self.env.path("CONDA_PREFIX").ok_or_else(|| {
            InstallerError::InvalidConfig(
                "CONDA_PREFIX is not set; activate a conda environment or use --use-pip".to_string(),
            )
        })?;
        link_prefix(root.path(), &prefix)
    }

    fn install_dependencies(
        &self,
        root: &InstallationRoot,
        options: &InstallOptions,
    ) -> Result<Vec<DependencyOutcome>> {
        let packages = self.config.dependencies.packages();
        if packages.is_empty() {
            tracing::debug!("no dependencies configured");
            return Ok(Vec::new());
        }

        let manager = if options.use_pip {
            PackageManager::pip(self.platform, root.path())?
        } else {
            PackageManager::conda(
                self.env,
                self.config.conda_env_name.as_deref(),
                &self.config.dependencies.conda_channel,
            )?
        };

        DependencyInstaller::new(self.runner, &manager, &self.config.dependencies)
            .install_all(&packages)
    }

    fn write_artifact(
        &self,
        root: &InstallationRoot,
        package: &AddonPackage,
        template: &str,
        file_name: &str,
    ) -> Result<ArtifactReport> {
        let template = package.template(template)?;
        let bytes = std::fs::read(&template).map_err(|e| InstallerError::io_at(&template, e))?;
        let dir = self.user_config_dir(root)?;
        let outcome = write_tracked(&dir, file_name, &bytes)?;
        Ok(ArtifactReport {
            path: dir.join(file_name),
            outcome,
        })
    }

    fn user_config_dir(&self, root: &InstallationRoot) -> Result<PathBuf> {
        if let Some(dir) = self.env.path(USER_CONFIG_ENV) {
            return Ok(dir);
        }
        let version = root.version().ok_or_else(|| {
            InstallerError::InvalidState(format!(
                "cannot tell the Blender version of {}; set {}",
                root.path().display(),
                USER_CONFIG_ENV
            ))
        })?;
        self.platform
            .locate_user_config_dir(self.env, version)
            .ok_or_else(|| {
                InstallerError::InvalidState(format!(
                    "no user config directory for Blender {}; set {}",
                    version, USER_CONFIG_ENV
                ))
            })
    }
}

/// Flag a step failure as having left earlier changes in place
fn mark_partial(err: InstallerError) -> InstallerError {
    match err {
        InstallerError::StepFailed { step, source, .. } => InstallerError::StepFailed {
            step,
            partial_state: true,
            source,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DependencyPolicy, PackageSpec};
    use crate::deps::testing::ScriptedRunner;
    use crate::deps::{CommandOutput, CommandSpec};
    use crate::platform::Linux;
    use std::fs;
    use std::path::Path;

    struct Fixture {
        _tmp: tempfile::TempDir,
        root: InstallationRoot,
        package: AddonPackage,
        user_config: PathBuf,
        env: HostEnv,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let root_path = tmp.path().join("blender").join("3.1");
        fs::create_dir_all(root_path.join("scripts").join("addons")).unwrap();
        fs::create_dir_all(root_path.join("python").join("bin")).unwrap();
        fs::write(root_path.join("python").join("bin").join("python3.10"), "").unwrap();

        let source = tmp.path().join("repo").join("batoms");
        fs::create_dir_all(source.join("b")).unwrap();
        fs::create_dir_all(source.join("data")).unwrap();
        fs::write(source.join("a.py"), "a").unwrap();
        fs::write(source.join("b").join("c.py"), "c").unwrap();
        fs::write(source.join("data").join("startup.blend"), "startup").unwrap();
        fs::write(source.join("data").join("userpref.blend"), "prefs").unwrap();

        let user_config = tmp.path().join("config");
        let env = HostEnv::from_pairs([(USER_CONFIG_ENV, user_config.to_str().unwrap())]);

        Fixture {
            root: InstallationRoot::unchecked(root_path),
            package: AddonPackage::open("batoms", source).unwrap(),
            user_config,
            env,
            _tmp: tmp,
        }
    }

    fn pip_config(packages: Vec<PackageSpec>) -> Config {
        let mut config = Config::default();
        config.dependencies.packages = Some(packages);
        config.dependencies.backoff_ms = 0;
        config
    }

    fn pip_options() -> InstallOptions {
        InstallOptions {
            use_pip: true,
            ..InstallOptions::default()
        }
    }

    fn target(f: &Fixture) -> PathBuf {
        f.root.path().join("scripts").join("addons").join("batoms")
    }

    fn hidden_siblings(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().starts_with('.'))
            .count()
    }

    #[test]
    fn test_install_copies_tree_and_dependencies() {
        let f = fixture();
        let config = pip_config(vec![PackageSpec::new("spglib", None, true)]);
        let runner = ScriptedRunner::default();
        let installer = Installer::new(&Linux, &f.env, &config, &runner);

        let report = installer.install(&f.root, &f.package, &pip_options()).unwrap();
        assert_eq!(report.target, target(&f));
        assert!(target(&f).join("a.py").is_file());
        assert!(target(&f).join("b").join("c.py").is_file());
        assert_eq!(report.addon.unwrap().commit, CommitOutcome::Installed);
        assert_eq!(report.dependencies.len(), 1);
        assert!(report.python_link.is_none());
        assert!(report.startup.is_none());
    }

    #[test]
    fn test_required_dependency_failure_keeps_previous_install() {
        let f = fixture();
        let runner = ScriptedRunner::default();
        let config = pip_config(vec![]);
        Installer::new(&Linux, &f.env, &config, &runner)
            .install(&f.root, &f.package, &pip_options())
            .unwrap();
        fs::write(f.package.source().join("new.py"), "new").unwrap();

        let config = Config {
            dependencies: crate::config::DependenciesConfig {
                policy: DependencyPolicy::AbortOnRequired,
                retries: 0,
                ..pip_config(vec![PackageSpec::new("spglib", None, true)]).dependencies
            },
            ..Config::default()
        };
        let runner = ScriptedRunner::failing("spglib", 10);
        let err = Installer::new(&Linux, &f.env, &config, &runner)
            .install(&f.root, &f.package, &pip_options())
            .unwrap_err();

        assert_eq!(err.step(), Some(Step::Dependencies));
        assert!(matches!(err.root_cause(), InstallerError::DependencyInstallFailed { .. }));
        assert!(target(&f).join("a.py").is_file());
        assert!(!target(&f).join("new.py").exists());
        assert_eq!(hidden_siblings(target(&f).parent().unwrap()), 0);
    }

    #[test]
    fn test_dependency_only_leaves_addon_alone() {
        let f = fixture();
        let config = pip_config(vec![PackageSpec::new("spglib", None, true)]);
        let runner = ScriptedRunner::default();
        let options = InstallOptions {
            dependency_only: true,
            use_startup: true,
            ..pip_options()
        };

        let report = Installer::new(&Linux, &f.env, &config, &runner)
            .install(&f.root, &f.package, &options)
            .unwrap();
        assert!(report.addon.is_none());
        assert!(report.startup.is_none());
        assert!(!target(&f).exists());
        assert_eq!(report.dependencies.len(), 1);
    }

    #[test]
    fn test_startup_and_preferences_written() {
        let f = fixture();
        let config = pip_config(vec![]);
        let runner = ScriptedRunner::default();
        let options = InstallOptions {
            use_startup: true,
            use_preferences: true,
            ..pip_options()
        };

        let report = Installer::new(&Linux, &f.env, &config, &runner)
            .install(&f.root, &f.package, &options)
            .unwrap();
        let startup = report.startup.unwrap();
        assert_eq!(startup.outcome, ArtifactOutcome::Written);
        assert_eq!(startup.path, f.user_config.join(STARTUP_FILE));
        assert_eq!(fs::read_to_string(&startup.path).unwrap(), "startup");
        assert_eq!(report.preferences.unwrap().outcome, ArtifactOutcome::Written);
    }

    #[test]
    fn test_missing_startup_template_fails_after_commit() {
        let f = fixture();
        fs::remove_file(f.package.source().join("data").join("startup.blend")).unwrap();
        let config = pip_config(vec![]);
        let runner = ScriptedRunner::default();
        let options = InstallOptions {
            use_startup: true,
            ..pip_options()
        };

        let err = Installer::new(&Linux, &f.env, &config, &runner)
            .install(&f.root, &f.package, &options)
            .unwrap_err();
        assert!(matches!(
            err,
            InstallerError::StepFailed { step: Step::Startup, partial_state: true, .. }
        ));
        assert!(target(&f).join("a.py").is_file());
    }

    #[test]
    fn test_conda_mode_requires_prefix() {
        let f = fixture();
        let config = pip_config(vec![]);
        let runner = ScriptedRunner::default();

        let err = Installer::new(&Linux, &f.env, &config, &runner)
            .install(&f.root, &f.package, &InstallOptions::default())
            .unwrap_err();
        assert_eq!(err.step(), Some(Step::PythonLink));
        assert!(!target(&f).exists());
        assert!(f.root.path().join("python").is_dir());
    }

    #[test]
    fn test_conda_mode_without_link() {
        let f = fixture();
        let mut config = pip_config(vec![PackageSpec::new("spglib", None, true)]);
        config.python.link_conda_prefix = false;
        config.conda_env_name = Some("batoms".to_string());
        let mut env = f.env.clone();
        env.set("CONDA_EXE", "/opt/conda/bin/conda");
        let runner = ScriptedRunner::default();

        Installer::new(&Linux, &env, &config, &runner)
            .install(&f.root, &f.package, &InstallOptions::default())
            .unwrap();
        assert_eq!(
            runner.commands(),
            ["install -y -n batoms -c conda-forge spglib"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_conda_mode_links_python() {
        let f = fixture();
        let prefix = f.user_config.parent().unwrap().join("conda-env");
        fs::create_dir_all(&prefix).unwrap();
        let config = pip_config(vec![]);
        let mut env = f.env.clone();
        env.set("CONDA_PREFIX", prefix.to_str().unwrap());
        let runner = ScriptedRunner::default();

        let report = Installer::new(&Linux, &env, &config, &runner)
            .install(&f.root, &f.package, &InstallOptions::default())
            .unwrap();
        assert!(matches!(report.python_link, Some(LinkOutcome::Linked { .. })));
        assert!(f.root.path().join("_old_python").is_dir());
    }

    /// Makes the addons directory read-only while dependencies install, so
    /// the commit rename that follows fails
    #[cfg(unix)]
    struct LockingRunner {
        addons: PathBuf,
    }

    #[cfg(unix)]
    impl CommandRunner for LockingRunner {
        fn run(&self, _spec: &CommandSpec) -> Result<CommandOutput> {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.addons, fs::Permissions::from_mode(0o555)).unwrap();
            Ok(CommandOutput {
                success: true,
                code: Some(0),
                ..CommandOutput::default()
            })
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_commit_failure_after_python_link_is_partial() {
        use std::os::unix::fs::PermissionsExt;

        // Permission bits don't stop root
        if uzers::get_current_uid() == 0 {
            return;
        }

        let f = fixture();
        let prefix = f.user_config.parent().unwrap().join("conda-env");
        fs::create_dir_all(&prefix).unwrap();
        let mut config = pip_config(vec![PackageSpec::new("spglib", None, true)]);
        config.conda_env_name = Some("batoms".to_string());
        let mut env = f.env.clone();
        env.set("CONDA_PREFIX", prefix.to_str().unwrap());
        env.set("CONDA_EXE", "/opt/conda/bin/conda");
        let addons = f.root.path().join("scripts").join("addons");
        let runner = LockingRunner {
            addons: addons.clone(),
        };

        let err = Installer::new(&Linux, &env, &config, &runner)
            .install(&f.root, &f.package, &InstallOptions::default())
            .unwrap_err();
        fs::set_permissions(&addons, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(
            err,
            InstallerError::StepFailed { step: Step::Commit, partial_state: true, .. }
        ));
        assert!(f.root.path().join("_old_python").is_dir());
        assert!(!target(&f).exists());
    }
}
