use batoms_install::config::{Config, PackageSpec};
use batoms_install::deps::{CommandOutput, CommandRunner, CommandSpec};
use batoms_install::error::{InstallerError, Result, Step};
use batoms_install::installer::{InstallOptions, Installer};
use batoms_install::package::AddonPackage;
use batoms_install::platform::{HostPlatform, Linux, USER_CONFIG_ENV};
use batoms_install::provenance::ArtifactOutcome;
use batoms_install::resolver::InstallationRoot;
use batoms_install::staging::StagedCopy;
use batoms_install::utils::env::HostEnv;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

/// Records commands and fails every one whose last argument is in `failing`
#[derive(Default)]
struct RecordingRunner {
    failing: Vec<String>,
    calls: RefCell<Vec<String>>,
}

impl CommandRunner for RecordingRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(spec.args.join(" "));
        let fail = spec.args.last().is_some_and(|a| self.failing.contains(a));
        Ok(CommandOutput {
            success: !fail,
            code: Some(i32::from(fail)),
            timed_out: false,
            stderr: if fail { "ERROR: no network".to_string() } else { String::new() },
        })
    }
}

struct Fixture {
    tmp: tempfile::TempDir,
    root: InstallationRoot,
    package: AddonPackage,
    env: HostEnv,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("blender-3.1.2-linux-x64").join("3.1");
        fs::create_dir_all(root.join("scripts").join("addons")).unwrap();
        fs::create_dir_all(root.join("python").join("bin")).unwrap();
        fs::write(root.join("python").join("bin").join("python3.10"), "").unwrap();

        let source = tmp.path().join("repo").join("batoms");
        fs::create_dir_all(source.join("b")).unwrap();
        fs::create_dir_all(source.join("data")).unwrap();
        fs::write(source.join("a.py"), "a = 1\n").unwrap();
        fs::write(source.join("b").join("c.py"), "c = 3\n").unwrap();
        fs::write(source.join("data").join("startup.blend"), "startup-v1").unwrap();
        fs::write(source.join("data").join("userpref.blend"), "prefs-v1").unwrap();

        let env = HostEnv::from_pairs([(
            USER_CONFIG_ENV,
            tmp.path().join("user-config").to_str().unwrap(),
        )]);

        Self {
            root: InstallationRoot::unchecked(root),
            package: AddonPackage::open("batoms", source).unwrap(),
            env,
            tmp,
        }
    }

    fn target(&self) -> PathBuf {
        self.root.path().join("scripts").join("addons").join("batoms")
    }

    fn addons(&self) -> PathBuf {
        self.root.path().join("scripts").join("addons")
    }

    fn install(&self, config: &Config, runner: &dyn CommandRunner, options: InstallOptions) -> Result<()> {
        Installer::new(&Linux as &dyn HostPlatform, &self.env, config, runner)
            .install(&self.root, &self.package, &options)
            .map(|_| ())
    }
}

fn config(packages: Vec<PackageSpec>) -> Config {
    let mut config = Config::default();
    config.dependencies.packages = Some(packages);
    config.dependencies.backoff_ms = 0;
    config.dependencies.retries = 1;
    config
}

fn pip() -> InstallOptions {
    InstallOptions {
        use_pip: true,
        ..InstallOptions::default()
    }
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_tree_is_copied_exactly() {
    let f = Fixture::new();
    f.install(&config(vec![]), &RecordingRunner::default(), pip()).unwrap();

    assert_eq!(entries(&f.target()), ["a.py", "b", "data"]);
    assert_eq!(entries(&f.target().join("b")), ["c.py"]);
    assert_eq!(fs::read_to_string(f.target().join("a.py")).unwrap(), "a = 1\n");
    assert_eq!(fs::read_to_string(f.target().join("b").join("c.py")).unwrap(), "c = 3\n");
}

#[test]
fn test_reinstall_replaces_instead_of_merging() {
    let f = Fixture::new();
    let runner = RecordingRunner::default();
    f.install(&config(vec![]), &runner, pip()).unwrap();

    fs::remove_file(f.package.source().join("a.py")).unwrap();
    fs::write(f.package.source().join("d.py"), "d = 4\n").unwrap();
    f.install(&config(vec![]), &runner, pip()).unwrap();

    assert!(!f.target().join("a.py").exists());
    assert!(f.target().join("d.py").is_file());
    assert_eq!(entries(&f.addons()), ["batoms"]);
}

#[test]
fn test_interrupted_stage_never_shows_under_final_name() {
    let f = Fixture::new();
    f.install(&config(vec![]), &RecordingRunner::default(), pip()).unwrap();
    fs::write(f.package.source().join("new.py"), "").unwrap();

    // A run killed between staging and commit
    let staged = StagedCopy::copy(f.package.source(), &f.target()).unwrap();
    let staging = staged.staging_path().unwrap().to_path_buf();
    std::mem::forget(staged);

    assert!(staging.join("new.py").is_file());
    assert!(!f.target().join("new.py").exists());
    assert!(f.target().join("a.py").is_file());

    // The next run cleans up after it
    f.install(&config(vec![]), &RecordingRunner::default(), pip()).unwrap();
    assert!(!staging.exists());
    assert!(f.target().join("new.py").is_file());
    assert_eq!(entries(&f.addons()), ["batoms"]);
}

#[test]
fn test_failed_required_dependency_keeps_prior_install() {
    let f = Fixture::new();
    f.install(&config(vec![]), &RecordingRunner::default(), pip()).unwrap();
    fs::write(f.package.source().join("new.py"), "").unwrap();

    let runner = RecordingRunner {
        failing: vec!["spglib".to_string()],
        ..RecordingRunner::default()
    };
    let err = f
        .install(&config(vec![PackageSpec::new("spglib", None, true)]), &runner, pip())
        .unwrap_err();

    assert_eq!(err.step(), Some(Step::Dependencies));
    assert!(matches!(
        err.root_cause(),
        InstallerError::DependencyInstallFailed { package, .. } if package == "spglib"
    ));
    // pip check, then two attempts
    assert_eq!(runner.calls.borrow().len(), 3);
    assert!(f.target().join("a.py").is_file());
    assert!(!f.target().join("new.py").exists());
    assert_eq!(entries(&f.addons()), ["batoms"]);
}

#[test]
fn test_failed_optional_dependency_does_not_fail() {
    let f = Fixture::new();
    let runner = RecordingRunner {
        failing: vec!["openbabel>=3.1.1".to_string()],
        ..RecordingRunner::default()
    };
    let packages = vec![
        PackageSpec::new("openbabel", Some("openbabel>=3.1.1"), false),
        PackageSpec::new("spglib", None, true),
    ];

    f.install(&config(packages), &runner, pip()).unwrap();
    assert!(f.target().join("a.py").is_file());
}

#[test]
fn test_startup_written_once_and_user_edits_survive() {
    let f = Fixture::new();
    let options = InstallOptions {
        use_startup: true,
        ..pip()
    };
    let runner = RecordingRunner::default();
    let startup = f.tmp.path().join("user-config").join("startup.blend");

    f.install(&config(vec![]), &runner, options).unwrap();
    assert_eq!(fs::read_to_string(&startup).unwrap(), "startup-v1");

    // Updated template replaces our own copy
    fs::write(f.package.source().join("data").join("startup.blend"), "startup-v2").unwrap();
    let report = Installer::new(&Linux, &f.env, &config(vec![]), &runner)
        .install(&f.root, &f.package, &options)
        .unwrap();
    assert_eq!(report.startup.unwrap().outcome, ArtifactOutcome::Replaced);
    assert_eq!(fs::read_to_string(&startup).unwrap(), "startup-v2");

    // But never a file the user changed
    fs::write(&startup, "user scene").unwrap();
    let report = Installer::new(&Linux, &f.env, &config(vec![]), &runner)
        .install(&f.root, &f.package, &options)
        .unwrap();
    assert_eq!(report.startup.unwrap().outcome, ArtifactOutcome::SkippedUserAuthored);
    assert_eq!(fs::read_to_string(&startup).unwrap(), "user scene");
}

#[test]
fn test_install_without_startup_keeps_earlier_startup() {
    let f = Fixture::new();
    let runner = RecordingRunner::default();
    let user_config = f.tmp.path().join("user-config");
    let options = InstallOptions {
        use_startup: true,
        ..pip()
    };

    f.install(&config(vec![]), &runner, options).unwrap();
    let report = Installer::new(&Linux, &f.env, &config(vec![]), &runner)
        .install(&f.root, &f.package, &pip())
        .unwrap();

    assert!(report.startup.is_none());
    assert_eq!(
        fs::read_to_string(user_config.join("startup.blend")).unwrap(),
        "startup-v1"
    );
    let ledger = batoms_install::provenance::Ledger::load(&user_config).unwrap();
    assert!(ledger.is_ours(
        "startup.blend",
        &batoms_install::provenance::digest(b"startup-v1")
    ));
}

#[cfg(unix)]
#[test]
fn test_symlink_install() {
    let f = Fixture::new();
    let options = InstallOptions {
        symlink: true,
        ..pip()
    };
    f.install(&config(vec![]), &RecordingRunner::default(), options).unwrap();

    assert!(fs::symlink_metadata(f.target()).unwrap().file_type().is_symlink());
    fs::write(f.package.source().join("live.py"), "").unwrap();
    assert!(f.target().join("live.py").is_file());
}
