use batoms_install::config::Config;
use batoms_install::deps::SystemRunner;
use batoms_install::installer::{InstallOptions, Installer};
use batoms_install::package::AddonPackage;
use batoms_install::platform::Linux;
use batoms_install::resolver::InstallationRoot;
use batoms_install::uninstaller::{UninstallOptions, Uninstaller};
use batoms_install::utils::env::HostEnv;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

fn snapshot(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .map(|e| e.unwrap().path().strip_prefix(dir).unwrap().to_path_buf())
        .collect();
    paths.sort();
    paths
}

fn setup() -> (tempfile::TempDir, InstallationRoot, AddonPackage) {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("blender").join("3.1");
    fs::create_dir_all(root.join("scripts").join("addons").join("cycles")).unwrap();
    fs::create_dir_all(root.join("python").join("bin")).unwrap();
    fs::write(root.join("python").join("bin").join("python3.10"), "").unwrap();

    let source = tmp.path().join("repo").join("batoms");
    fs::create_dir_all(source.join("b")).unwrap();
    fs::write(source.join("a.py"), "").unwrap();
    fs::write(source.join("b").join("c.py"), "").unwrap();

    let package = AddonPackage::open("batoms", source).unwrap();
    (tmp, InstallationRoot::unchecked(root), package)
}

fn no_dependencies() -> Config {
    let mut config = Config::default();
    config.dependencies.packages = Some(vec![]);
    config
}

#[test]
fn test_round_trip_restores_tree() {
    let (_tmp, root, package) = setup();
    let config = no_dependencies();
    let env = HostEnv::default();
    let runner = SystemRunner::new(false);
    let before = snapshot(root.path());

    let options = InstallOptions {
        use_pip: true,
        ..InstallOptions::default()
    };
    Installer::new(&Linux, &env, &config, &runner)
        .install(&root, &package, &options)
        .unwrap();
    assert_ne!(snapshot(root.path()), before);

    let report = Uninstaller::new(&Linux, &config, &runner)
        .uninstall(&root, &UninstallOptions::default())
        .unwrap();
    assert!(report.removed);
    assert_eq!(snapshot(root.path()), before);
}

#[test]
fn test_uninstall_is_idempotent() {
    let (_tmp, root, _package) = setup();
    let config = no_dependencies();
    let runner = SystemRunner::new(false);
    let uninstaller = Uninstaller::new(&Linux, &config, &runner);
    let before = snapshot(root.path());

    assert!(uninstaller.uninstall(&root, &UninstallOptions::default()).unwrap().is_noop());
    assert!(uninstaller.uninstall(&root, &UninstallOptions::default()).unwrap().is_noop());
    assert_eq!(snapshot(root.path()), before);
}

#[test]
fn test_other_addons_are_untouched() {
    let (_tmp, root, package) = setup();
    let config = no_dependencies();
    let env = HostEnv::default();
    let runner = SystemRunner::new(false);
    let options = InstallOptions {
        use_pip: true,
        ..InstallOptions::default()
    };

    Installer::new(&Linux, &env, &config, &runner)
        .install(&root, &package, &options)
        .unwrap();
    Uninstaller::new(&Linux, &config, &runner)
        .uninstall(&root, &UninstallOptions::default())
        .unwrap();

    assert!(root.path().join("scripts/addons/cycles").is_dir());
}

#[cfg(unix)]
#[test]
fn test_conda_round_trip_restores_bundled_python() {
    let (tmp, root, package) = setup();
    let prefix = tmp.path().join("miniconda").join("envs").join("batoms");
    fs::create_dir_all(prefix.join("bin")).unwrap();
    let config = no_dependencies();
    let env = HostEnv::from_pairs([("CONDA_PREFIX", prefix.to_str().unwrap())]);
    let runner = SystemRunner::new(false);
    let before = snapshot(root.path());

    let report = Installer::new(&Linux, &env, &config, &runner)
        .install(&root, &package, &InstallOptions::default())
        .unwrap();
    assert!(report.python_link.is_some());
    assert!(fs::symlink_metadata(root.path().join("python"))
        .unwrap()
        .file_type()
        .is_symlink());

    let report = Uninstaller::new(&Linux, &config, &runner)
        .uninstall(&root, &UninstallOptions::default())
        .unwrap();
    assert!(report.python_restored);
    assert!(root.path().join("python/bin/python3.10").is_file());
    assert_eq!(snapshot(root.path()), before);
}
