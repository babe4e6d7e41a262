use crate::cli::Cli;
use crate::config::Config;
use crate::deps::{DependencyStatus, SystemRunner};
use crate::error::{Result, Step, StepContext};
use crate::installer::{InstallOptions, InstallReport, Installer};
use crate::package::AddonPackage;
use crate::platform::HostPlatform;
use crate::python_link::LinkOutcome;
use crate::resolver::Resolver;
use crate::staging::CommitOutcome;
use crate::utils::env::HostEnv;

impl From<&Cli> for InstallOptions {
    fn from(cli: &Cli) -> Self {
        Self {
            use_startup: cli.use_startup,
            use_preferences: cli.use_preferences,
            use_pip: cli.use_pip,
            dependency_only: cli.dependency_only,
            symlink: cli.symlink,
        }
    }
}

pub fn execute(cli: &Cli, config: &Config, env: &HostEnv, platform: &dyn HostPlatform) -> Result<()> {
    let root = Resolver::new(platform, env, &config.host)
        .and_then(|resolver| resolver.resolve(cli.blender_root.as_deref()))
        .in_step(Step::Resolve)?;
    println!("Blender installation: {}", root);

    let repo_root = cli.repo_root()?;
    let package = AddonPackage::open(&config.addon.name, config.package_source(&repo_root))
        .in_step(Step::Prepare)?;

    let runner = SystemRunner::new(config.verbose);
    let options = InstallOptions::from(cli);
    let report = Installer::new(platform, env, config, &runner).install(&root, &package, &options)?;

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &InstallReport) {
    for path in &report.leftovers_removed {
        println!("Removed leftover {}", path.display());
    }

    match &report.python_link {
        Some(LinkOutcome::Linked { prefix }) => {
            println!("Linked Blender's python to {}", prefix.display())
        }
        Some(LinkOutcome::Relinked { prefix }) => {
            println!("Blender's python now points to {}", prefix.display())
        }
        None => {}
    }

    let failed: Vec<&str> = report
        .dependencies
        .iter()
        .filter(|d| !d.is_installed())
        .map(|d| d.name.as_str())
        .collect();
    if !report.dependencies.is_empty() {
        println!(
            "Dependencies: {} installed",
            report.dependencies.len() - failed.len()
        );
    }
    for outcome in &report.dependencies {
        if let DependencyStatus::Failed { reason } = &outcome.status {
            println!("  Skipped optional {}: {}", outcome.name, reason);
        }
    }

    match &report.addon {
        Some(addon) => {
            let verb = match addon.commit {
                CommitOutcome::Installed => "Installed",
                CommitOutcome::Replaced => "Reinstalled",
            };
            if addon.symlink {
                println!("{} {} (linked to the repository)", verb, report.target.display());
            } else {
                println!("{} {} ({} files)", verb, report.target.display(), addon.files);
            }
        }
        None => println!("Dependencies only, add-on files left untouched"),
    }

    for artifact in [&report.startup, &report.preferences].into_iter().flatten() {
        println!("{}: {}", artifact.path.display(), artifact.outcome);
    }

    println!();
    println!("Done. Enable the add-on from Blender's preferences if it is not enabled yet.");
}
