use crate::cli::Cli;
use crate::config::Config;
use crate::deps::SystemRunner;
use crate::error::{Result, Step, StepContext};
use crate::platform::HostPlatform;
use crate::resolver::Resolver;
use crate::uninstaller::{UninstallOptions, Uninstaller};
use crate::utils::env::HostEnv;

pub fn execute(cli: &Cli, config: &Config, env: &HostEnv, platform: &dyn HostPlatform) -> Result<()> {
    let root = Resolver::new(platform, env, &config.host)
        .and_then(|resolver| resolver.resolve_for_uninstall(cli.blender_root.as_deref()))
        .in_step(Step::Resolve)?;

    let Some(root) = root else {
        println!("No Blender installation found, nothing to uninstall.");
        return Ok(());
    };
    println!("Blender installation: {}", root);

    let runner = SystemRunner::new(config.verbose);
    let options = UninstallOptions {
        use_pip: cli.use_pip,
    };
    let report = Uninstaller::new(platform, config, &runner).uninstall(&root, &options)?;

    for path in &report.leftovers_removed {
        println!("Removed leftover {}", path.display());
    }
    if report.python_restored {
        println!("Restored Blender's bundled python");
    }
    match (&report.target, report.removed) {
        (Some(target), true) => println!("Removed {}", target.display()),
        (Some(target), false) => println!("{} is not installed", target.display()),
        (None, _) => {}
    }
    match report.pip_uninstalled {
        Some(true) => println!("Removed dependencies from Blender's python"),
        Some(false) => println!("Some dependencies could not be removed, see the log above"),
        None => {}
    }

    println!();
    println!("Done.");
    Ok(())
}
