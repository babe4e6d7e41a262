pub mod install;
pub mod uninstall;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::Result;
use crate::platform::HostPlatform;
use crate::utils::env::HostEnv;

/// Run the install or uninstall command selected on the command line
pub fn execute(cli: &Cli, config: &Config, env: &HostEnv, platform: &dyn HostPlatform) -> Result<()> {
    if cli.uninstall {
        uninstall::execute(cli, config, env, platform)
    } else {
        install::execute(cli, config, env, platform)
    }
}
