#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;

use batoms_install::cli::Cli;
use batoms_install::config::Config;
use batoms_install::utils::env::HostEnv;
use batoms_install::{commands, logging, platform};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let env = HostEnv::from_process();
    let platform = platform::detect()?;
    tracing::debug!("platform: {}", platform.tag());

    let repo_root = cli.repo_root()?;
    let config = Config::load(&repo_root, &env, cli.config.as_deref())?.with_cli_overrides(cli)?;

    commands::execute(cli, &config, &env, platform.as_ref())?;
    Ok(())
}
