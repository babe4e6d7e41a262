use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "batoms-install")]
#[command(about = "Install the batoms add-on into a Blender distribution", long_about = None)]
#[command(version = crate::version::VERSION)]
#[command(after_help = "\
By default dependencies are installed into the active conda environment and
Blender's bundled python is linked to it. Use --use-pip to install them with
Blender's own interpreter instead.

EXAMPLES:
  batoms-install                                  Install into the detected Blender
  batoms-install ~/blender-3.1.2-linux-x64/3.1    Install into a given root
  batoms-install --use-pip --use-startup          pip mode, with the startup file
  batoms-install --uninstall                      Remove the add-on again")]
pub struct Cli {
    /// Blender installation root (the <major.minor> directory); detected when omitted
    #[arg(value_name = "ROOT")]
    pub blender_root: Option<String>,

    /// Remove the add-on instead of installing it
    #[arg(long)]
    pub uninstall: bool,

    /// Install dependencies with Blender's bundled pip instead of conda
    #[arg(long = "use-pip")]
    pub use_pip: bool,

    /// Install the batoms startup file
    #[arg(long = "use-startup", conflicts_with = "uninstall")]
    pub use_startup: bool,

    /// Install the batoms preferences file
    #[arg(long = "use-preferences", conflicts_with = "uninstall")]
    pub use_preferences: bool,

    /// Only install dependencies, leave the add-on files alone
    #[arg(long = "dependency-only", conflicts_with = "uninstall")]
    pub dependency_only: bool,

    /// Repository containing the add-on sources (default: current directory)
    #[arg(short = 'p', long = "local-repo-path", value_name = "PATH")]
    pub local_repo_path: Option<PathBuf>,

    /// Conda environment receiving dependencies (default: $CONDA_DEFAULT_ENV)
    #[arg(short = 'n', long = "conda-env-name", value_name = "NAME")]
    pub conda_env_name: Option<String>,

    /// Blender version to pick when several are installed, e.g. 3.1
    #[arg(long = "host-version", value_name = "X.Y")]
    pub host_version: Option<String>,

    /// Link the add-on to the repository instead of copying it
    #[arg(long, conflicts_with_all = ["uninstall", "dependency_only"])]
    pub symlink: bool,

    /// Extra configuration file, applied over the global and repository ones
    #[arg(long, value_name = "FILE", env = "BATOMS_INSTALL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Show debug output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Cli {
    /// Repository root holding the add-on, falling back to the working directory
    pub fn repo_root(&self) -> std::io::Result<PathBuf> {
        match &self.local_repo_path {
            Some(path) => std::path::absolute(path),
            None => std::env::current_dir(),
        }
    }
}
