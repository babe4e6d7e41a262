use super::{unix_embedded_python, HostPlatform, PlatformTag};
use crate::utils::env::HostEnv;
use crate::version::HostVersion;
use std::path::{Path, PathBuf};

/// Linux: tarballs under `/opt`, distro packages under `/usr/share`, snaps
#[derive(Debug, Clone, Copy, Default)]
pub struct Linux;

impl HostPlatform for Linux {
    fn tag(&self) -> PlatformTag {
        PlatformTag::Linux
    }

    fn binary_name(&self) -> &'static str {
        "blender"
    }

    fn default_search_bases(&self, env: &HostEnv) -> Vec<PathBuf> {
        let mut bases = vec![
            PathBuf::from("/opt/blender"),
            PathBuf::from("/usr/share/blender"),
            PathBuf::from("/snap/blender/current"),
        ];
        if let Some(home) = env.home() {
            bases.push(home.join(".local").join("share").join("blender"));
        }
        bases
    }

    fn bases_for_binary(&self, binary: &Path) -> Vec<PathBuf> {
        binary.parent().map(Path::to_path_buf).into_iter().collect()
    }

    fn user_config_dir(&self, env: &HostEnv, version: &HostVersion) -> Option<PathBuf> {
        let config_home = env
            .path("XDG_CONFIG_HOME")
            .or_else(|| env.home().map(|home| home.join(".config")))?;
        Some(
            config_home
                .join("blender")
                .join(version.to_string())
                .join("config"),
        )
    }

    fn embedded_python(&self, root: &Path) -> Option<PathBuf> {
        unix_embedded_python(root)
    }
}
