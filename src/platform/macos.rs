use super::{unix_embedded_python, HostPlatform, PlatformTag};
use crate::utils::env::HostEnv;
use crate::version::HostVersion;
use std::path::{Path, PathBuf};

const APP_RESOURCES: &str = "Blender.app/Contents/Resources";

/// macOS: app bundles in the system or per-user Applications folder
#[derive(Debug, Clone, Copy, Default)]
pub struct MacOs;

impl HostPlatform for MacOs {
    fn tag(&self) -> PlatformTag {
        PlatformTag::MacOs
    }

    fn binary_name(&self) -> &'static str {
        "Blender"
    }

    fn default_search_bases(&self, env: &HostEnv) -> Vec<PathBuf> {
        let mut bases = vec![PathBuf::from("/Applications").join(APP_RESOURCES)];
        if let Some(home) = env.home() {
            bases.push(home.join("Applications").join(APP_RESOURCES));
        }
        bases
    }

    /// `Blender.app/Contents/MacOS/Blender` -> `Blender.app/Contents/Resources`
    fn bases_for_binary(&self, binary: &Path) -> Vec<PathBuf> {
        binary
            .parent()
            .and_then(Path::parent)
            .map(|contents| contents.join("Resources"))
            .into_iter()
            .collect()
    }

    fn user_config_dir(&self, env: &HostEnv, version: &HostVersion) -> Option<PathBuf> {
        Some(
            env.home()?
                .join("Library")
                .join("Application Support")
                .join("Blender")
                .join(version.to_string())
                .join("config"),
        )
    }

    fn embedded_python(&self, root: &Path) -> Option<PathBuf> {
        unix_embedded_python(root)
    }
}
