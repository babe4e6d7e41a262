use super::{HostPlatform, PlatformTag};
use crate::utils::env::HostEnv;
use crate::version::HostVersion;
use std::path::{Path, PathBuf};

const FOUNDATION_DIR: &str = "Blender Foundation";

/// Windows: `%PROGRAMFILES%\Blender Foundation\Blender X.Y\X.Y`
#[derive(Debug, Clone, Copy, Default)]
pub struct Windows;

impl HostPlatform for Windows {
    fn tag(&self) -> PlatformTag {
        PlatformTag::Windows
    }

    fn binary_name(&self) -> &'static str {
        "blender.exe"
    }

    fn default_search_bases(&self, env: &HostEnv) -> Vec<PathBuf> {
        let Some(program_files) = env.path("PROGRAMFILES") else {
            return Vec::new();
        };
        let foundation = program_files.join(FOUNDATION_DIR);

        let mut bases: Vec<PathBuf> = std::fs::read_dir(&foundation)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
                    .filter(|entry| entry.file_name().to_string_lossy().starts_with("Blender"))
                    .map(|entry| entry.path())
                    .collect()
            })
            .unwrap_or_default();
        bases.sort();
        bases
    }

    fn bases_for_binary(&self, binary: &Path) -> Vec<PathBuf> {
        binary.parent().map(Path::to_path_buf).into_iter().collect()
    }

    fn user_config_dir(&self, env: &HostEnv, version: &HostVersion) -> Option<PathBuf> {
        Some(
            env.path("APPDATA")?
                .join(FOUNDATION_DIR)
                .join("Blender")
                .join(version.to_string())
                .join("config"),
        )
    }

    fn embedded_python(&self, root: &Path) -> Option<PathBuf> {
        let python = root.join("python").join("bin").join("python.exe");
        python.is_file().then_some(python)
    }

    /// Directory symlinks need elevated rights and conda's python is not
    /// loadable from Blender on Windows, so only pip mode is offered
    fn supports_python_link(&self) -> bool {
        false
    }
}
