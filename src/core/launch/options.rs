use std::path::PathBuf;

use serde::Serialize;

use crate::core::auth::AuthProfile;
use crate::core::config::{AppConfig, MAX_RAM_GB, MIN_RAM_GB};
use crate::core::paths::LauncherPaths;

/// Game release the bundle is built against.
pub const GAME_VERSION: &str = "1.20.1";
pub const GAME_VERSION_TYPE: &str = "release";
/// Mod-loader installer shipped inside the content archive.
pub const MOD_LOADER_INSTALLER: &str = "forge-installer.jar";
/// Initial heap, always below the configured maximum.
pub const MIN_MEMORY_GB: u32 = 1;

const _: () = assert!(MIN_MEMORY_GB < MIN_RAM_GB);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionSpec {
    pub number: String,
    #[serde(rename = "type")]
    pub version_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryBounds {
    pub min_gb: u32,
    pub max_gb: u32,
}

impl MemoryBounds {
    /// Heap bounds for a configured RAM amount. Out-of-range values are
    /// clamped so that `min_gb < max_gb` always holds.
    pub fn for_ram(ram_gb: u32) -> Self {
        Self {
            min_gb: MIN_MEMORY_GB,
            max_gb: ram_gb.clamp(MIN_RAM_GB, MAX_RAM_GB),
        }
    }
}

/// Everything needed to start the game once. Built per play request and
/// dropped after the process has started.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub auth: AuthProfile,
    pub install_dir: PathBuf,
    pub java_path: PathBuf,
    pub version: VersionSpec,
    pub mod_loader_installer: Option<PathBuf>,
    pub memory: MemoryBounds,
}

/// Pure: no I/O, same inputs give the same options.
pub fn build_launch_options(
    auth: AuthProfile,
    config: &AppConfig,
    paths: &LauncherPaths,
) -> LaunchOptions {
    let install_dir = paths.install_dir();
    LaunchOptions {
        auth,
        mod_loader_installer: Some(install_dir.join(MOD_LOADER_INSTALLER)),
        install_dir,
        java_path: paths.java_binary(),
        version: VersionSpec {
            number: GAME_VERSION.into(),
            version_type: GAME_VERSION_TYPE.into(),
        },
        memory: MemoryBounds::for_ram(config.ram_gb),
    }
}
