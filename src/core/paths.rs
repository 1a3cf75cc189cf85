use std::path::{Path, PathBuf};

use crate::core::error::{LauncherError, LauncherResult};

const APP_DIR_NAME: &str = "Arcend";
const DATA_DIR_ENV: &str = "ARCEND_DATA_DIR";

/// On-disk layout of the launcher.
///
/// ```text
/// <data_dir>/
///   config/app.json   persisted settings
///   game/             managed install directory
///   runtime/bin/java  bundled Java runtime
/// ```
#[derive(Debug, Clone)]
pub struct LauncherPaths {
    data_dir: PathBuf,
}

impl LauncherPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Resolve the data directory from `ARCEND_DATA_DIR`, falling back to the
    /// platform data directory, and make sure it exists.
    pub fn resolve() -> LauncherResult<Self> {
        let data_dir = match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR_NAME),
        };

        std::fs::create_dir_all(&data_dir).map_err(|source| LauncherError::Io {
            path: data_dir.clone(),
            source,
        })?;

        Ok(Self::new(data_dir))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn install_dir(&self) -> PathBuf {
        self.data_dir.join("game")
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config").join("app.json")
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.data_dir.join("runtime")
    }

    pub fn java_binary(&self) -> PathBuf {
        if cfg!(target_os = "windows") {
            self.runtime_dir().join("bin").join("java.exe")
        } else {
            self.runtime_dir().join("bin").join("java")
        }
    }
}
