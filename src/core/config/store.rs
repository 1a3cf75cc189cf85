use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::model::{AppConfig, MAX_RAM_GB, MIN_RAM_GB};
use crate::core::error::{LauncherError, LauncherResult};

/// Single-writer access to `config/app.json`.
///
/// Every public operation holds `lock` for its whole duration, so a RAM
/// change and a sync commit racing each other are applied one after the
/// other instead of overwriting each other's read.
pub struct ConfigStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current settings. Never fails: a missing or malformed file
    /// yields the defaults.
    pub async fn load(&self) -> AppConfig {
        let _guard = self.lock.lock().await;
        self.read_unlocked().await
    }

    pub async fn save(&self, config: &AppConfig) -> LauncherResult<()> {
        let _guard = self.lock.lock().await;
        self.write_unlocked(config).await
    }

    /// Load, mutate and save as one step. Returns the saved record.
    pub async fn update<F>(&self, mutate: F) -> LauncherResult<AppConfig>
    where
        F: FnOnce(&mut AppConfig),
    {
        let _guard = self.lock.lock().await;
        let mut config = self.read_unlocked().await;
        mutate(&mut config);
        let config = config.sanitized();
        self.write_unlocked(&config).await?;
        Ok(config)
    }

    pub async fn set_ram(&self, ram_gb: u32) -> LauncherResult<AppConfig> {
        if !(MIN_RAM_GB..=MAX_RAM_GB).contains(&ram_gb) {
            return Err(LauncherError::InvalidRam {
                value: ram_gb,
                min: MIN_RAM_GB,
                max: MAX_RAM_GB,
            });
        }

        let config = self.update(|config| config.ram_gb = ram_gb).await?;
        info!("RAM set to {} GB", ram_gb);
        Ok(config)
    }

    async fn read_unlocked(&self) -> AppConfig {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {:?}, using defaults", self.path);
                return AppConfig::default();
            }
            Err(err) => {
                warn!("Cannot read config {:?}: {}. Using defaults", self.path, err);
                return AppConfig::default();
            }
        };

        match serde_json::from_slice::<AppConfig>(&raw) {
            Ok(config) => config.sanitized(),
            Err(err) => {
                warn!("Corrupt config {:?}: {}. Using defaults", self.path, err);
                AppConfig::default()
            }
        }
    }

    /// Write to a sibling temp file, flush it to disk, then rename over the
    /// real file so readers only ever see a complete document.
    async fn write_unlocked(&self, config: &AppConfig) -> LauncherResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| LauncherError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let json = serde_json::to_vec_pretty(config)?;
        let tmp_path = self.path.with_extension("json.tmp");

        {
            let mut file =
                tokio::fs::File::create(&tmp_path)
                    .await
                    .map_err(|source| LauncherError::Io {
                        path: tmp_path.clone(),
                        source,
                    })?;
            file.write_all(&json)
                .await
                .map_err(|source| LauncherError::Io {
                    path: tmp_path.clone(),
                    source,
                })?;
            file.sync_all().await.map_err(|source| LauncherError::Io {
                path: tmp_path.clone(),
                source,
            })?;
        }

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|source| LauncherError::Io {
                path: self.path.clone(),
                source,
            })?;

        debug!("Saved config to {:?}", self.path);
        Ok(())
    }
}
