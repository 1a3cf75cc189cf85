// ─── Content Synchronizer ───
// Brings the install directory to the release named by the remote manifest.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, instrument, warn};

use super::download::{sweep_stale_archives, ArchiveDownloader, TempArchive};
use super::extract::extract_archive;
use crate::core::config::ConfigStore;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::{EventSink, ProgressPhase};
use crate::core::install::clean_install_dir;
use crate::core::manifest::{ManifestSource, RemoteManifest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    /// New content was downloaded and extracted.
    pub updated: bool,
    /// Version present in the install directory after the sync.
    pub version: Option<String>,
    /// The manifest could not be fetched; nothing was touched.
    pub offline: bool,
}

pub struct ContentSynchronizer {
    install_dir: PathBuf,
    config: Arc<ConfigStore>,
    manifest: Arc<dyn ManifestSource>,
    downloader: ArchiveDownloader,
    cancel: CancellationToken,
    /// Blocking jobs that write into the install directory.
    blocking: TaskTracker,
}

impl ContentSynchronizer {
    pub fn new(
        install_dir: PathBuf,
        config: Arc<ConfigStore>,
        manifest: Arc<dyn ManifestSource>,
        downloader: ArchiveDownloader,
    ) -> Self {
        Self {
            install_dir,
            config,
            manifest,
            downloader,
            cancel: CancellationToken::new(),
            blocking: TaskTracker::new(),
        }
    }

    /// Stop blocking work early once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Wait until no blocking job is touching the install directory. Futures
    /// of an abandoned `sync` do not stop the jobs they started.
    pub async fn settle(&self) {
        self.blocking.close();
        self.blocking.wait().await;
        self.blocking.reopen();
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Reconcile the install directory with the remote manifest.
    ///
    /// An unreachable manifest is not an error: the installed content is
    /// used as-is and `offline` is set. Download and extraction failures are
    /// returned as `LauncherError::SyncFailed`; the install then stays
    /// marked broken until a later sync succeeds.
    #[instrument(skip_all, fields(install_dir = ?self.install_dir))]
    pub async fn sync(&self, events: &EventSink) -> LauncherResult<SyncResult> {
        let config = self.config.load().await;
        events.progress(ProgressPhase::Checking, None, "Checking for updates");

        let manifest = match self.manifest.fetch().await {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!("{}. Continuing with installed content", err);
                return Ok(SyncResult {
                    updated: false,
                    version: config.installed_version,
                    offline: true,
                });
            }
        };

        if !config.broken && config.installed_version.as_deref() == Some(manifest.version.as_str())
        {
            info!("Game files are up to date ({})", manifest.version);
            events.progress(
                ProgressPhase::Checking,
                Some(100),
                "Game files are up to date",
            );
            return Ok(SyncResult {
                updated: false,
                version: Some(manifest.version),
                offline: false,
            });
        }

        info!(
            "Updating game files from {:?} to {}",
            config.installed_version, manifest.version
        );
        self.apply_update(&manifest, events)
            .await
            .map_err(LauncherError::into_sync_failure)?;

        Ok(SyncResult {
            updated: true,
            version: Some(manifest.version),
            offline: false,
        })
    }

    async fn apply_update(&self, manifest: &RemoteManifest, events: &EventSink) -> LauncherResult<()> {
        // From here on the directory no longer matches any release.
        self.config
            .update(|config| {
                config.installed_version = None;
                config.broken = true;
            })
            .await?;

        sweep_stale_archives(&self.install_dir).await;
        let report = clean_install_dir(&self.install_dir).await?;
        if !report.failed.is_empty() {
            warn!(
                "{} entries could not be removed before the update",
                report.failed.len()
            );
        }

        let archive = TempArchive::new_in(&self.install_dir);
        self.downloader
            .download(
                &manifest.archive_url,
                archive.path(),
                manifest.sha256.as_deref(),
                events,
            )
            .await?;

        let dest = self.install_dir.clone();
        let sink = events.clone();
        let cancel = self.cancel.clone();
        // The job owns the archive so the file outlives its reader.
        self.blocking
            .spawn_blocking(move || {
                let extracted = extract_archive(archive.path(), &dest, &sink, &cancel);
                drop(archive);
                extracted
            })
            .await
            .map_err(|e| LauncherError::Other(format!("Task join error: {e}")))??;

        let version = manifest.version.clone();
        self.config
            .update(move |config| {
                config.installed_version = Some(version);
                config.broken = false;
            })
            .await?;

        info!("Installed release {}", manifest.version);
        Ok(())
    }
}
