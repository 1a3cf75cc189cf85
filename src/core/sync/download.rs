use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::{EventSink, ProgressPhase};

// The leading dot keeps in-flight archives out of reach of the cleanup pass.
const ARCHIVE_PREFIX: &str = ".arcend-";
const ARCHIVE_SUFFIX: &str = ".zip.part";
const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(30);
/// Progress cadence when the server does not declare a length.
const INDETERMINATE_STEP_BYTES: u64 = 1024 * 1024;

/// Downloaded archive living inside the install directory.
///
/// The file is removed when this value is dropped, which covers success,
/// failure and an aborted session alike.
#[derive(Debug)]
pub struct TempArchive {
    path: PathBuf,
}

impl TempArchive {
    pub fn new_in(dir: &Path) -> Self {
        Self {
            path: dir.join(format!("{ARCHIVE_PREFIX}{}{ARCHIVE_SUFFIX}", Uuid::new_v4())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed temporary archive {:?}", self.path),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!("Cannot remove temporary archive {:?}: {}", self.path, err),
        }
    }
}

fn is_temp_archive_name(name: &str) -> bool {
    name.starts_with(ARCHIVE_PREFIX) && name.ends_with(ARCHIVE_SUFFIX)
}

/// Delete archives left behind by a sync that was killed before its guard
/// could run. Returns how many were removed.
pub async fn sweep_stale_archives(install_dir: &Path) -> usize {
    let Ok(mut entries) = tokio::fs::read_dir(install_dir).await else {
        return 0;
    };

    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if !is_temp_archive_name(&name) {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(err) => warn!("Cannot remove stale archive {:?}: {}", entry.path(), err),
        }
    }

    if removed > 0 {
        info!("Swept {} stale archive(s) from {:?}", removed, install_dir);
    }
    removed
}

/// Streams one archive to disk, hashing and reporting progress as it goes.
#[derive(Debug, Clone)]
pub struct ArchiveDownloader {
    client: Client,
    /// Upper bound for the response headers and for each body chunk.
    chunk_timeout: Duration,
}

impl ArchiveDownloader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
        }
    }

    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    /// Download `url` into `dest`. Returns the number of bytes written.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        expected_sha256: Option<&str>,
        events: &EventSink,
    ) -> LauncherResult<u64> {
        let response = tokio::time::timeout(self.chunk_timeout, self.client.get(url).send())
            .await
            .map_err(|_| {
                LauncherError::SyncFailed(format!(
                    "no response from {url} within {:?}",
                    self.chunk_timeout
                ))
            })??;

        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total_bytes = response.content_length();
        info!("Downloading {} ({:?} bytes) to {:?}", url, total_bytes, dest);

        // Scoped so the handle is closed before the caller opens the archive.
        let (downloaded, actual_sha256) = {
            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(|source| LauncherError::Io {
                    path: dest.to_path_buf(),
                    source,
                })?;

            let mut hasher = Sha256::new();
            let mut progress = DownloadProgress::new(total_bytes);
            progress.report(events);

            let mut stream = response.bytes_stream();
            loop {
                let next = tokio::time::timeout(self.chunk_timeout, stream.next())
                    .await
                    .map_err(|_| {
                        LauncherError::SyncFailed(format!(
                            "download of {url} stalled for {:?} after {} bytes",
                            self.chunk_timeout, progress.downloaded
                        ))
                    })?;
                let Some(chunk) = next else {
                    break;
                };
                let chunk = chunk?;

                file.write_all(&chunk)
                    .await
                    .map_err(|source| LauncherError::Io {
                        path: dest.to_path_buf(),
                        source,
                    })?;
                hasher.update(&chunk);
                progress.advance(chunk.len() as u64, events);
            }

            file.flush().await.map_err(|source| LauncherError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
            file.sync_all().await.map_err(|source| LauncherError::Io {
                path: dest.to_path_buf(),
                source,
            })?;

            (progress.downloaded, hex::encode(hasher.finalize()))
        };

        if let Some(total) = total_bytes {
            if downloaded != total {
                return Err(LauncherError::SyncFailed(format!(
                    "download of {url} ended after {downloaded} of {total} bytes"
                )));
            }
        }

        if let Some(expected) = expected_sha256 {
            if !actual_sha256.eq_ignore_ascii_case(expected.trim()) {
                return Err(LauncherError::Sha256Mismatch {
                    path: dest.to_path_buf(),
                    expected: expected.to_string(),
                    actual: actual_sha256,
                });
            }
        }

        debug!("Downloaded {} bytes from {}", downloaded, url);
        Ok(downloaded)
    }
}

/// Turns byte counts into `Downloading` events without flooding the sink.
struct DownloadProgress {
    total: Option<u64>,
    downloaded: u64,
    last_percent: Option<u8>,
    next_indeterminate_report: u64,
}

impl DownloadProgress {
    fn new(total: Option<u64>) -> Self {
        Self {
            total,
            downloaded: 0,
            last_percent: None,
            next_indeterminate_report: INDETERMINATE_STEP_BYTES,
        }
    }

    fn percent(&self) -> Option<u8> {
        let total = self.total?;
        if total == 0 {
            return Some(100);
        }
        Some((self.downloaded.saturating_mul(100) / total).min(100) as u8)
    }

    fn advance(&mut self, bytes: u64, events: &EventSink) {
        self.downloaded = self.downloaded.saturating_add(bytes);
        match self.total {
            Some(_) => {
                if self.percent() != self.last_percent {
                    self.report(events);
                }
            }
            None => {
                if self.downloaded >= self.next_indeterminate_report {
                    self.next_indeterminate_report =
                        self.downloaded.saturating_add(INDETERMINATE_STEP_BYTES);
                    self.report(events);
                }
            }
        }
    }

    fn report(&mut self, events: &EventSink) {
        let percent = self.percent();
        self.last_percent = percent;
        let label = match percent {
            Some(p) => format!("Downloading game files ({p}%)"),
            None => format!(
                "Downloading game files ({} MiB)",
                self.downloaded / (1024 * 1024)
            ),
        };
        events.progress(ProgressPhase::Downloading, percent, label);
    }
}
