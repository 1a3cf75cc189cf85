use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::{EventSink, ProgressPhase};

/// Extract a ZIP archive over `dest`, replacing files that already exist.
///
/// Blocking; run it on the blocking pool. Entries whose path would escape
/// `dest` abort the extraction. `cancel` is checked before every entry.
/// Returns the number of files written.
pub fn extract_archive(
    archive_path: &Path,
    dest: &Path,
    events: &EventSink,
    cancel: &CancellationToken,
) -> LauncherResult<usize> {
    let zip_file = std::fs::File::open(archive_path).map_err(|source| LauncherError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(zip_file)?;

    std::fs::create_dir_all(dest).map_err(|source| LauncherError::Io {
        path: dest.to_path_buf(),
        source,
    })?;

    let total = archive.len();
    let mut last_percent = None;
    let mut written = 0;
    events.progress(ProgressPhase::Extracting, Some(0), "Extracting game files");

    for index in 0..total {
        if cancel.is_cancelled() {
            warn!("Extraction cancelled after {} of {} entries", index, total);
            return Err(LauncherError::Cancelled);
        }

        let mut zipped = archive.by_index(index)?;
        let rel_path = zipped.enclosed_name().ok_or_else(|| {
            LauncherError::Other(format!("Unsafe path in archive: {}", zipped.name()))
        })?;

        if rel_path.as_os_str().is_empty() {
            continue;
        }

        let out_path = dest.join(rel_path);
        if zipped.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|source| LauncherError::Io {
                path: out_path,
                source,
            })?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| LauncherError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }

            // A directory where the archive now has a file.
            if out_path.is_dir() {
                std::fs::remove_dir_all(&out_path).map_err(|source| LauncherError::Io {
                    path: out_path.clone(),
                    source,
                })?;
            }

            let mut out = std::fs::File::create(&out_path).map_err(|source| LauncherError::Io {
                path: out_path.clone(),
                source,
            })?;
            std::io::copy(&mut zipped, &mut out).map_err(|source| LauncherError::Io {
                path: out_path.clone(),
                source,
            })?;

            #[cfg(unix)]
            if let Some(mode) = zipped.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))
                    .map_err(|source| LauncherError::Io {
                        path: out_path.clone(),
                        source,
                    })?;
            }

            written += 1;
            debug!("Extracted {:?}", out_path);
        }

        let percent = ((index + 1) * 100 / total) as u8;
        if last_percent != Some(percent) {
            last_percent = Some(percent);
            events.progress(
                ProgressPhase::Extracting,
                Some(percent),
                format!("Extracting game files ({percent}%)"),
            );
        }
    }

    info!("Extracted {} files into {:?}", written, dest);
    Ok(written)
}
