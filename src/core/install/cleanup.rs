use std::path::Path;

use tracing::{debug, info, warn};

use super::protected::is_protected;
use crate::core::error::{LauncherError, LauncherResult};

/// Outcome of one cleanup pass, by top-level entry name.
#[derive(Debug, Default, Clone)]
pub struct CleanupReport {
    pub removed: Vec<String>,
    pub kept: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Remove every top-level entry of `install_dir` that is not protected.
///
/// A single entry that cannot be removed (locked file, permissions) is
/// logged and skipped. Only failing to list the directory is an error.
pub async fn clean_install_dir(install_dir: &Path) -> LauncherResult<CleanupReport> {
    let mut report = CleanupReport::default();

    if !install_dir.exists() {
        tokio::fs::create_dir_all(install_dir)
            .await
            .map_err(|source| LauncherError::Io {
                path: install_dir.to_path_buf(),
                source,
            })?;
        return Ok(report);
    }

    let mut entries = tokio::fs::read_dir(install_dir)
        .await
        .map_err(|source| LauncherError::Io {
            path: install_dir.to_path_buf(),
            source,
        })?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| LauncherError::Io {
            path: install_dir.to_path_buf(),
            source,
        })?
    {
        let name = entry.file_name().to_string_lossy().to_string();
        if is_protected(&name) {
            debug!("Keeping protected entry {}", name);
            report.kept.push(name);
            continue;
        }

        match remove_entry(&entry.path()).await {
            Ok(()) => report.removed.push(name),
            Err(err) => {
                warn!("Cannot remove {:?}: {}", entry.path(), err);
                report.failed.push((name, err.to_string()));
            }
        }
    }

    info!(
        "Cleanup of {:?}: {} removed, {} kept, {} failed",
        install_dir,
        report.removed.len(),
        report.kept.len(),
        report.failed.len()
    );
    Ok(report)
}

/// Whether `install_dir` holds anything besides protected entries.
pub async fn has_game_content(install_dir: &Path) -> bool {
    let Ok(mut entries) = tokio::fs::read_dir(install_dir).await else {
        return false;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if !is_protected(&entry.file_name().to_string_lossy()) {
            return true;
        }
    }
    false
}

async fn remove_entry(path: &Path) -> std::io::Result<()> {
    // symlink_metadata so a link to a directory is unlinked, not followed.
    let metadata = tokio::fs::symlink_metadata(path).await?;
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removes_only_unprotected_entries() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("saves/world/region")).unwrap();
        std::fs::write(root.join("saves/world/region/r.0.0.mca"), b"chunks").unwrap();
        std::fs::write(root.join("options.txt"), b"fov:90").unwrap();
        std::fs::create_dir_all(root.join("mods")).unwrap();
        std::fs::write(root.join("mods/old.jar"), b"jar").unwrap();
        std::fs::write(root.join("launcher_log.txt"), b"log").unwrap();
        std::fs::write(root.join(".hidden"), b"x").unwrap();

        let mut report = clean_install_dir(root).await.unwrap();
        report.removed.sort();

        assert_eq!(report.removed, vec!["launcher_log.txt", "mods"]);
        assert!(report.failed.is_empty());
        assert!(root.join("saves/world/region/r.0.0.mca").exists());
        assert_eq!(std::fs::read(root.join("options.txt")).unwrap(), b"fov:90");
        assert!(root.join(".hidden").exists());
        assert!(!root.join("mods").exists());
    }

    #[tokio::test]
    async fn game_content_ignores_protected_entries() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        assert!(!has_game_content(&root.join("missing")).await);

        std::fs::create_dir_all(root.join("saves")).unwrap();
        std::fs::write(root.join("options.txt"), b"fov:90").unwrap();
        std::fs::write(root.join(".arcend-x.zip.part"), b"zip").unwrap();
        assert!(!has_game_content(root).await);

        std::fs::create_dir_all(root.join("mods")).unwrap();
        assert!(has_game_content(root).await);
    }

    #[tokio::test]
    async fn missing_install_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let install = dir.path().join("game");

        let report = clean_install_dir(&install).await.unwrap();
        assert!(report.removed.is_empty());
        assert!(install.is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_directory_is_unlinked_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("outside");
        let install = dir.path().join("game");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("keep.txt"), b"keep").unwrap();
        std::fs::create_dir_all(&install).unwrap();
        std::os::unix::fs::symlink(&outside, install.join("linked")).unwrap();

        clean_install_dir(&install).await.unwrap();

        assert!(!install.join("linked").exists());
        assert!(outside.join("keep.txt").exists());
    }
}
