use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the launcher core.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Remote manifest unavailable: {0}")]
    ManifestUnavailable(String),

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-256 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha256Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── Sync ────────────────────────────────────────────
    #[error("Content sync failed: {0}")]
    SyncFailed(String),

    #[error("Game files are missing or incomplete and the update server is unreachable")]
    InstallUnavailable,

    // ── Auth ────────────────────────────────────────────
    #[error("No usable account profile")]
    NoProfile,

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    // ── Launch ──────────────────────────────────────────
    #[error("Game launch failed: {0}")]
    LaunchFailed(String),

    #[error("A play session is already running")]
    SessionBusy,

    #[error("Session cancelled")]
    Cancelled,

    // ── Settings ────────────────────────────────────────
    #[error("Invalid RAM value {value} GB (allowed {min}..={max})")]
    InvalidRam { value: u32, min: u32, max: u32 },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl LauncherError {
    /// Wrap any failure raised while syncing content into `SyncFailed`,
    /// keeping the human-readable detail.
    pub fn into_sync_failure(self) -> Self {
        match self {
            LauncherError::SyncFailed(_) | LauncherError::Cancelled => self,
            other => LauncherError::SyncFailed(other.to_string()),
        }
    }
}

// ── Serialization for the event boundary ────────────────
// Errors cross the UI boundary as their display string.
impl serde::Serialize for LauncherError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
