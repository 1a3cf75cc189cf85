// ─── Remote Manifest ───
// Fetches the descriptor of the current release from the update server.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::error::{LauncherError, LauncherResult};

pub const DEFAULT_MANIFEST_URL: &str = "https://launcher.arcend.net/manifest.json";
const MANIFEST_URL_ENV: &str = "ARCEND_MANIFEST_URL";
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Current release as published by the update server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteManifest {
    #[serde(rename = "arcend_version")]
    pub version: String,
    #[serde(rename = "arcend_url")]
    pub archive_url: String,
    /// Hex SHA-256 of the archive, when the server publishes one.
    #[serde(rename = "arcend_sha256", default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl RemoteManifest {
    fn validated(self) -> Result<Self, String> {
        if self.version.trim().is_empty() {
            return Err("empty arcend_version".into());
        }
        if self.archive_url.trim().is_empty() {
            return Err("empty arcend_url".into());
        }
        Ok(self)
    }
}

/// Where the synchronizer gets the current release from.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Single attempt. Any failure is `LauncherError::ManifestUnavailable`.
    async fn fetch(&self) -> LauncherResult<RemoteManifest>;
}

pub struct HttpManifestFetcher {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpManifestFetcher {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// `ARCEND_MANIFEST_URL` when set, else the production endpoint.
    pub fn configured_url() -> String {
        std::env::var(MANIFEST_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MANIFEST_URL.to_string())
    }

    async fn fetch_inner(&self) -> Result<RemoteManifest, String> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| e.to_string())?;
        let manifest: RemoteManifest =
            serde_json::from_slice(&body).map_err(|e| format!("malformed manifest: {e}"))?;
        manifest.validated()
    }
}

#[async_trait]
impl ManifestSource for HttpManifestFetcher {
    async fn fetch(&self) -> LauncherResult<RemoteManifest> {
        info!("Fetching remote manifest from {}", self.url);

        let manifest = self
            .fetch_inner()
            .await
            .map_err(|detail| LauncherError::ManifestUnavailable(format!("{}: {detail}", self.url)))?;

        info!("Remote release is {}", manifest.version);
        Ok(manifest)
    }
}
