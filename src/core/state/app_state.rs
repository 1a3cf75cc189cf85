use std::sync::Arc;

use tokio::sync::Mutex;

use crate::core::auth::AuthProvider;
use crate::core::config::ConfigStore;
use crate::core::error::LauncherResult;
use crate::core::events::EventSink;
use crate::core::http::build_http_client;
use crate::core::launch::{GameLauncher, JavaGameLauncher};
use crate::core::manifest::{HttpManifestFetcher, ManifestSource};
use crate::core::paths::LauncherPaths;
use crate::core::session::LaunchSession;
use crate::core::sync::{ArchiveDownloader, ContentSynchronizer};

/// Long-lived launcher state shared by every host command.
pub struct AppState {
    pub paths: LauncherPaths,
    pub config: Arc<ConfigStore>,
    pub manifest: Arc<dyn ManifestSource>,
    pub auth: Arc<dyn AuthProvider>,
    pub launcher: Arc<dyn GameLauncher>,
    downloader: ArchiveDownloader,
    /// Held by the running session; at most one play request at a time.
    session_gate: Arc<Mutex<()>>,
}

impl AppState {
    /// Production wiring: HTTP manifest at the configured URL and the bundled
    /// Java runtime.
    pub fn new(paths: LauncherPaths, auth: Arc<dyn AuthProvider>) -> LauncherResult<Self> {
        let http_client = build_http_client()?;
        let manifest = Arc::new(HttpManifestFetcher::new(
            http_client.clone(),
            HttpManifestFetcher::configured_url(),
        ));
        let downloader = ArchiveDownloader::new(http_client);

        Ok(Self::with_collaborators(
            paths,
            manifest,
            auth,
            Arc::new(JavaGameLauncher::new()),
            downloader,
        ))
    }

    pub fn with_collaborators(
        paths: LauncherPaths,
        manifest: Arc<dyn ManifestSource>,
        auth: Arc<dyn AuthProvider>,
        launcher: Arc<dyn GameLauncher>,
        downloader: ArchiveDownloader,
    ) -> Self {
        let config = Arc::new(ConfigStore::new(paths.config_file()));
        Self {
            paths,
            config,
            manifest,
            auth,
            launcher,
            downloader,
            session_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn session_gate(&self) -> Arc<Mutex<()>> {
        self.session_gate.clone()
    }

    /// A fresh session wired to the shared collaborators.
    pub fn new_session(&self, events: EventSink) -> LaunchSession {
        let synchronizer = ContentSynchronizer::new(
            self.paths.install_dir(),
            self.config.clone(),
            self.manifest.clone(),
            self.downloader.clone(),
        );
        LaunchSession::new(
            self.paths.clone(),
            self.config.clone(),
            self.auth.clone(),
            synchronizer,
            self.launcher.clone(),
            events,
        )
    }
}
