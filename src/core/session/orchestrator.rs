// ─── Launch Session ───
// One play request: authenticate, sync content, build options, start the
// game and report its lifecycle until it exits.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::auth::AuthProvider;
use crate::core::config::ConfigStore;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::{EventSink, LifecycleEvent, LogLevel};
use crate::core::install::has_game_content;
use crate::core::launch::{build_launch_options, GameLauncher};
use crate::core::paths::LauncherPaths;
use crate::core::sync::ContentSynchronizer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Authenticating,
    Syncing,
    Building,
    Launching,
    Running,
    Closed(Option<i32>),
    Errored(String),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed(_) | SessionState::Errored(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    Closed { code: Option<i32> },
    Errored { error: String },
}

impl SessionOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, SessionOutcome::Errored { .. })
    }
}

pub struct LaunchSession {
    state: SessionState,
    paths: LauncherPaths,
    config: Arc<ConfigStore>,
    auth: Arc<dyn AuthProvider>,
    synchronizer: ContentSynchronizer,
    launcher: Arc<dyn GameLauncher>,
    events: EventSink,
    cancel: CancellationToken,
}

impl LaunchSession {
    pub fn new(
        paths: LauncherPaths,
        config: Arc<ConfigStore>,
        auth: Arc<dyn AuthProvider>,
        synchronizer: ContentSynchronizer,
        launcher: Arc<dyn GameLauncher>,
        events: EventSink,
    ) -> Self {
        Self {
            state: SessionState::Idle,
            paths,
            config,
            auth,
            synchronizer,
            launcher,
            events,
            cancel: CancellationToken::new(),
        }
    }

    /// End the session with `LauncherError::Cancelled` once `cancel` fires.
    /// A game that already started keeps running.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.synchronizer = self.synchronizer.with_cancellation(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Drive the session to a terminal state. Exactly one terminal lifecycle
    /// event is emitted.
    pub async fn run(&mut self) -> SessionOutcome {
        let cancel = self.cancel.clone();
        let result = tokio::select! {
            result = self.drive() => result,
            _ = cancel.cancelled() => Err(LauncherError::Cancelled),
        };
        if matches!(result, Err(LauncherError::Cancelled)) {
            warn!(
                "Session {} cancelled in state {:?}",
                self.events.session_id(),
                self.state
            );
        }
        // Nothing may still be writing game files once the outcome is out.
        self.synchronizer.settle().await;

        match result {
            Ok(code) => {
                info!("Game exited with code {:?}", code);
                self.transition(SessionState::Closed(code));
                self.events.lifecycle(LifecycleEvent::Closed { code });
                SessionOutcome::Closed { code }
            }
            Err(err) => {
                let detail = err.to_string();
                error!("Session {} failed: {}", self.events.session_id(), detail);
                self.events.log(LogLevel::Error, detail.clone());
                self.transition(SessionState::Errored(detail.clone()));
                self.events.lifecycle(LifecycleEvent::Error {
                    detail: detail.clone(),
                });
                SessionOutcome::Errored { error: detail }
            }
        }
    }

    async fn drive(&mut self) -> LauncherResult<Option<i32>> {
        self.transition(SessionState::Authenticating);
        let profile = self
            .auth
            .authenticate()
            .await
            .map_err(|err| match err {
                LauncherError::AuthFailed(_) => err,
                other => LauncherError::AuthFailed(other.to_string()),
            })?
            .filter(|profile| profile.is_usable())
            .ok_or(LauncherError::NoProfile)?
            .sanitized();
        info!("Playing as {}", profile.username);

        self.transition(SessionState::Syncing);
        let sync = self.synchronizer.sync(&self.events).await?;
        if sync.offline {
            self.ensure_offline_install().await?;
        }

        self.transition(SessionState::Building);
        let config = self.config.load().await;
        let options = build_launch_options(profile, &config, &self.paths);
        debug!("Launch options: {:?}", options);

        self.transition(SessionState::Launching);
        let process = self
            .launcher
            .launch(&options, &self.events)
            .await
            .map_err(|err| match err {
                LauncherError::LaunchFailed(_) => err,
                other => LauncherError::LaunchFailed(other.to_string()),
            })?;
        drop(options);

        info!("Game started (pid {:?})", process.pid);
        self.events
            .lifecycle(LifecycleEvent::Launched { pid: process.pid });
        self.transition(SessionState::Running);

        process.wait().await
    }

    /// Without the update server only complete content may be launched.
    ///
    /// Installs made before versions were recorded have no `version` key;
    /// those count as complete when they are not marked broken and hold
    /// game content besides protected user data.
    async fn ensure_offline_install(&self) -> LauncherResult<()> {
        let config = self.config.load().await;
        if config.has_usable_install() {
            info!(
                "Offline, launching installed release {:?}",
                config.installed_version
            );
            return Ok(());
        }

        if !config.broken && has_game_content(self.synchronizer.install_dir()).await {
            info!("Offline, launching unversioned install");
            return Ok(());
        }

        Err(LauncherError::InstallUnavailable)
    }

    fn transition(&mut self, next: SessionState) {
        debug!(
            "Session {}: {:?} -> {:?}",
            self.events.session_id(),
            self.state,
            next
        );
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use crate::core::auth::{AuthProfile, OfflineAuthProvider};
    use crate::core::config::AppConfig;
    use crate::core::events::{EventPayload, SessionEvent};
    use crate::core::launch::{GameProcess, LaunchOptions};
    use crate::core::manifest::{ManifestSource, RemoteManifest};
    use crate::core::sync::ArchiveDownloader;

    struct Unreachable;

    #[async_trait]
    impl ManifestSource for Unreachable {
        async fn fetch(&self) -> LauncherResult<RemoteManifest> {
            Err(LauncherError::ManifestUnavailable("test: unreachable".into()))
        }
    }

    struct ExpiredAccount;

    #[async_trait]
    impl AuthProvider for ExpiredAccount {
        async fn authenticate(&self) -> LauncherResult<Option<AuthProfile>> {
            Err(LauncherError::Other("refresh token expired".into()))
        }
    }

    #[derive(Default)]
    struct RecordingLauncher {
        launched: StdMutex<Vec<u32>>,
    }

    #[async_trait]
    impl GameLauncher for RecordingLauncher {
        async fn launch(
            &self,
            options: &LaunchOptions,
            _events: &EventSink,
        ) -> LauncherResult<GameProcess> {
            self.launched.lock().unwrap().push(options.memory.max_gb);
            Ok(GameProcess::new(Some(7), tokio::spawn(async { Ok::<_, std::io::Error>(Some(0)) })))
        }
    }

    struct FailingLauncher;

    #[async_trait]
    impl GameLauncher for FailingLauncher {
        async fn launch(&self, _: &LaunchOptions, _: &EventSink) -> LauncherResult<GameProcess> {
            Err(LauncherError::Other("runtime missing".into()))
        }
    }

    /// Starts a game that never exits on its own.
    struct EndlessLauncher;

    #[async_trait]
    impl GameLauncher for EndlessLauncher {
        async fn launch(&self, _: &LaunchOptions, _: &EventSink) -> LauncherResult<GameProcess> {
            Ok(GameProcess::new(
                Some(9),
                tokio::spawn(async {
                    std::future::pending::<()>().await;
                    Ok::<_, std::io::Error>(Some(0))
                }),
            ))
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        paths: LauncherPaths,
        config: Arc<ConfigStore>,
    }

    async fn fixture(config: AppConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let paths = LauncherPaths::new(dir.path());
        let store = Arc::new(ConfigStore::new(paths.config_file()));
        store.save(&config).await.unwrap();
        Fixture {
            _dir: dir,
            paths,
            config: store,
        }
    }

    fn session(
        fx: &Fixture,
        auth: Arc<dyn AuthProvider>,
        launcher: Arc<dyn GameLauncher>,
        events: EventSink,
    ) -> LaunchSession {
        let synchronizer = ContentSynchronizer::new(
            fx.paths.install_dir(),
            fx.config.clone(),
            Arc::new(Unreachable),
            ArchiveDownloader::new(reqwest::Client::new()),
        );
        LaunchSession::new(
            fx.paths.clone(),
            fx.config.clone(),
            auth,
            synchronizer,
            launcher,
            events,
        )
    }

    fn alex() -> Arc<dyn AuthProvider> {
        Arc::new(OfflineAuthProvider::new(Some("Alex".into())))
    }

    fn lifecycle(events: &[SessionEvent]) -> Vec<LifecycleEvent> {
        events
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::Lifecycle(l) => Some(l.clone()),
                _ => None,
            })
            .collect()
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn installed(version: &str) -> AppConfig {
        AppConfig {
            ram_gb: 6,
            installed_version: Some(version.into()),
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn missing_profile_ends_without_side_effects() {
        let fx = fixture(installed("1.0.0")).await;
        let launcher = Arc::new(RecordingLauncher::default());
        let (sink, mut rx) = EventSink::channel("s");
        let mut session = session(&fx, Arc::new(OfflineAuthProvider::new(None)), launcher.clone(), sink);

        let outcome = session.run().await;

        assert_eq!(
            outcome,
            SessionOutcome::Errored {
                error: LauncherError::NoProfile.to_string()
            }
        );
        assert!(matches!(session.state(), SessionState::Errored(_)));
        assert!(launcher.launched.lock().unwrap().is_empty());
        assert!(!fx.paths.install_dir().exists());
        assert_eq!(
            lifecycle(&drain(&mut rx)),
            vec![LifecycleEvent::Error {
                detail: LauncherError::NoProfile.to_string()
            }]
        );
    }

    #[tokio::test]
    async fn provider_errors_become_auth_failed() {
        let fx = fixture(installed("1.0.0")).await;
        let launcher = Arc::new(RecordingLauncher::default());
        let (sink, mut rx) = EventSink::channel("s");
        let mut session = session(&fx, Arc::new(ExpiredAccount), launcher.clone(), sink);

        let outcome = session.run().await;

        let expected = LauncherError::AuthFailed(
            LauncherError::Other("refresh token expired".into()).to_string(),
        )
        .to_string();
        assert_eq!(
            outcome,
            SessionOutcome::Errored {
                error: expected.clone()
            }
        );
        assert!(launcher.launched.lock().unwrap().is_empty());
        assert!(!fx.paths.install_dir().exists());
        assert_eq!(
            lifecycle(&drain(&mut rx)),
            vec![LifecycleEvent::Error { detail: expected }]
        );
    }

    #[tokio::test]
    async fn offline_with_install_launches_and_closes() {
        let fx = fixture(installed("1.0.0")).await;
        let launcher = Arc::new(RecordingLauncher::default());
        let (sink, mut rx) = EventSink::channel("s");
        let mut session = session(&fx, alex(), launcher.clone(), sink);

        let outcome = session.run().await;

        assert_eq!(outcome, SessionOutcome::Closed { code: Some(0) });
        assert_eq!(session.state(), &SessionState::Closed(Some(0)));
        assert_eq!(*launcher.launched.lock().unwrap(), vec![6]);
        assert_eq!(
            lifecycle(&drain(&mut rx)),
            vec![
                LifecycleEvent::Launched { pid: Some(7) },
                LifecycleEvent::Closed { code: Some(0) }
            ]
        );
    }

    #[tokio::test]
    async fn offline_without_install_is_unavailable() {
        let fx = fixture(AppConfig {
            broken: true,
            ..AppConfig::default()
        })
        .await;
        let launcher = Arc::new(RecordingLauncher::default());
        let mut session = session(&fx, alex(), launcher.clone(), EventSink::disconnected());

        let outcome = session.run().await;

        assert_eq!(
            outcome,
            SessionOutcome::Errored {
                error: LauncherError::InstallUnavailable.to_string()
            }
        );
        assert!(launcher.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_unversioned_install_with_content_launches() {
        let fx = fixture(AppConfig::default()).await;
        let install_dir = fx.paths.install_dir();
        std::fs::create_dir_all(install_dir.join("mods")).unwrap();
        std::fs::write(install_dir.join("mods/arcend-core.jar"), b"jar").unwrap();
        let launcher = Arc::new(RecordingLauncher::default());
        let mut session = session(&fx, alex(), launcher.clone(), EventSink::disconnected());

        assert_eq!(session.run().await, SessionOutcome::Closed { code: Some(0) });
        assert_eq!(launcher.launched.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn offline_unversioned_install_needs_more_than_user_data() {
        let fx = fixture(AppConfig::default()).await;
        let install_dir = fx.paths.install_dir();
        std::fs::create_dir_all(install_dir.join("saves/World")).unwrap();
        std::fs::write(install_dir.join("options.txt"), b"fov:90").unwrap();
        let launcher = Arc::new(RecordingLauncher::default());
        let mut session = session(&fx, alex(), launcher.clone(), EventSink::disconnected());

        assert_eq!(
            session.run().await,
            SessionOutcome::Errored {
                error: LauncherError::InstallUnavailable.to_string()
            }
        );
        assert!(launcher.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn launcher_errors_become_launch_failed() {
        let fx = fixture(installed("1.0.0")).await;
        let mut session = session(&fx, alex(), Arc::new(FailingLauncher), EventSink::disconnected());

        match session.run().await {
            SessionOutcome::Errored { error } => {
                assert!(error.contains("runtime missing"), "{error}");
                assert_eq!(
                    error,
                    LauncherError::LaunchFailed(
                        LauncherError::Other("runtime missing".into()).to_string()
                    )
                    .to_string()
                );
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelling_a_running_session_reports_one_error() {
        let fx = fixture(installed("1.0.0")).await;
        let (sink, mut rx) = EventSink::channel("s");
        let cancel = CancellationToken::new();
        let mut session =
            session(&fx, alex(), Arc::new(EndlessLauncher), sink).with_cancellation(cancel.clone());

        let running = tokio::spawn(async move {
            let outcome = session.run().await;
            (outcome, session.state().clone())
        });
        // Wait for the game to report its pid before cancelling.
        loop {
            let event = rx.recv().await.unwrap();
            if let EventPayload::Lifecycle(LifecycleEvent::Launched { .. }) = event.payload {
                break;
            }
        }
        cancel.cancel();
        let (outcome, state) = running.await.unwrap();

        let detail = LauncherError::Cancelled.to_string();
        assert_eq!(
            outcome,
            SessionOutcome::Errored {
                error: detail.clone()
            }
        );
        assert_eq!(state, SessionState::Errored(detail.clone()));
        assert_eq!(
            lifecycle(&drain(&mut rx)),
            vec![LifecycleEvent::Error { detail }]
        );
    }

    #[test]
    fn unusable_profiles_are_rejected() {
        let profile = AuthProfile {
            access_token: " ".into(),
            ..AuthProfile::offline("Alex")
        };
        assert!(!profile.is_usable());
        assert!(SessionState::Errored("x".into()).is_terminal());
        assert!(!SessionState::Running.is_terminal());
    }
}
