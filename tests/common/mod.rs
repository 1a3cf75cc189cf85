//! Shared fixtures for the integration tests: a tiny HTTP responder, zip
//! builders and fake collaborators.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arcend_lib::commands::PlayHandle;
use arcend_lib::core::auth::OfflineAuthProvider;
use arcend_lib::core::config::{AppConfig, ConfigStore};
use arcend_lib::core::error::LauncherResult;
use arcend_lib::core::events::{EventPayload, EventSink, LifecycleEvent, ProgressPhase, SessionEvent};
use arcend_lib::core::launch::{GameLauncher, GameProcess, LaunchOptions};
use arcend_lib::core::manifest::HttpManifestFetcher;
use arcend_lib::core::paths::LauncherPaths;
use arcend_lib::core::state::AppState;
use arcend_lib::core::sync::ArchiveDownloader;
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use zip::write::SimpleFileOptions;

/// How the responder answers one path.
#[derive(Clone)]
pub enum Reply {
    /// 200 with `Content-Length`.
    Full(Vec<u8>),
    /// 200 without `Content-Length`; the body ends when the connection closes.
    NoLength(Vec<u8>),
    /// Declares `declared` bytes, sends `body`, then closes.
    Truncated { body: Vec<u8>, declared: usize },
    /// Declares `declared` bytes, sends `body`, then goes silent.
    Stall { body: Vec<u8>, declared: usize },
    /// Accepts the connection and never answers.
    Hang,
    Status(u16),
}

pub struct TestServer {
    addr: SocketAddr,
    routes: Arc<Mutex<HashMap<String, Reply>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(Mutex::new(HashMap::new()));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let (table, seen) = (routes.clone(), requests.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (table, seen) = (table.clone(), seen.clone());
                tokio::spawn(async move {
                    let _ = handle(stream, &table, &seen).await;
                });
            }
        });

        Self {
            addr,
            routes,
            requests,
        }
    }

    pub fn route(&self, path: &str, reply: Reply) -> &Self {
        self.routes.lock().unwrap().insert(path.to_string(), reply);
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Serve `/manifest.json` announcing `version` at `/content.zip`.
    pub fn publish(&self, version: &str, archive: Reply) {
        let manifest = manifest_json(version, &self.url("/content.zip"));
        self.route("/manifest.json", Reply::Full(manifest));
        self.route("/content.zip", archive);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn handle(
    mut stream: TcpStream,
    routes: &Mutex<HashMap<String, Reply>>,
    seen: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let request = String::from_utf8_lossy(&buf);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    seen.lock().unwrap().push(path.clone());

    let reply = routes
        .lock()
        .unwrap()
        .get(&path)
        .cloned()
        .unwrap_or(Reply::Status(404));
    match reply {
        Reply::Full(body) => {
            write_head(&mut stream, 200, Some(body.len())).await?;
            stream.write_all(&body).await?;
        }
        Reply::NoLength(body) => {
            write_head(&mut stream, 200, None).await?;
            stream.write_all(&body).await?;
        }
        Reply::Truncated { body, declared } => {
            write_head(&mut stream, 200, Some(declared)).await?;
            stream.write_all(&body).await?;
        }
        Reply::Stall { body, declared } => {
            write_head(&mut stream, 200, Some(declared)).await?;
            stream.write_all(&body).await?;
            stream.flush().await?;
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Reply::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Reply::Status(code) => {
            write_head(&mut stream, code, Some(0)).await?;
        }
    }
    stream.flush().await?;
    stream.shutdown().await
}

async fn write_head(stream: &mut TcpStream, status: u16, length: Option<usize>) -> std::io::Result<()> {
    let mut head = format!("HTTP/1.1 {status} X\r\nConnection: close\r\n");
    if let Some(length) = length {
        head.push_str(&format!("Content-Length: {length}\r\n"));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes()).await
}

pub fn manifest_json(version: &str, archive_url: &str) -> Vec<u8> {
    serde_json::json!({ "arcend_version": version, "arcend_url": archive_url })
        .to_string()
        .into_bytes()
}

/// Zip archive in memory. Names ending in `/` become directories.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, body) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(body).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Client that ignores proxy settings of the machine running the tests.
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

pub fn write_file(path: &Path, body: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, body).unwrap();
}

/// Records every launch and reports an immediate exit with code 0.
#[derive(Default)]
pub struct FakeLauncher {
    pub launches: Mutex<Vec<LaunchOptions>>,
}

impl FakeLauncher {
    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }
}

#[async_trait]
impl GameLauncher for FakeLauncher {
    async fn launch(&self, options: &LaunchOptions, events: &EventSink) -> LauncherResult<GameProcess> {
        events.progress(ProgressPhase::Launching, Some(100), "Starting the game");
        self.launches.lock().unwrap().push(options.clone());
        Ok(GameProcess::new(
            Some(4242),
            tokio::spawn(async { Ok::<_, std::io::Error>(Some(0)) }),
        ))
    }
}

/// A scratch data directory plus an `AppState` pointed at the test server.
pub struct Harness {
    pub dir: TempDir,
    pub paths: LauncherPaths,
    pub launcher: Arc<FakeLauncher>,
    pub state: AppState,
}

impl Harness {
    pub fn new(manifest_url: &str) -> Self {
        Self::with_timeouts(manifest_url, Duration::from_secs(5), Duration::from_secs(5))
    }

    pub fn with_timeouts(manifest_url: &str, manifest_timeout: Duration, chunk_timeout: Duration) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = LauncherPaths::new(dir.path());
        let client = test_client();
        let launcher = Arc::new(FakeLauncher::default());
        let state = AppState::with_collaborators(
            paths.clone(),
            Arc::new(HttpManifestFetcher::new(client.clone(), manifest_url).with_timeout(manifest_timeout)),
            Arc::new(OfflineAuthProvider::new(Some("Alex".into()))),
            launcher.clone(),
            ArchiveDownloader::new(client).with_chunk_timeout(chunk_timeout),
        );
        Self {
            dir,
            paths,
            launcher,
            state,
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.state.config
    }

    pub async fn seed_config(&self, config: AppConfig) {
        self.state.config.save(&config).await.unwrap();
    }

    pub fn install_file(&self, relative: &str, body: &[u8]) {
        write_file(&self.paths.install_dir().join(relative), body);
    }

    pub fn install_path(&self, relative: &str) -> std::path::PathBuf {
        self.paths.install_dir().join(relative)
    }

    /// Names of the top-level entries of the install directory, sorted.
    pub fn install_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.paths.install_dir())
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// Every event of the session, until its channel closes.
pub async fn collect_events(handle: &mut PlayHandle) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    events
}

pub fn lifecycle_events(events: &[SessionEvent]) -> Vec<LifecycleEvent> {
    events
        .iter()
        .filter_map(|event| match &event.payload {
            EventPayload::Lifecycle(lifecycle) => Some(lifecycle.clone()),
            _ => None,
        })
        .collect()
}

pub fn progress_phases(events: &[SessionEvent]) -> Vec<ProgressPhase> {
    let mut phases: Vec<ProgressPhase> = Vec::new();
    for event in events {
        if let EventPayload::Progress(progress) = &event.payload {
            if phases.last() != Some(&progress.phase) {
                phases.push(progress.phase);
            }
        }
    }
    phases
}
