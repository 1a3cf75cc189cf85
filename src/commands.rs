use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::config::{AppConfig, MAX_RAM_GB, MIN_RAM_GB};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::{EventSink, SessionEvent};
use crate::core::session::SessionOutcome;
use crate::core::state::AppState;

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Host view of the persisted settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigView {
    pub ram: u32,
    pub version: Option<String>,
    pub broken: bool,
    pub min_ram: u32,
    pub max_ram: u32,
    /// Total physical memory, so a UI can cap its RAM selector.
    pub system_memory_gb: Option<u64>,
}

impl ConfigView {
    fn from_config(config: &AppConfig, system_memory_gb: Option<u64>) -> Self {
        Self {
            ram: config.ram_gb,
            version: config.installed_version.clone(),
            broken: config.broken,
            min_ram: MIN_RAM_GB,
            max_ram: MAX_RAM_GB,
            system_memory_gb,
        }
    }
}

/// A running play session.
pub struct PlayHandle {
    pub session_id: String,
    events: UnboundedReceiver<SessionEvent>,
    cancel: CancellationToken,
    task: JoinHandle<SessionOutcome>,
}

impl PlayHandle {
    /// Next event of the session, `None` once the session and every output
    /// forwarder have finished.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Ask the session to stop. It ends with `Session cancelled` once any
    /// extraction in progress has stopped; until then new play requests are
    /// still rejected. Temporary downloads are removed and a game process
    /// that already started keeps running.
    pub fn cancel(&self) {
        info!("Cancelling session {}", self.session_id);
        self.cancel.cancel();
    }

    pub async fn finish(self) -> LauncherResult<SessionOutcome> {
        self.task
            .await
            .map_err(|e| LauncherError::Other(format!("Task join error: {e}")))
    }
}

/// Start a play session in the background. A second request while one is
/// running is rejected with `SessionBusy`.
pub fn request_play(state: &AppState) -> LauncherResult<PlayHandle> {
    let guard = state
        .session_gate()
        .try_lock_owned()
        .map_err(|_| LauncherError::SessionBusy)?;

    let session_id = Uuid::new_v4().to_string();
    let (sink, events) = EventSink::channel(session_id.clone());
    let cancel = CancellationToken::new();
    let mut session = state.new_session(sink).with_cancellation(cancel.clone());
    info!("Starting play session {}", session_id);

    // The gate is released only after `run` has waited out its blocking work.
    let task = tokio::spawn(async move {
        let _guard = guard;
        session.run().await
    });

    Ok(PlayHandle {
        session_id,
        events,
        cancel,
        task,
    })
}

pub async fn set_ram(state: &AppState, ram_gb: u32) -> LauncherResult<ConfigView> {
    let config = state.config.set_ram(ram_gb).await?;
    info!("RAM allocation set to {} GB", config.ram_gb);
    Ok(ConfigView::from_config(&config, None))
}

pub async fn get_config(state: &AppState) -> LauncherResult<ConfigView> {
    let config = state.config.load().await;
    let system_memory_gb = tokio::task::spawn_blocking(total_system_memory_gb)
        .await
        .unwrap_or_else(|e| {
            warn!("Could not read system memory: {}", e);
            None
        });
    Ok(ConfigView::from_config(&config, system_memory_gb))
}

fn total_system_memory_gb() -> Option<u64> {
    let mut system = sysinfo::System::new();
    system.refresh_memory();
    match system.total_memory() {
        0 => None,
        bytes => Some(bytes.div_ceil(BYTES_PER_GB)),
    }
}
