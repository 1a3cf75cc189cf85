// ─── Session Events ───
// Typed, ordered, fire-and-forget channel from a play session to its host.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Checking,
    Downloading,
    Extracting,
    Launching,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    /// 0..=100, or `None` when the total is unknown.
    pub percent: Option<u8>,
    pub label: String,
}

/// External process state changes. `Closed` and `Error` end the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Launched { pid: Option<u32> },
    Closed { code: Option<i32> },
    Error { detail: String },
}

impl LifecycleEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LifecycleEvent::Launched { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    Progress(ProgressEvent),
    Lifecycle(LifecycleEvent),
    /// A raw output line of the game or the mod-loader installer.
    Log { level: LogLevel, line: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub session_id: String,
    pub at: DateTime<Utc>,
    pub payload: EventPayload,
}

/// Sending half handed to every step of a session.
///
/// Sends never block and never fail: once the host drops its receiver the
/// events are discarded.
#[derive(Debug, Clone)]
pub struct EventSink {
    session_id: Arc<str>,
    tx: Option<UnboundedSender<SessionEvent>>,
}

impl EventSink {
    pub fn channel(session_id: impl Into<String>) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            session_id: Arc::from(session_id.into()),
            tx: Some(tx),
        };
        (sink, rx)
    }

    /// A sink nobody listens to.
    pub fn disconnected() -> Self {
        Self {
            session_id: Arc::from(""),
            tx: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn emit(&self, payload: EventPayload) {
        let Some(tx) = &self.tx else {
            return;
        };
        let _ = tx.send(SessionEvent {
            session_id: self.session_id.to_string(),
            at: Utc::now(),
            payload,
        });
    }

    pub fn progress(&self, phase: ProgressPhase, percent: Option<u8>, label: impl Into<String>) {
        self.emit(EventPayload::Progress(ProgressEvent {
            phase,
            percent: percent.map(|p| p.min(100)),
            label: label.into(),
        }));
    }

    pub fn lifecycle(&self, event: LifecycleEvent) {
        self.emit(EventPayload::Lifecycle(event));
    }

    pub fn log(&self, level: LogLevel, line: impl Into<String>) {
        self.emit(EventPayload::Log {
            level,
            line: line.into(),
        });
    }
}
