//! Collaborators the controller drives but does not own.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;

use crate::db::models::{ProctoringEventKind, SessionStatus};
use crate::models::{RoomCredentials, SessionId, Speaker, Utterance};

use super::events::{Notice, SessionEvent};

/// Opaque handle to a joined media room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHandle(pub String);

/// Channel through which the media room reports transcribed speech.
#[derive(Clone)]
pub struct UtteranceSink {
    events: UnboundedSender<SessionEvent>,
}

impl UtteranceSink {
    pub fn new(events: UnboundedSender<SessionEvent>) -> Self {
        Self { events }
    }

    /// Returns false once the session is gone.
    pub fn on_utterance(&self, speaker: Speaker, text: impl Into<String>, timestamp_ms: i64) -> bool {
        self.events
            .send(SessionEvent::Utterance(Utterance::new(speaker, text, timestamp_ms)))
            .is_ok()
    }
}

/// Real-time audio/video room.
#[async_trait]
pub trait MediaRoom: Send + Sync {
    async fn start(&self, credentials: &RoomCredentials, sink: UtteranceSink) -> Result<MediaHandle>;

    /// Releases camera and microphone. Must not return before they are released.
    async fn stop(&self, handle: MediaHandle) -> Result<()>;
}

/// The page hosting the session.
#[async_trait]
pub trait SessionHost: Send + Sync {
    async fn navigate(&self, path: &str);

    async fn notify(&self, notice: Notice);

    async fn time_remaining(&self, _seconds: u32) {}
}

/// Local audit log of sessions and proctoring events.
#[async_trait]
pub trait SessionJournal: Send + Sync {
    async fn session_started(
        &self,
        session_id: &SessionId,
        started_at: DateTime<Utc>,
        duration_secs: u32,
    ) -> Result<()>;

    async fn proctoring_event(
        &self,
        session_id: &SessionId,
        kind: ProctoringEventKind,
        occurred_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn session_finished(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
        detail: Option<String>,
        stopped_at: DateTime<Utc>,
    ) -> Result<()>;
}
