use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::{
    connection::Database,
    models::{ProctoringEventKind, SessionStatus},
};
use crate::models::SessionId;
use crate::session::SessionJournal;

#[async_trait]
impl SessionJournal for Database {
    async fn session_started(
        &self,
        session_id: &SessionId,
        started_at: DateTime<Utc>,
        duration_secs: u32,
    ) -> Result<()> {
        self.upsert_running_session(session_id.as_str(), started_at, duration_secs, Utc::now())
            .await
    }

    async fn proctoring_event(
        &self,
        session_id: &SessionId,
        kind: ProctoringEventKind,
        occurred_at: DateTime<Utc>,
    ) -> Result<()> {
        self.insert_proctoring_event(session_id.as_str(), kind, occurred_at)
            .await
            .map(|_| ())
    }

    async fn session_finished(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
        detail: Option<String>,
        stopped_at: DateTime<Utc>,
    ) -> Result<()> {
        self.mark_session_status(
            session_id.as_str(),
            status,
            detail,
            Some(stopped_at),
            stopped_at,
        )
        .await
    }
}
