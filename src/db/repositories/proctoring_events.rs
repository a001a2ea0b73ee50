use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_event_kind},
    models::{ProctoringEvent, ProctoringEventKind},
};

impl Database {
    pub async fn insert_proctoring_event(
        &self,
        session_id: &str,
        kind: ProctoringEventKind,
        occurred_at: DateTime<Utc>,
    ) -> Result<i64> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO proctoring_events (session_id, kind, occurred_at)
                 VALUES (?1, ?2, ?3)",
                params![session_id, kind.as_str(), occurred_at.to_rfc3339()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn get_proctoring_events(&self, session_id: &str) -> Result<Vec<ProctoringEvent>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, kind, occurred_at
                 FROM proctoring_events
                 WHERE session_id = ?1
                 ORDER BY id ASC",
            )?;

            let mut rows = stmt.query(params![session_id])?;
            let mut events = Vec::new();
            while let Some(row) = rows.next()? {
                let kind: String = row.get(2)?;
                let occurred_at: String = row.get(3)?;
                events.push(ProctoringEvent {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    kind: parse_event_kind(&kind)?,
                    occurred_at: parse_datetime(&occurred_at, "occurred_at")?,
                });
            }
            Ok(events)
        })
        .await
    }
}
