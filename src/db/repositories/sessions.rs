use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime, parse_status, to_u32},
    models::{SessionRecord, SessionStatus},
};

const SESSION_COLUMNS: &str =
    "id, started_at, stopped_at, status, duration_secs, outcome_detail, created_at, updated_at";

fn row_to_session(row: &Row) -> Result<SessionRecord> {
    let started_at: String = row.get("started_at")?;
    let stopped_at: Option<String> = row.get("stopped_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let status: String = row.get("status")?;
    let duration_secs: i64 = row.get("duration_secs")?;

    Ok(SessionRecord {
        id: row.get("id")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        stopped_at: parse_optional_datetime(stopped_at, "stopped_at")?,
        status: parse_status(&status)?,
        duration_secs: to_u32(duration_secs, "duration_secs")?,
        outcome_detail: row.get("outcome_detail")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    /// Records a session as running. A resumed session keeps its row and
    /// creation time.
    pub async fn upsert_running_session(
        &self,
        session_id: &str,
        started_at: DateTime<Utc>,
        duration_secs: u32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, started_at, stopped_at, status, duration_secs, outcome_detail, created_at, updated_at)
                 VALUES (?1, ?2, NULL, 'Running', ?3, NULL, ?4, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     started_at = excluded.started_at,
                     stopped_at = NULL,
                     status = 'Running',
                     duration_secs = excluded.duration_secs,
                     outcome_detail = NULL,
                     updated_at = excluded.updated_at",
                params![
                    session_id,
                    started_at.to_rfc3339(),
                    i64::from(duration_secs),
                    now.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn mark_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        outcome_detail: Option<String>,
        stopped_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET status = ?1,
                     outcome_detail = ?2,
                     stopped_at = ?3,
                     updated_at = ?4
                 WHERE id = ?5",
                params![
                    status.as_str(),
                    outcome_detail,
                    stopped_at.map(|dt| dt.to_rfc3339()),
                    updated_at.to_rfc3339(),
                    session_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"
            ))?;

            let session = stmt
                .query_row(params![session_id], |row| Ok(row_to_session(row)))
                .optional()?
                .transpose()?;

            Ok(session)
        })
        .await
    }

    pub async fn get_running_sessions(&self) -> Result<Vec<SessionRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE status = 'Running'
                 ORDER BY started_at DESC"
            ))?;

            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Marks running sessions whose clock state is gone as `Interrupted`
    /// and returns their ids. Sessions that still have a clock can resume.
    pub async fn finalize_orphaned_sessions(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let orphaned = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM sessions
                     WHERE status = 'Running'
                       AND NOT EXISTS (
                           SELECT 1 FROM local_state WHERE local_state.key = 'clock:' || sessions.id
                       )",
                )?;
                let ids = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                ids
            };

            for id in &orphaned {
                tx.execute(
                    "UPDATE sessions
                     SET status = 'Interrupted',
                         outcome_detail = 'no resumable state at startup',
                         stopped_at = ?1,
                         updated_at = ?1
                     WHERE id = ?2",
                    params![now.to_rfc3339(), id],
                )?;
            }
            tx.commit()?;
            Ok(orphaned)
        })
        .await
    }
}
