use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ProctoringEventKind {
    Entered,
    Exited,
    Violation,
}

impl ProctoringEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProctoringEventKind::Entered => "Entered",
            ProctoringEventKind::Exited => "Exited",
            ProctoringEventKind::Violation => "Violation",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProctoringEvent {
    pub id: i64,
    pub session_id: String,
    pub kind: ProctoringEventKind,
    pub occurred_at: DateTime<Utc>,
}
