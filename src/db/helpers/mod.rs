use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::db::models::{ProctoringEventKind, SessionStatus};

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} out of range: {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_status(value: &str) -> Result<SessionStatus> {
    match value {
        "Running" => Ok(SessionStatus::Running),
        "Completed" => Ok(SessionStatus::Completed),
        "Expired" => Ok(SessionStatus::Expired),
        "Terminated" => Ok(SessionStatus::Terminated),
        "Interrupted" => Ok(SessionStatus::Interrupted),
        other => Err(anyhow!("unknown session status {other}")),
    }
}

pub fn parse_event_kind(value: &str) -> Result<ProctoringEventKind> {
    match value {
        "Entered" => Ok(ProctoringEventKind::Entered),
        "Exited" => Ok(ProctoringEventKind::Exited),
        "Violation" => Ok(ProctoringEventKind::Violation),
        other => Err(anyhow!("unknown proctoring event kind {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        for status in [
            SessionStatus::Running,
            SessionStatus::Completed,
            SessionStatus::Expired,
            SessionStatus::Terminated,
            SessionStatus::Interrupted,
        ] {
            assert_eq!(parse_status(status.as_str()).unwrap(), status);
        }
        assert!(parse_status("Paused").is_err());
    }

    #[test]
    fn negative_durations_are_rejected() {
        assert_eq!(to_u32(840, "duration_secs").unwrap(), 840);
        assert!(to_u32(-1, "duration_secs").is_err());
    }
}
