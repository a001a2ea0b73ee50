use serde::{Deserialize, Serialize};

/// Local-cache namespace for the persisted clock anchor.
pub const CLOCK_NAMESPACE: &str = "clock";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TimerPhase {
    Running,
    FeedbackInFlight,
    Completed,
    Expired,
}

impl Default for TimerPhase {
    fn default() -> Self {
        TimerPhase::Running
    }
}

impl TimerPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TimerPhase::Completed | TimerPhase::Expired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Remaining time dropped to or below the watch value for the first time.
    ThresholdCrossed(u32),
    Expired,
}

/// Persisted anchor of a countdown. Remaining time is always derived from
/// it, never decremented.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionClock {
    pub duration_seconds: u32,
    pub started_at_epoch_ms: i64,
}

impl SessionClock {
    pub fn new(duration_seconds: u32, started_at_epoch_ms: i64) -> Self {
        Self {
            duration_seconds,
            started_at_epoch_ms,
        }
    }

    /// `duration - floor(elapsed / 1000)`, clamped to `[0, duration]`.
    /// A wall clock behind the anchor counts as zero elapsed.
    pub fn remaining_seconds(&self, now_ms: i64) -> u32 {
        let elapsed_secs = now_ms.saturating_sub(self.started_at_epoch_ms).max(0) / 1000;
        let duration = i64::from(self.duration_seconds);
        (duration - elapsed_secs).clamp(0, duration) as u32
    }

    /// Whether a persisted anchor is plausible at `now_ms`.
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        self.duration_seconds > 0 && self.started_at_epoch_ms > 0 && self.started_at_epoch_ms <= now_ms
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub remaining_seconds: u32,
    pub events: Vec<TimerEvent>,
}

/// `m:ss`, the way the countdown is shown to the candidate.
pub fn format_remaining(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
